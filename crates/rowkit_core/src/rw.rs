//! Reader/writer over a store or an open transaction

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rowkit_kernel::{
    AssignValue, Assignment, DbError, Delete, Expr, HookStage, Insert, OpType, Options,
    Predicate, Reader, Resource, Row, Select, Statement, Store, Transaction, Update, Value,
    VetOptions, Writer, VERSION_COLUMN,
};
use tracing::{debug, instrument};

use crate::config::WriterConfig;
use crate::conflict;
use crate::field_mask::{bracketed, update_fields};

const CREATE_OP: &str = "rowkit.Create";
const CREATE_ITEMS_OP: &str = "rowkit.CreateItems";
const UPDATE_OP: &str = "rowkit.Update";
const DELETE_OP: &str = "rowkit.Delete";
const DELETE_ITEMS_OP: &str = "rowkit.DeleteItems";
const EXEC_OP: &str = "rowkit.Exec";
const LOOKUP_BY_ID_OP: &str = "rowkit.LookupById";
const LOOKUP_WHERE_OP: &str = "rowkit.LookupWhere";
const QUERY_OP: &str = "rowkit.Query";

#[derive(Clone)]
pub(crate) enum Underlying {
    Store(Arc<dyn Store>),
    Tx(Arc<dyn Transaction>),
}

/// Reader and writer bound to a store or to one transaction
///
/// A store-bound `Rw` runs every statement in its own implicit transaction
/// and can start explicit ones with [`Rw::begin`] or [`Rw::do_tx`]. A
/// transaction-bound `Rw` routes every statement through that transaction.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rowkit_core::{Rw, WriterConfig};
/// # fn store() -> Arc<dyn rowkit_kernel::Store> { unimplemented!() }
///
/// let rw = Rw::new(store()).with_config(
///     WriterConfig::new().non_updatable_fields(["PublicId", "CreateTime"]),
/// );
/// ```
#[derive(Clone, Default)]
pub struct Rw {
    pub(crate) underlying: Option<Underlying>,
    config: Arc<WriterConfig>,
}

impl fmt::Debug for Rw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let underlying = match self.underlying {
            Some(Underlying::Store(_)) => "store",
            Some(Underlying::Tx(_)) => "transaction",
            None => "none",
        };
        f.debug_struct("Rw")
            .field("underlying", &underlying)
            .field("config", &self.config)
            .finish()
    }
}

impl Rw {
    /// Creates a reader/writer over `store` with the default configuration
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            underlying: Some(Underlying::Store(store)),
            config: Arc::new(WriterConfig::default()),
        }
    }

    /// Replaces the writer configuration
    pub fn with_config(mut self, config: WriterConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Checks whether this reader/writer is bound to a transaction
    pub fn in_transaction(&self) -> bool {
        matches!(self.underlying, Some(Underlying::Tx(_)))
    }

    pub(crate) fn bound_to(&self, tx: Arc<dyn Transaction>) -> Rw {
        Rw {
            underlying: Some(Underlying::Tx(tx)),
            config: self.config.clone(),
        }
    }

    /// Starts a transaction and returns a reader/writer bound to it
    pub async fn begin(&self) -> Result<Rw, DbError> {
        const OP: &str = "rowkit.Begin";
        match &self.underlying {
            Some(Underlying::Store(store)) => {
                let tx = store.begin().await.map_err(|e| e.with_op(OP))?;
                Ok(self.bound_to(tx))
            }
            Some(Underlying::Tx(_)) => {
                Err(DbError::invalid("already inside a transaction").with_op(OP))
            }
            None => Err(missing_db().with_op(OP)),
        }
    }

    /// Commits the bound transaction
    pub async fn commit(&self) -> Result<(), DbError> {
        const OP: &str = "rowkit.Commit";
        self.transaction(OP)?.commit().await.map_err(|e| e.with_op(OP))
    }

    /// Rolls back the bound transaction
    pub async fn rollback(&self) -> Result<(), DbError> {
        const OP: &str = "rowkit.Rollback";
        self.transaction(OP)?.rollback().await.map_err(|e| e.with_op(OP))
    }

    fn transaction(&self, op: &'static str) -> Result<&Arc<dyn Transaction>, DbError> {
        match &self.underlying {
            Some(Underlying::Tx(tx)) => Ok(tx),
            _ => Err(DbError::invalid("no transaction in progress").with_op(op)),
        }
    }

    fn ensure_underlying(&self) -> Result<(), DbError> {
        match self.underlying {
            Some(_) => Ok(()),
            None => Err(missing_db()),
        }
    }

    async fn run(&self, statement: &Statement, log: bool) -> Result<u64, DbError> {
        if log {
            debug!(%statement, "executing statement");
        }
        match &self.underlying {
            Some(Underlying::Store(store)) => store.execute(statement).await,
            Some(Underlying::Tx(tx)) => tx.execute(statement).await,
            None => Err(missing_db()),
        }
    }

    async fn rows(&self, statement: &Statement, log: bool) -> Result<Vec<Row>, DbError> {
        if log {
            debug!(%statement, "fetching rows");
        }
        match &self.underlying {
            Some(Underlying::Store(store)) => store.fetch(statement).await,
            Some(Underlying::Tx(tx)) => tx.fetch(statement).await,
            None => Err(missing_db()),
        }
    }

    async fn create_one(&self, resource: &mut dyn Resource, opts: &Options) -> Result<u64, DbError> {
        self.ensure_underlying()?;
        ensure_no_hooks(resource)?;
        clear_fields(resource, &self.config.non_creatable_fields)?;

        if !opts.skips_vet() {
            resource
                .vet_for_write(self, OpType::Create, &VetOptions::default())
                .await?;
        }

        let mut columns = Vec::new();
        let mut values = Vec::new();
        for field in resource.fields() {
            let value = resource.value_of(field.name).unwrap_or(Value::Null);
            if field.store_default && value.is_zero() {
                continue;
            }
            columns.push(field.column.to_string());
            values.push(value);
        }

        let on_conflict = match opts.on_conflict_spec() {
            Some(spec) => Some(conflict::resolve(
                resource,
                &columns,
                spec,
                opts,
                &self.config,
            )?),
            None => None,
        };

        before_write(opts, &[&*resource])?;
        let statement = Statement::Insert(Insert {
            table: resource.table_name().to_string(),
            columns,
            values,
            on_conflict,
        });
        let rows = self.run(&statement, opts.is_debug()).await?;
        after_write(opts, &[&*resource], rows)?;

        if opts.wants_lookup() {
            self.lookup_one(resource, opts.is_debug()).await?;
        }
        Ok(rows)
    }

    async fn update_one(
        &self,
        resource: &mut dyn Resource,
        field_mask_paths: &[&str],
        set_to_null_paths: &[&str],
        opts: &Options,
    ) -> Result<u64, DbError> {
        self.ensure_underlying()?;
        ensure_no_hooks(resource)?;
        if field_mask_paths.is_empty() && set_to_null_paths.is_empty() {
            return Err(DbError::invalid(
                "both field mask paths and null paths are missing",
            ));
        }

        let masks = self.updatable(field_mask_paths);
        let nulls = self.updatable(set_to_null_paths);
        if masks.is_empty() && nulls.is_empty() {
            return Err(DbError::invalid(
                "after filtering non-updatable fields, there are no fields left in field mask paths or null paths",
            ));
        }

        for path in masks.iter().chain(nulls.iter()) {
            if resource.field(path).is_some_and(|f| f.primary_key) {
                return Err(DbError::invalid(format!(
                    "not allowed on primary key field {}",
                    path
                )));
            }
        }
        let pk = primary_key_predicate(resource, |unset| {
            DbError::invalid(format!("primary key is not set for: {}", bracketed(unset)))
        })?;

        if !opts.skips_vet() {
            let mask_owned: Vec<String> = masks.iter().map(|s| s.to_string()).collect();
            let null_owned: Vec<String> = nulls.iter().map(|s| s.to_string()).collect();
            let vet = VetOptions {
                field_mask_paths: &mask_owned,
                null_paths: &null_owned,
            };
            resource.vet_for_write(self, OpType::Update, &vet).await?;
        }

        let fields = update_fields(resource, &masks, &nulls)?;
        let mut assignments: Vec<Assignment> = fields
            .into_iter()
            .map(|(column, value)| Assignment::new(column, value))
            .collect();
        if resource.has_version()
            && !assignments
                .iter()
                .any(|a| a.column.eq_ignore_ascii_case(VERSION_COLUMN))
        {
            assignments.push(Assignment::new(VERSION_COLUMN, AssignValue::Increment(1)));
        }

        let predicate = pk.and(option_predicate(resource, opts, false)?);

        before_write(opts, &[&*resource])?;
        let statement = Statement::Update(Update {
            table: resource.table_name().to_string(),
            assignments,
            predicate,
        });
        let rows = self.run(&statement, opts.is_debug()).await?;
        after_write(opts, &[&*resource], rows)?;

        if rows > 0 {
            // pick up store-maintained columns such as version
            self.lookup_one(resource, opts.is_debug()).await?;
        }
        Ok(rows)
    }

    async fn delete_one(&self, resource: &dyn Resource, opts: &Options) -> Result<u64, DbError> {
        self.ensure_underlying()?;
        ensure_no_hooks(resource)?;
        let pk = primary_key_predicate(resource, |unset| {
            DbError::invalid(format!("primary key {} is not set", unset[0]))
        })?;
        let predicate = pk.and(option_predicate(resource, opts, false)?);

        before_write(opts, &[resource])?;
        let statement = Statement::Delete(Delete {
            table: resource.table_name().to_string(),
            predicate,
        });
        let rows = self.run(&statement, opts.is_debug()).await?;
        after_write(opts, &[resource], rows)?;
        Ok(rows)
    }

    async fn lookup_one(&self, resource: &mut dyn Resource, log: bool) -> Result<(), DbError> {
        let predicate = primary_key_predicate(resource, |unset| {
            DbError::invalid(format!("primary key is not set for: {}", bracketed(unset)))
        })?;
        self.select_into(resource, predicate, log).await
    }

    async fn select_into(
        &self,
        resource: &mut dyn Resource,
        predicate: Predicate,
        log: bool,
    ) -> Result<(), DbError> {
        let fields = resource.fields();
        let statement = Statement::Select(Select {
            table: resource.table_name().to_string(),
            columns: fields.iter().map(|f| f.column.to_string()).collect(),
            predicate,
            limit: Some(1),
        });
        let mut rows = self.rows(&statement, log).await?;
        if rows.is_empty() {
            return Err(DbError::RecordNotFound);
        }
        let mut row = rows.swap_remove(0);
        for field in fields {
            let value = row.remove(field.column).unwrap_or(Value::Null);
            resource.set_value(field.name, value)?;
        }
        Ok(())
    }

    /// Drops configured non-updatable names from a path list
    fn updatable<'a>(&self, paths: &[&'a str]) -> Vec<&'a str> {
        paths
            .iter()
            .copied()
            .filter(|p| !self.config.is_non_updatable(p))
            .collect()
    }
}

#[async_trait]
impl Reader for Rw {
    #[instrument(skip_all, fields(table = %resource.table_name()))]
    async fn lookup_by_id(
        &self,
        resource: &mut dyn Resource,
        opts: Options,
    ) -> Result<(), DbError> {
        self.ensure_underlying()
            .map_err(|e| e.with_op(LOOKUP_BY_ID_OP))?;
        self.lookup_one(resource, opts.is_debug())
            .await
            .map_err(|e| e.with_op(LOOKUP_BY_ID_OP))
    }

    #[instrument(skip_all, fields(table = %resource.table_name()))]
    async fn lookup_where(
        &self,
        resource: &mut dyn Resource,
        where_sql: &str,
        args: Vec<Value>,
        opts: Options,
    ) -> Result<(), DbError> {
        self.ensure_underlying()
            .map_err(|e| e.with_op(LOOKUP_WHERE_OP))?;
        if where_sql.trim().is_empty() {
            return Err(DbError::invalid("missing where clause").with_op(LOOKUP_WHERE_OP));
        }
        let predicate = Predicate::new().and_expr(Expr::new(where_sql, args));
        self.select_into(resource, predicate, opts.is_debug())
            .await
            .map_err(|e| e.with_op(LOOKUP_WHERE_OP))
    }

    async fn query(&self, sql: &str, args: Vec<Value>) -> Result<Vec<Row>, DbError> {
        if sql.trim().is_empty() {
            return Err(DbError::invalid("missing sql").with_op(QUERY_OP));
        }
        self.rows(&Statement::Raw(Expr::new(sql, args)), false)
            .await
            .map_err(|e| e.with_op(QUERY_OP))
    }
}

#[async_trait]
impl Writer for Rw {
    async fn exec(&self, sql: &str, args: Vec<Value>) -> Result<u64, DbError> {
        if sql.trim().is_empty() {
            return Err(DbError::invalid("missing sql").with_op(EXEC_OP));
        }
        self.run(&Statement::Raw(Expr::new(sql, args)), false)
            .await
            .map_err(|e| e.with_op(EXEC_OP))
    }

    #[instrument(skip_all, fields(table = %resource.table_name()))]
    async fn create(&self, resource: &mut dyn Resource, opts: Options) -> Result<u64, DbError> {
        self.create_one(resource, &opts)
            .await
            .map_err(|e| e.with_op(CREATE_OP))
    }

    #[instrument(skip_all, fields(count = resources.len()))]
    async fn create_items(
        &self,
        resources: &mut [&mut dyn Resource],
        opts: Options,
    ) -> Result<u64, DbError> {
        self.ensure_underlying()
            .map_err(|e| e.with_op(CREATE_ITEMS_OP))?;
        if resources.is_empty() {
            return Err(DbError::invalid("missing items").with_op(CREATE_ITEMS_OP));
        }
        if opts.wants_lookup() {
            return Err(DbError::invalid("with lookup not a supported option")
                .with_op(CREATE_ITEMS_OP));
        }
        {
            let all: Vec<&dyn Resource> = resources.iter().map(|r| &**r).collect();
            ensure_same_type(&all).map_err(|e| e.with_op(CREATE_ITEMS_OP))?;
            before_write(&opts, &all).map_err(|e| e.with_op(CREATE_ITEMS_OP))?;
        }

        let item_opts = opts.without_callbacks();
        let mut rows = 0;
        for item in resources.iter_mut() {
            rows += self
                .create_one(&mut **item, &item_opts)
                .await
                .map_err(|e| e.with_op(CREATE_OP).with_op(CREATE_ITEMS_OP))?;
        }

        let all: Vec<&dyn Resource> = resources.iter().map(|r| &**r).collect();
        after_write(&opts, &all, rows).map_err(|e| e.with_op(CREATE_ITEMS_OP))?;
        Ok(rows)
    }

    #[instrument(skip_all, fields(table = %resource.table_name()))]
    async fn update(
        &self,
        resource: &mut dyn Resource,
        field_mask_paths: &[&str],
        set_to_null_paths: &[&str],
        opts: Options,
    ) -> Result<u64, DbError> {
        self.update_one(resource, field_mask_paths, set_to_null_paths, &opts)
            .await
            .map_err(|e| e.with_op(UPDATE_OP))
    }

    #[instrument(skip_all, fields(table = %resource.table_name()))]
    async fn delete(&self, resource: &dyn Resource, opts: Options) -> Result<u64, DbError> {
        self.delete_one(resource, &opts)
            .await
            .map_err(|e| e.with_op(DELETE_OP))
    }

    #[instrument(skip_all, fields(count = resources.len()))]
    async fn delete_items(
        &self,
        resources: &[&dyn Resource],
        opts: Options,
    ) -> Result<u64, DbError> {
        self.ensure_underlying()
            .map_err(|e| e.with_op(DELETE_ITEMS_OP))?;
        if resources.is_empty() {
            return Err(DbError::invalid("no items to delete").with_op(DELETE_ITEMS_OP));
        }
        if opts.wants_lookup() {
            return Err(DbError::invalid("with lookup not a supported option")
                .with_op(DELETE_ITEMS_OP));
        }
        ensure_same_type(resources).map_err(|e| e.with_op(DELETE_ITEMS_OP))?;
        before_write(&opts, resources).map_err(|e| e.with_op(DELETE_ITEMS_OP))?;

        let item_opts = opts.without_callbacks();
        let mut rows = 0;
        for item in resources {
            rows += self
                .delete_one(*item, &item_opts)
                .await
                .map_err(|e| e.with_op(DELETE_OP).with_op(DELETE_ITEMS_OP))?;
        }

        after_write(&opts, resources, rows).map_err(|e| e.with_op(DELETE_ITEMS_OP))?;
        Ok(rows)
    }
}

/// Resets the named fields to their zero value
///
/// Names match field names exactly; unknown names are ignored.
pub fn clear_fields(resource: &mut dyn Resource, fields: &[String]) -> Result<(), DbError> {
    for name in fields {
        if let Some(field) = resource.field(name) {
            if field.name == name.as_str() {
                resource.set_value(field.name, Value::Null)?;
            }
        }
    }
    Ok(())
}

/// Version and where clause options as a predicate
///
/// With `qualified` the version column is prefixed by the table name, which
/// an upsert needs to tell the existing row from the proposed one.
pub(crate) fn option_predicate(
    resource: &dyn Resource,
    opts: &Options,
    qualified: bool,
) -> Result<Predicate, DbError> {
    let mut predicate = Predicate::new();
    if let Some(version) = opts.version_value() {
        if version == 0 {
            return Err(DbError::invalid("with version option is zero"));
        }
        if !resource.has_version() {
            return Err(DbError::invalid(format!(
                "{} does not have a version field",
                resource.table_name()
            )));
        }
        predicate = if qualified {
            predicate.and_qualified_eq(resource.table_name(), VERSION_COLUMN, version.into())
        } else {
            predicate.and_eq(VERSION_COLUMN, version.into())
        };
    }
    if let Some(expr) = opts.where_expr() {
        predicate = predicate.and_expr(expr.clone());
    }
    Ok(predicate)
}

/// Equality on every primary key column
///
/// `unset` builds the error when some key fields hold their zero value.
fn primary_key_predicate(
    resource: &dyn Resource,
    unset: impl FnOnce(&[&str]) -> DbError,
) -> Result<Predicate, DbError> {
    let keys = resource.primary_keys();
    if keys.is_empty() {
        return Err(DbError::invalid(format!(
            "{} has no primary key",
            resource.table_name()
        )));
    }
    let mut predicate = Predicate::new();
    let mut zero = Vec::new();
    for field in keys {
        let value = resource.value_of(field.name).unwrap_or(Value::Null);
        if value.is_zero() {
            zero.push(field.name);
        }
        predicate = predicate.and_eq(field.column, value);
    }
    if !zero.is_empty() {
        return Err(unset(&zero));
    }
    Ok(predicate)
}

fn ensure_no_hooks(resource: &dyn Resource) -> Result<(), DbError> {
    if resource.lifecycle_hooks().is_empty() {
        Ok(())
    } else {
        Err(DbError::invalid(format!(
            "{}: callback/hooks are not supported",
            resource.type_name()
        )))
    }
}

fn ensure_same_type(resources: &[&dyn Resource]) -> Result<(), DbError> {
    let Some(first) = resources.first() else {
        return Ok(());
    };
    for (i, r) in resources.iter().enumerate().skip(1) {
        if r.type_name() != first.type_name() || r.table_name() != first.table_name() {
            return Err(DbError::invalid(format!(
                "items contain disparate types. item {} is not a {}",
                i,
                first.type_name()
            )));
        }
    }
    Ok(())
}

fn before_write(opts: &Options, resources: &[&dyn Resource]) -> Result<(), DbError> {
    match opts.before_write_fn() {
        Some(f) => f(resources).map_err(|source| DbError::Hook {
            stage: HookStage::BeforeWrite,
            source,
        }),
        None => Ok(()),
    }
}

/// Runs the after write callback when the write affected rows
fn after_write(opts: &Options, resources: &[&dyn Resource], rows: u64) -> Result<(), DbError> {
    match opts.after_write_fn() {
        Some(f) if rows > 0 => f(resources, rows).map_err(|source| DbError::Hook {
            stage: HookStage::AfterWrite,
            source,
        }),
        _ => Ok(()),
    }
}

fn missing_db() -> DbError {
    DbError::invalid("missing underlying db")
}
