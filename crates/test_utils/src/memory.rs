//! In-Memory Store
//!
//! A [`Store`] that interprets rowkit statements against tables held in
//! memory. It understands primary keys, unique constraints, column
//! defaults and `ON CONFLICT` clauses, which is enough to run the writer
//! and the transaction executor without a database.
//!
//! Transactions work on a private snapshot of every table and publish it
//! on commit. A transaction that wrote something fails to commit with a
//! serialization failure when another writer committed after it began.
//! Failures can also be injected to drive retry paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rowkit_kernel::{
    AssignValue, Assignment, Condition, ConflictResolution, ConflictTarget, DbError, Executor,
    Expr, Insert, OnConflictClause, Predicate, Row, Statement, Store, StoreErrorKind,
    Transaction, Value,
};
use tracing::trace;

/// Value a column takes when an insert omits it
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    /// Current time
    Now,
    /// Fixed value
    Value(Value),
}

impl ColumnDefault {
    fn resolve(&self) -> Value {
        match self {
            ColumnDefault::Now => Value::Timestamp(Utc::now()),
            ColumnDefault::Value(v) => v.clone(),
        }
    }
}

/// Definition of an in-memory table
#[derive(Debug, Clone)]
pub struct TableDef {
    name: String,
    columns: Vec<String>,
    constraints: Vec<(String, Vec<String>)>,
    defaults: Vec<(String, ColumnDefault)>,
}

impl TableDef {
    /// Creates a table with the given columns and no constraints
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            constraints: Vec::new(),
            defaults: Vec::new(),
        }
    }

    /// Adds the primary key, named `<table>_pkey`
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = format!("{}_pkey", self.name);
        self.constraints
            .push((name, columns.into_iter().map(Into::into).collect()));
        self
    }

    /// Adds a unique constraint
    pub fn unique<I, S>(mut self, constraint: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.push((
            constraint.into(),
            columns.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Sets the default for a column
    pub fn default_value(mut self, column: impl Into<String>, default: ColumnDefault) -> Self {
        self.defaults.push((column.into(), default));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn column(&self, name: &str) -> Result<String, DbError> {
        let bare = name.trim().rsplit('.').next().unwrap_or(name).trim();
        self.columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(bare))
            .cloned()
            .ok_or_else(|| {
                query_error(format!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    bare, self.name
                ))
            })
    }

    fn arbiter(&self, target: &ConflictTarget) -> Result<Vec<String>, DbError> {
        let found = match target {
            ConflictTarget::Columns(cols) => self.constraints.iter().find(|(_, c)| {
                c.len() == cols.len()
                    && cols
                        .iter()
                        .all(|t| c.iter().any(|col| col.eq_ignore_ascii_case(t)))
            }),
            ConflictTarget::Constraint(name) => {
                self.constraints.iter().find(|(n, _)| n == name)
            }
        };
        found.map(|(_, cols)| cols.clone()).ok_or_else(|| {
            query_error(
                "there is no unique or exclusion constraint matching the ON CONFLICT specification",
            )
        })
    }
}

/// Table definitions matching the `db_test_*` tables of the test schema
pub fn test_tables() -> Vec<TableDef> {
    let now = || ColumnDefault::Now;
    let one = || ColumnDefault::Value(Value::Int(1));
    vec![
        TableDef::new(
            "db_test_user",
            [
                "public_id",
                "create_time",
                "update_time",
                "name",
                "phone_number",
                "email",
                "version",
            ],
        )
        .primary_key(["public_id"])
        .unique("db_test_user_name_key", ["name"])
        .default_value("create_time", now())
        .default_value("update_time", now())
        .default_value("version", one()),
        TableDef::new(
            "db_test_car",
            ["public_id", "create_time", "update_time", "name", "model", "mpg"],
        )
        .primary_key(["public_id"])
        .unique("db_test_car_name_key", ["name"])
        .default_value("create_time", now())
        .default_value("update_time", now()),
        TableDef::new(
            "db_test_rental",
            ["user_id", "car_id", "create_time", "update_time", "name", "version"],
        )
        .primary_key(["user_id", "car_id"])
        .default_value("create_time", now())
        .default_value("update_time", now())
        .default_value("version", one()),
    ]
}

#[derive(Debug, Clone)]
struct Table {
    def: TableDef,
    rows: Vec<Row>,
}

type Tables = HashMap<String, Table>;

#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    generation: u64,
}

#[derive(Debug, Default)]
struct Faults {
    execute: Option<(StoreErrorKind, u32)>,
    commit: Option<(StoreErrorKind, u32)>,
    rollback: u32,
}

impl Faults {
    fn take(slot: &mut Option<(StoreErrorKind, u32)>) -> Option<StoreErrorKind> {
        let (kind, left) = slot.as_mut()?;
        let kind = *kind;
        *left -= 1;
        if *left == 0 {
            *slot = None;
        }
        Some(kind)
    }
}

#[derive(Debug, Default)]
struct Stats {
    begins: AtomicU32,
    commits: AtomicU32,
    rollbacks: AtomicU32,
}

/// In-memory [`Store`]
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    faults: Arc<Mutex<Faults>>,
    stats: Arc<Stats>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store holding the `db_test_*` tables
    pub fn new() -> Self {
        let store = Self::empty();
        for def in test_tables() {
            store.define_table(def);
        }
        store
    }

    /// Creates a store without any tables
    pub fn empty() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            faults: Arc::new(Mutex::new(Faults::default())),
            stats: Arc::new(Stats::default()),
        }
    }

    /// Adds a table, replacing any table of the same name
    pub fn define_table(&self, def: TableDef) {
        let mut shared = self.shared.lock();
        shared.tables.insert(
            def.name.clone(),
            Table {
                def,
                rows: Vec::new(),
            },
        );
        shared.generation += 1;
    }

    /// Committed rows of a table in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.shared
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Number of committed rows in a table
    pub fn row_count(&self, table: &str) -> usize {
        self.shared
            .lock()
            .tables
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// Makes the next `times` statements fail with `kind`
    pub fn fail_next_executes(&self, kind: StoreErrorKind, times: u32) {
        self.faults.lock().execute = (times > 0).then_some((kind, times));
    }

    /// Makes the next `times` commits fail with `kind`
    pub fn fail_next_commits(&self, kind: StoreErrorKind, times: u32) {
        self.faults.lock().commit = (times > 0).then_some((kind, times));
    }

    /// Makes the next `times` rollbacks fail
    pub fn fail_next_rollbacks(&self, times: u32) {
        self.faults.lock().rollback = times;
    }

    /// Transactions begun so far
    pub fn begins(&self) -> u32 {
        self.stats.begins.load(Ordering::SeqCst)
    }

    /// Transactions committed so far
    pub fn commits(&self) -> u32 {
        self.stats.commits.load(Ordering::SeqCst)
    }

    /// Transactions rolled back so far
    pub fn rollbacks(&self) -> u32 {
        self.stats.rollbacks.load(Ordering::SeqCst)
    }

    fn injected_execute_fault(&self) -> Result<(), DbError> {
        match Faults::take(&mut self.faults.lock().execute) {
            Some(kind) => Err(injected(kind)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Executor for MemoryStore {
    async fn execute(&self, statement: &Statement) -> Result<u64, DbError> {
        self.injected_execute_fault()?;
        trace!(%statement, "memory execute");
        let mut shared = self.shared.lock();
        let rows = apply(&mut shared.tables, statement)?;
        if is_write(statement) && rows > 0 {
            shared.generation += 1;
        }
        Ok(rows)
    }

    async fn fetch(&self, statement: &Statement) -> Result<Vec<Row>, DbError> {
        self.injected_execute_fault()?;
        trace!(%statement, "memory fetch");
        select(&self.shared.lock().tables, statement)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Arc<dyn Transaction>, DbError> {
        self.stats.begins.fetch_add(1, Ordering::SeqCst);
        let shared = self.shared.lock();
        Ok(Arc::new(MemoryTransaction {
            store: self.clone(),
            state: Mutex::new(Some(TxState {
                tables: shared.tables.clone(),
                base: shared.generation,
                dirty: false,
            })),
        }))
    }
}

#[derive(Debug)]
struct TxState {
    tables: Tables,
    base: u64,
    dirty: bool,
}

/// Transaction over a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryTransaction {
    store: MemoryStore,
    state: Mutex<Option<TxState>>,
}

#[async_trait]
impl Executor for MemoryTransaction {
    async fn execute(&self, statement: &Statement) -> Result<u64, DbError> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or_else(finished)?;
        self.store.injected_execute_fault()?;
        trace!(%statement, "memory tx execute");
        let rows = apply(&mut state.tables, statement)?;
        if is_write(statement) && rows > 0 {
            state.dirty = true;
        }
        Ok(rows)
    }

    async fn fetch(&self, statement: &Statement) -> Result<Vec<Row>, DbError> {
        let guard = self.state.lock();
        let state = guard.as_ref().ok_or_else(finished)?;
        self.store.injected_execute_fault()?;
        trace!(%statement, "memory tx fetch");
        select(&state.tables, statement)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(&self) -> Result<(), DbError> {
        let state = self.state.lock().take().ok_or_else(finished)?;
        if let Some(kind) = Faults::take(&mut self.store.faults.lock().commit) {
            return Err(injected(kind));
        }
        if state.dirty {
            let mut shared = self.store.shared.lock();
            if shared.generation != state.base {
                return Err(DbError::store(
                    StoreErrorKind::SerializationFailure,
                    "could not serialize access due to concurrent update",
                ));
            }
            shared.tables = state.tables;
            shared.generation += 1;
        }
        self.store.stats.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DbError> {
        if self.state.lock().take().is_none() {
            return Ok(());
        }
        {
            let mut faults = self.store.faults.lock();
            if faults.rollback > 0 {
                faults.rollback -= 1;
                return Err(DbError::store(
                    StoreErrorKind::Connection,
                    "connection lost during rollback",
                ));
            }
        }
        self.store.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn query_error(message: impl Into<String>) -> DbError {
    DbError::store(StoreErrorKind::Query, message)
}

fn finished() -> DbError {
    query_error("transaction has already been committed or rolled back")
}

fn injected(kind: StoreErrorKind) -> DbError {
    DbError::store(kind, "injected failure")
}

fn is_write(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_)
    )
}

fn table_mut<'a>(tables: &'a mut Tables, name: &str) -> Result<&'a mut Table, DbError> {
    tables
        .get_mut(name)
        .ok_or_else(|| query_error(format!("relation \"{}\" does not exist", name)))
}

fn apply(tables: &mut Tables, statement: &Statement) -> Result<u64, DbError> {
    match statement {
        Statement::Insert(insert) => insert_row(table_mut(tables, &insert.table)?, insert),
        Statement::Update(update) => {
            let table = table_mut(tables, &update.table)?;
            let mut rows = table.rows.clone();
            let mut count = 0;
            for row in rows.iter_mut() {
                if matches(row, &update.predicate, &table.def)? {
                    *row = assign(row, &update.assignments, None, &table.def)?;
                    count += 1;
                }
            }
            check_unique(&table.def, &rows)?;
            table.rows = rows;
            Ok(count)
        }
        Statement::Delete(delete) => {
            let table = table_mut(tables, &delete.table)?;
            let mut keep = Vec::with_capacity(table.rows.len());
            for row in &table.rows {
                keep.push(!matches(row, &delete.predicate, &table.def)?);
            }
            let before = table.rows.len();
            let mut flags = keep.into_iter();
            table.rows.retain(|_| flags.next().unwrap_or(true));
            Ok((before - table.rows.len()) as u64)
        }
        Statement::Select(_) => select(tables, statement).map(|rows| rows.len() as u64),
        Statement::Raw(expr) => Err(unsupported_raw(expr)),
    }
}

fn select(tables: &Tables, statement: &Statement) -> Result<Vec<Row>, DbError> {
    let Statement::Select(select) = statement else {
        return match statement {
            Statement::Raw(expr) => Err(unsupported_raw(expr)),
            _ => Err(query_error("statement does not return rows")),
        };
    };
    let table = tables
        .get(&select.table)
        .ok_or_else(|| query_error(format!("relation \"{}\" does not exist", select.table)))?;
    let columns = select
        .columns
        .iter()
        .map(|c| table.def.column(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    for row in &table.rows {
        if select.limit.is_some_and(|limit| out.len() as u64 >= limit) {
            break;
        }
        if !matches(row, &select.predicate, &table.def)? {
            continue;
        }
        let projected: Row = if columns.is_empty() {
            row.clone()
        } else {
            columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect()
        };
        out.push(projected);
    }
    Ok(out)
}

fn unsupported_raw(expr: &Expr) -> DbError {
    query_error(format!(
        "raw sql is not supported by the memory store: {}",
        expr.sql
    ))
}

fn insert_row(table: &mut Table, insert: &Insert) -> Result<u64, DbError> {
    if insert.columns.len() != insert.values.len() {
        return Err(query_error("INSERT has more target columns than expressions"));
    }
    let mut row: Row = table
        .def
        .columns
        .iter()
        .map(|c| (c.clone(), Value::Null))
        .collect();
    let mut provided = Vec::with_capacity(insert.columns.len());
    for (column, value) in insert.columns.iter().zip(&insert.values) {
        let column = table.def.column(column)?;
        row.insert(column.clone(), value.clone());
        provided.push(column);
    }
    for (column, default) in &table.def.defaults {
        if !provided.contains(column) {
            row.insert(column.clone(), default.resolve());
        }
    }

    if let Some(clause) = &insert.on_conflict {
        let arbiter = table.def.arbiter(&clause.target)?;
        if let Some(idx) = find_conflict(&table.rows, &row, &arbiter, None) {
            return resolve_conflict(table, idx, &row, clause);
        }
    }

    let mut rows = table.rows.clone();
    rows.push(row);
    check_unique(&table.def, &rows)?;
    table.rows = rows;
    Ok(1)
}

fn resolve_conflict(
    table: &mut Table,
    idx: usize,
    proposed: &Row,
    clause: &OnConflictClause,
) -> Result<u64, DbError> {
    let assignments = match &clause.resolution {
        ConflictResolution::DoNothing => return Ok(0),
        ConflictResolution::Update(assignments) => assignments,
    };
    if !matches(&table.rows[idx], &clause.predicate, &table.def)? {
        return Ok(0);
    }
    let mut rows = table.rows.clone();
    rows[idx] = assign(&rows[idx], assignments, Some(proposed), &table.def)?;
    check_unique(&table.def, &rows)?;
    table.rows = rows;
    Ok(1)
}

fn assign(
    existing: &Row,
    assignments: &[Assignment],
    excluded: Option<&Row>,
    def: &TableDef,
) -> Result<Row, DbError> {
    let mut row = existing.clone();
    for assignment in assignments {
        let column = def.column(&assignment.column)?;
        let value = match &assignment.value {
            AssignValue::Value(v) => v.clone(),
            AssignValue::Null => Value::Null,
            AssignValue::Excluded(c) => {
                let proposed = excluded.ok_or_else(|| {
                    query_error("missing FROM-clause entry for table \"excluded\"")
                })?;
                proposed.get(&def.column(c)?).cloned().unwrap_or(Value::Null)
            }
            AssignValue::Increment(n) => match existing.get(&column) {
                Some(Value::Int(i)) => Value::Int(i + n),
                Some(Value::Null) | None => Value::Null,
                Some(other) => {
                    return Err(query_error(format!(
                        "operator does not exist: {} + integer",
                        other.type_name()
                    )))
                }
            },
            AssignValue::Expr(expr) => literal(expr.sql.trim(), &mut expr.args.iter())?,
        };
        row.insert(column, value);
    }
    Ok(row)
}

/// Index of a row other than `skip` that equals `row` on every column
fn find_conflict(rows: &[Row], row: &Row, columns: &[String], skip: Option<usize>) -> Option<usize> {
    rows.iter().enumerate().position(|(i, other)| {
        Some(i) != skip
            && columns.iter().all(|c| match (row.get(c), other.get(c)) {
                (Some(a), Some(b)) => sql_eq(a, b),
                _ => false,
            })
    })
}

fn check_unique(def: &TableDef, rows: &[Row]) -> Result<(), DbError> {
    for (name, columns) in &def.constraints {
        for (i, row) in rows.iter().enumerate() {
            if find_conflict(rows, row, columns, Some(i)).is_some() {
                return Err(DbError::store(
                    StoreErrorKind::UniqueViolation,
                    format!("duplicate key value violates unique constraint \"{}\"", name),
                ));
            }
        }
    }
    Ok(())
}

/// SQL equality: NULL equals nothing
fn sql_eq(a: &Value, b: &Value) -> bool {
    !a.is_null() && !b.is_null() && a == b
}

fn matches(row: &Row, predicate: &Predicate, def: &TableDef) -> Result<bool, DbError> {
    for condition in predicate.conditions() {
        let ok = match condition {
            Condition::Eq { column, value, .. } => {
                let column = def.column(column)?;
                row.get(&column).is_some_and(|v| sql_eq(v, value))
            }
            Condition::Expr(expr) => eval_where(row, expr, def)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    IsNull,
    NotNull,
}

/// Evaluates a conjunction of simple comparisons such as
/// `name = ? and version <> 2 and email is null`
fn eval_where(row: &Row, expr: &Expr, def: &TableDef) -> Result<bool, DbError> {
    let mut args = expr.args.iter();
    let mut result = true;
    for part in split_and(&expr.sql) {
        let (column, op, rhs) = split_op(part.trim())
            .ok_or_else(|| query_error(format!("unsupported where clause: {}", expr.sql)))?;
        let column = def.column(column)?;
        let current = row.get(&column).cloned().unwrap_or(Value::Null);
        let ok = match op {
            CmpOp::IsNull => current.is_null(),
            CmpOp::NotNull => !current.is_null(),
            CmpOp::Eq => sql_eq(&current, &literal(rhs.trim(), &mut args)?),
            CmpOp::Ne => {
                let value = literal(rhs.trim(), &mut args)?;
                !current.is_null() && !value.is_null() && current != value
            }
        };
        result = result && ok;
    }
    if args.next().is_some() {
        return Err(query_error(format!(
            "bind message supplies more parameters than the where clause uses: {}",
            expr.sql
        )));
    }
    Ok(result)
}

fn split_and(sql: &str) -> Vec<&str> {
    let lower = sql.to_ascii_lowercase();
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(i) = lower[start..].find(" and ") {
        parts.push(&sql[start..start + i]);
        start += i + " and ".len();
    }
    parts.push(&sql[start..]);
    parts
}

fn split_op(part: &str) -> Option<(&str, CmpOp, &str)> {
    let lower = part.to_ascii_lowercase();
    if lower.ends_with(" is not null") {
        return Some((&part[..part.len() - " is not null".len()], CmpOp::NotNull, ""));
    }
    if lower.ends_with(" is null") {
        return Some((&part[..part.len() - " is null".len()], CmpOp::IsNull, ""));
    }
    for (token, op) in [("<>", CmpOp::Ne), ("!=", CmpOp::Ne), ("=", CmpOp::Eq)] {
        if let Some(i) = part.find(token) {
            return Some((&part[..i], op, &part[i + token.len()..]));
        }
    }
    None
}

/// A placeholder, quoted string, integer, boolean or NULL
fn literal<'a>(sql: &str, args: &mut impl Iterator<Item = &'a Value>) -> Result<Value, DbError> {
    if sql == "?" {
        return args
            .next()
            .cloned()
            .ok_or_else(|| query_error("not enough arguments for placeholders"));
    }
    if sql.len() >= 2 && sql.starts_with('\'') && sql.ends_with('\'') {
        return Ok(Value::Text(sql[1..sql.len() - 1].replace("''", "'")));
    }
    if sql.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if sql.eq_ignore_ascii_case("true") || sql.eq_ignore_ascii_case("false") {
        return Ok(Value::Bool(sql.eq_ignore_ascii_case("true")));
    }
    sql.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| query_error(format!("unsupported expression: {}", sql)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowkit_kernel::{Delete, Select, Update};

    fn insert_user(id: &str, name: &str) -> Statement {
        Statement::Insert(Insert {
            table: "db_test_user".into(),
            columns: vec!["public_id".into(), "name".into()],
            values: vec![id.into(), name.into()],
            on_conflict: None,
        })
    }

    fn select_users(predicate: Predicate) -> Statement {
        Statement::Select(Select {
            table: "db_test_user".into(),
            columns: vec!["public_id".into(), "name".into(), "version".into()],
            predicate,
            limit: None,
        })
    }

    #[tokio::test]
    async fn test_insert_applies_defaults() {
        let store = MemoryStore::new();
        assert_eq!(store.execute(&insert_user("u_1", "alice")).await.unwrap(), 1);
        let rows = store.rows("db_test_user");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["version"], Value::Int(1));
        assert!(matches!(rows[0]["create_time"], Value::Timestamp(_)));
        assert_eq!(rows[0]["email"], Value::Null);
    }

    #[tokio::test]
    async fn test_unique_violations() {
        let store = MemoryStore::new();
        store.execute(&insert_user("u_1", "alice")).await.unwrap();

        let err = store.execute(&insert_user("u_1", "bob")).await.unwrap_err();
        assert_eq!(err.store_kind(), Some(StoreErrorKind::UniqueViolation));
        assert!(err.to_string().contains("db_test_user_pkey"));

        let err = store.execute(&insert_user("u_2", "alice")).await.unwrap_err();
        assert!(err.to_string().contains("db_test_user_name_key"));
        assert_eq!(store.row_count("db_test_user"), 1);
    }

    #[tokio::test]
    async fn test_conflict_update_and_predicate() {
        let store = MemoryStore::new();
        store.execute(&insert_user("u_1", "alice")).await.unwrap();

        let upsert = |version: i64| {
            Statement::Insert(Insert {
                table: "db_test_user".into(),
                columns: vec!["public_id".into(), "name".into()],
                values: vec!["u_1".into(), "alice2".into()],
                on_conflict: Some(OnConflictClause {
                    target: ConflictTarget::columns(["public_id"]),
                    resolution: ConflictResolution::Update(vec![
                        Assignment::new("name", AssignValue::Excluded("name".into())),
                        Assignment::new("version", AssignValue::Increment(1)),
                    ]),
                    predicate: Predicate::new().and_qualified_eq(
                        "db_test_user",
                        "version",
                        Value::Int(version),
                    ),
                }),
            })
        };

        assert_eq!(store.execute(&upsert(5)).await.unwrap(), 0);
        assert_eq!(store.execute(&upsert(1)).await.unwrap(), 1);
        let rows = store.rows("db_test_user");
        assert_eq!(rows[0]["name"], Value::from("alice2"));
        assert_eq!(rows[0]["version"], Value::Int(2));
    }

    #[tokio::test]
    async fn test_conflict_target_must_match_constraint() {
        let store = MemoryStore::new();
        let stmt = Statement::Insert(Insert {
            table: "db_test_user".into(),
            columns: vec!["public_id".into()],
            values: vec!["u_1".into()],
            on_conflict: Some(OnConflictClause {
                target: ConflictTarget::columns(["email"]),
                resolution: ConflictResolution::DoNothing,
                predicate: Predicate::new(),
            }),
        });
        let err = store.execute(&stmt).await.unwrap_err();
        assert!(err.to_string().contains("no unique or exclusion constraint"));
    }

    #[tokio::test]
    async fn test_update_delete_with_where_expr() {
        let store = MemoryStore::new();
        store.execute(&insert_user("u_1", "alice")).await.unwrap();
        store.execute(&insert_user("u_2", "bob")).await.unwrap();

        let update = Statement::Update(Update {
            table: "db_test_user".into(),
            assignments: vec![Assignment::new("email", AssignValue::Value("b@x".into()))],
            predicate: Predicate::new()
                .and_expr(Expr::new("name = ? and email is null", vec!["bob".into()])),
        });
        assert_eq!(store.execute(&update).await.unwrap(), 1);
        assert_eq!(store.execute(&update).await.unwrap(), 0);

        let rows = store
            .fetch(&select_users(Predicate::new().and_expr(Expr::raw("version <> 2"))))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let delete = Statement::Delete(Delete {
            table: "db_test_user".into(),
            predicate: Predicate::new().and_eq("public_id", "u_1".into()),
        });
        assert_eq!(store.execute(&delete).await.unwrap(), 1);
        assert_eq!(store.row_count("db_test_user"), 1);
    }

    #[tokio::test]
    async fn test_unknown_column_in_where() {
        let store = MemoryStore::new();
        store.execute(&insert_user("u_1", "alice")).await.unwrap();
        let err = store
            .fetch(&select_users(
                Predicate::new().and_expr(Expr::new("nope = ?", vec![1.into()])),
            ))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("column \"nope\""));
    }

    #[tokio::test]
    async fn test_transaction_isolation_and_commit() {
        let store = MemoryStore::new();
        let tx = store.begin().await.unwrap();
        tx.execute(&insert_user("u_1", "alice")).await.unwrap();
        assert_eq!(store.row_count("db_test_user"), 0);
        tx.commit().await.unwrap();
        assert_eq!(store.row_count("db_test_user"), 1);

        let err = tx.execute(&insert_user("u_2", "bob")).await.unwrap_err();
        assert!(err.to_string().contains("already been committed"));
        tx.rollback().await.unwrap();
        assert_eq!((store.begins(), store.commits(), store.rollbacks()), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let store = MemoryStore::new();
        let tx = store.begin().await.unwrap();
        tx.execute(&insert_user("u_1", "alice")).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(store.row_count("db_test_user"), 0);
        assert_eq!(store.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writer_fails_commit() {
        let store = MemoryStore::new();
        let tx = store.begin().await.unwrap();
        tx.execute(&insert_user("u_1", "alice")).await.unwrap();
        store.execute(&insert_user("u_2", "bob")).await.unwrap();

        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.store_kind(), Some(StoreErrorKind::SerializationFailure));
        assert_eq!(store.row_count("db_test_user"), 1);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryStore::new();
        store.fail_next_executes(StoreErrorKind::Deadlock, 2);
        for _ in 0..2 {
            let err = store.execute(&insert_user("u_1", "alice")).await.unwrap_err();
            assert_eq!(err.store_kind(), Some(StoreErrorKind::Deadlock));
        }
        store.execute(&insert_user("u_1", "alice")).await.unwrap();

        store.fail_next_rollbacks(1);
        let tx = store.begin().await.unwrap();
        assert!(tx.rollback().await.is_err());
        assert!(tx.rollback().await.is_ok());
    }

    #[tokio::test]
    async fn test_raw_sql_unsupported() {
        let store = MemoryStore::new();
        let err = store
            .execute(&Statement::Raw(Expr::raw("delete from db_test_user")))
            .await
            .unwrap_err();
        assert_eq!(err.store_kind(), Some(StoreErrorKind::Query));
    }
}
