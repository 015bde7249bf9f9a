//! PostgreSQL store and transaction

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use rowkit_kernel::{DbError, Executor, Row, Statement, Store, StoreErrorKind, Transaction, Value};

use crate::error::store_error;
use crate::pool::{create_pool, DatabaseConfig};
use crate::sql::{render, Rendered};

/// [`Store`] backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the pool described by `config` and wraps it
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        Ok(Self::new(create_pool(config).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Executor for PgStore {
    async fn execute(&self, statement: &Statement) -> Result<u64, DbError> {
        let rendered = render(statement)?;
        debug!(sql = %rendered.sql, "execute");
        let result = bind_all(&rendered)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }

    async fn fetch(&self, statement: &Statement) -> Result<Vec<Row>, DbError> {
        let rendered = render(statement)?;
        debug!(sql = %rendered.sql, "fetch");
        let rows = bind_all(&rendered)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Arc<dyn Transaction>, DbError> {
        let tx = self.pool.begin().await.map_err(store_error)?;
        Ok(Arc::new(PgTransaction {
            tx: Mutex::new(Some(tx)),
        }))
    }
}

/// An open PostgreSQL transaction
///
/// Dropping it without a commit rolls it back when the connection returns
/// to the pool.
pub struct PgTransaction {
    tx: Mutex<Option<sqlx::Transaction<'static, Postgres>>>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for PgTransaction {
    async fn execute(&self, statement: &Statement) -> Result<u64, DbError> {
        let rendered = render(statement)?;
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        debug!(sql = %rendered.sql, "execute in transaction");
        let result = bind_all(&rendered)
            .execute(&mut **tx)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }

    async fn fetch(&self, statement: &Statement) -> Result<Vec<Row>, DbError> {
        let rendered = render(statement)?;
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        debug!(sql = %rendered.sql, "fetch in transaction");
        let rows = bind_all(&rendered)
            .fetch_all(&mut **tx)
            .await
            .map_err(store_error)?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(&self) -> Result<(), DbError> {
        let tx = self.tx.lock().await.take().ok_or_else(finished)?;
        tx.commit().await.map_err(store_error)
    }

    async fn rollback(&self) -> Result<(), DbError> {
        match self.tx.lock().await.take() {
            Some(tx) => tx.rollback().await.map_err(store_error),
            None => Ok(()),
        }
    }
}

fn finished() -> DbError {
    DbError::store(
        StoreErrorKind::Query,
        "transaction has already been committed or rolled back",
    )
}

fn bind_all(rendered: &Rendered) -> Query<'_, Postgres, PgArguments> {
    rendered
        .args
        .iter()
        .cloned()
        .fold(sqlx::query(&rendered.sql), bind_value)
}

fn bind_value(query: Query<'_, Postgres, PgArguments>, value: Value) -> Query<'_, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(v),
        Value::Int(v) => query.bind(v),
        Value::Float(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
        Value::Bytes(v) => query.bind(v),
        Value::Decimal(v) => query.bind(v),
        Value::Timestamp(v) => query.bind(v),
        Value::Uuid(v) => query.bind(v),
        Value::Json(v) => query.bind(v),
    }
}

/// Converts a driver row into a column map using each column's type
fn decode_row(row: &PgRow) -> Result<Row, DbError> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, i, column.type_info().name())?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_column(row: &PgRow, i: usize, type_name: &str) -> Result<Value, DbError> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(i).map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(i).map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(i).map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(i).map(Value::from),
        "FLOAT4" => row.try_get::<Option<f32>, _>(i).map(Value::from),
        "FLOAT8" => row.try_get::<Option<f64>, _>(i).map(Value::from),
        "NUMERIC" => row.try_get::<Option<Decimal>, _>(i).map(Value::from),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(i).map(Value::from),
        "TIMESTAMPTZ" => row.try_get::<Option<DateTime<Utc>>, _>(i).map(Value::from),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(i)
            .map(|v| Value::from(v.map(|t| t.and_utc()))),
        "UUID" => row.try_get::<Option<Uuid>, _>(i).map(Value::from),
        "JSON" | "JSONB" => row.try_get::<Option<serde_json::Value>, _>(i).map(Value::from),
        _ => row.try_get::<Option<String>, _>(i).map(Value::from),
    };
    value.map_err(|e| DbError::internal(format!("decode column {} ({}): {}", i, type_name, e)))
}
