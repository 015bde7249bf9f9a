//! Port definitions
//!
//! These traits define the seams between the write logic and the outside
//! world. Store adapters (PostgreSQL, the in-memory test store) implement
//! [`Store`], [`Transaction`] and [`Executor`]; application code talks to
//! [`Reader`] and [`Writer`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DbError;
use crate::options::Options;
use crate::resource::Resource;
use crate::statement::{Row, Statement};
use crate::value::Value;

/// Runs statements against a store or an open transaction
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes a statement and returns the number of affected rows
    async fn execute(&self, statement: &Statement) -> Result<u64, DbError>;

    /// Executes a statement and returns the rows it produced
    async fn fetch(&self, statement: &Statement) -> Result<Vec<Row>, DbError>;
}

/// An open transaction
///
/// After `commit` or `rollback` the transaction is finished and further
/// statements fail.
#[async_trait]
pub trait Transaction: Executor {
    async fn commit(&self) -> Result<(), DbError>;

    async fn rollback(&self) -> Result<(), DbError>;
}

/// A connection source that can open transactions
#[async_trait]
pub trait Store: Executor {
    /// Begins a new transaction
    async fn begin(&self) -> Result<Arc<dyn Transaction>, DbError>;
}

/// Read operations
#[async_trait]
pub trait Reader: Send + Sync {
    /// Loads a record by its primary key
    ///
    /// # Arguments
    ///
    /// * `resource` - Record with its primary key set; populated in place
    /// * `opts` - Only `debug` is honoured
    ///
    /// # Returns
    ///
    /// `RecordNotFound` when no row matches
    async fn lookup_by_id(&self, resource: &mut dyn Resource, opts: Options)
        -> Result<(), DbError>;

    /// Loads the first record matching a `?` parameterised where clause
    async fn lookup_where(
        &self,
        resource: &mut dyn Resource,
        where_sql: &str,
        args: Vec<Value>,
        opts: Options,
    ) -> Result<(), DbError>;

    /// Runs a raw query and returns its rows
    async fn query(&self, sql: &str, args: Vec<Value>) -> Result<Vec<Row>, DbError>;
}

/// Write operations
///
/// Every write returns the number of affected rows; zero is not an error.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Executes a raw statement
    async fn exec(&self, sql: &str, args: Vec<Value>) -> Result<u64, DbError>;

    /// Inserts a record, optionally as an upsert
    async fn create(&self, resource: &mut dyn Resource, opts: Options) -> Result<u64, DbError>;

    /// Inserts records of a single type
    async fn create_items(
        &self,
        resources: &mut [&mut dyn Resource],
        opts: Options,
    ) -> Result<u64, DbError>;

    /// Updates the fields named in `field_mask_paths` to their current values
    /// and sets the fields named in `set_to_null_paths` to NULL
    async fn update(
        &self,
        resource: &mut dyn Resource,
        field_mask_paths: &[&str],
        set_to_null_paths: &[&str],
        opts: Options,
    ) -> Result<u64, DbError>;

    /// Deletes a record by primary key
    async fn delete(&self, resource: &dyn Resource, opts: Options) -> Result<u64, DbError>;

    /// Deletes records of a single type
    async fn delete_items(
        &self,
        resources: &[&dyn Resource],
        opts: Options,
    ) -> Result<u64, DbError>;
}
