//! Kernel types shared by the rowkit crates
//!
//! This crate holds the value model, schema descriptors, error taxonomy,
//! write options, backoff policies and the port traits that store adapters
//! implement. It has no knowledge of any particular database.

pub mod backoff;
pub mod conflict;
pub mod error;
pub mod options;
pub mod ports;
pub mod resource;
pub mod schema;
pub mod statement;
pub mod value;

pub use backoff::{Backoff, ConstBackoff, ExpBackoff};
pub use conflict::{
    set_column_values, set_columns, ColumnValue, ConflictAction, ConflictTarget, OnConflict,
    SetValue,
};
pub use error::{BoxError, DbError, ErrorKind, HookStage, StoreErrorKind};
pub use options::{AfterWriteFn, BeforeWriteFn, Options};
pub use ports::{Executor, Reader, Store, Transaction, Writer};
pub use resource::{Model, OpType, Resource, VetOptions};
pub use schema::{Field, FieldInfo, LifecycleHook, Schema, VERSION_COLUMN};
pub use statement::{
    AssignValue, Assignment, Condition, ConflictResolution, Delete, Expr, Insert,
    OnConflictClause, Predicate, Row, Select, Statement, Update,
};
pub use value::Value;
