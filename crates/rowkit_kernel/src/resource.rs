//! Records that rowkit can read and write
//!
//! Application types implement [`Model`] by returning their static
//! [`Schema`]. Every model is also a [`Resource`], the object-safe view the
//! reader and writer work with, so records of different types can flow
//! through the same `&mut dyn Resource` parameters.

use async_trait::async_trait;

use crate::error::DbError;
use crate::ports::Reader;
use crate::schema::{FieldInfo, LifecycleHook, Schema};
use crate::value::Value;

/// Kind of write a record is being vetted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Create,
    Update,
    Delete,
}

/// Context handed to [`Model::vet_for_write`]
///
/// For updates it carries the requested field mask and null paths so a
/// record can refuse changes to fields it considers immutable.
#[derive(Debug, Clone, Copy, Default)]
pub struct VetOptions<'a> {
    pub field_mask_paths: &'a [String],
    pub null_paths: &'a [String],
}

/// A record type with a static schema descriptor
#[async_trait]
pub trait Model: Sized + Send + Sync + 'static {
    /// The descriptor, built once per type
    fn schema() -> &'static Schema<Self>;

    /// Table to write to; override for records whose table varies per instance
    fn table_name(&self) -> &str {
        Self::schema().table()
    }

    /// Validates the record before a create or update
    async fn vet_for_write(
        &self,
        _reader: &dyn Reader,
        _op: OpType,
        _opts: &VetOptions<'_>,
    ) -> Result<(), DbError> {
        Ok(())
    }
}

/// Object-safe introspection over a record
#[async_trait]
pub trait Resource: Send + Sync {
    /// Table the record lives in
    fn table_name(&self) -> &str;

    /// Name of the concrete record type
    fn type_name(&self) -> &'static str;

    /// All fields in declaration order
    fn fields(&self) -> Vec<FieldInfo>;

    /// Looks a field up by exact field or column name
    fn field(&self, name: &str) -> Option<FieldInfo>;

    /// Current value of a field, `None` when no such field exists
    fn value_of(&self, name: &str) -> Option<Value>;

    /// Writes a field; `Null` resets it to its zero value
    fn set_value(&mut self, name: &str, value: Value) -> Result<(), DbError>;

    /// Lifecycle callbacks the type declares
    fn lifecycle_hooks(&self) -> &[LifecycleHook];

    /// Validates the record before a write
    async fn vet_for_write(
        &self,
        reader: &dyn Reader,
        op: OpType,
        opts: &VetOptions<'_>,
    ) -> Result<(), DbError>;

    /// Primary key fields
    fn primary_keys(&self) -> Vec<FieldInfo> {
        self.fields().into_iter().filter(|f| f.primary_key).collect()
    }

    /// Checks whether the record has an optimistic locking column
    fn has_version(&self) -> bool {
        self.fields().iter().any(FieldInfo::is_version)
    }
}

#[async_trait]
impl<T: Model> Resource for T {
    fn table_name(&self) -> &str {
        Model::table_name(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn fields(&self) -> Vec<FieldInfo> {
        T::schema().fields().iter().map(|f| f.info()).collect()
    }

    fn field(&self, name: &str) -> Option<FieldInfo> {
        T::schema().find(name).map(|f| f.info())
    }

    fn value_of(&self, name: &str) -> Option<Value> {
        T::schema().find(name).map(|f| f.get(self))
    }

    fn set_value(&mut self, name: &str, value: Value) -> Result<(), DbError> {
        match T::schema().find(name) {
            Some(f) => f.set(self, value),
            None => Err(DbError::invalid(format!(
                "{} has no field {}",
                T::schema().table(),
                name
            ))),
        }
    }

    fn lifecycle_hooks(&self) -> &[LifecycleHook] {
        T::schema().hooks()
    }

    async fn vet_for_write(
        &self,
        reader: &dyn Reader,
        op: OpType,
        opts: &VetOptions<'_>,
    ) -> Result<(), DbError> {
        Model::vet_for_write(self, reader, op, opts).await
    }
}
