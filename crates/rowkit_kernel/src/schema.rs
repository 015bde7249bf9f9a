//! Schema descriptors
//!
//! A [`Schema`] is built once per record type and lists its fields in
//! declaration order, each with an accessor and a mutator. Write operations
//! walk the descriptor instead of inspecting types at runtime.
//!
//! ```rust
//! use rowkit_kernel::schema::{Field, Schema};
//!
//! struct Car {
//!     public_id: String,
//!     name: String,
//! }
//!
//! let schema = Schema::new("car")
//!     .field(
//!         Field::new("PublicId", |c: &Car| c.public_id.clone().into(), |c, v| {
//!             c.public_id = v.try_into()?;
//!             Ok(())
//!         })
//!         .column("public_id")
//!         .primary_key(),
//!     )
//!     .field(Field::new("Name", |c: &Car| c.name.clone().into(), |c, v| {
//!         c.name = v.try_into()?;
//!         Ok(())
//!     }));
//!
//! assert_eq!(schema.find("public_id").unwrap().name(), "PublicId");
//! ```

use crate::error::DbError;
use crate::value::Value;

/// Reads a field off a record
pub type Getter<T> = fn(&T) -> Value;

/// Writes a field on a record; `Null` resets it to its zero value
pub type Setter<T> = fn(&mut T, Value) -> Result<(), DbError>;

/// Name of the optimistic locking column
pub const VERSION_COLUMN: &str = "version";

/// ORM style lifecycle callbacks a record type may declare
///
/// rowkit does not run these; declaring any of them makes writes fail so
/// the callbacks are never silently skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    BeforeCreate,
    AfterCreate,
    BeforeSave,
    AfterSave,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    AfterFind,
}

/// Type-erased description of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name as callers spell it in field masks
    pub name: &'static str,
    /// Column name in the store
    pub column: &'static str,
    /// Part of the primary key
    pub primary_key: bool,
    /// Omitted from inserts while zero so the store default applies
    pub store_default: bool,
}

impl FieldInfo {
    /// Checks whether this is the optimistic locking column
    pub fn is_version(&self) -> bool {
        self.column.eq_ignore_ascii_case(VERSION_COLUMN)
    }
}

/// A field of record type `T`
pub struct Field<T> {
    name: &'static str,
    column: Option<&'static str>,
    primary_key: bool,
    store_default: bool,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Field<T> {
    /// Creates a field whose column name defaults to the field name
    pub fn new(name: &'static str, get: Getter<T>, set: Setter<T>) -> Self {
        Self {
            name,
            column: None,
            primary_key: false,
            store_default: false,
            get,
            set,
        }
    }

    /// Maps the field onto a differently named column
    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    /// Marks the field as part of the primary key
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Lets the store default the column when the field is zero on insert
    pub fn store_default(mut self) -> Self {
        self.store_default = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared column mapping, falling back to the field name verbatim
    pub fn column_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Reads the field's current value
    pub fn get(&self, record: &T) -> Value {
        (self.get)(record)
    }

    /// Writes the field
    pub fn set(&self, record: &mut T, value: Value) -> Result<(), DbError> {
        (self.set)(record, value)
            .map_err(|e| DbError::internal(format!("field {}: {}", self.name, e)))
    }

    /// Type-erased description
    pub fn info(&self) -> FieldInfo {
        FieldInfo {
            name: self.name,
            column: self.column_name(),
            primary_key: self.primary_key,
            // the version column always takes the store default on insert
            store_default: self.store_default
                || self.column_name().eq_ignore_ascii_case(VERSION_COLUMN),
        }
    }
}

/// Ordered field descriptors for record type `T`
pub struct Schema<T> {
    table: &'static str,
    fields: Vec<Field<T>>,
    hooks: Vec<LifecycleHook>,
}

impl<T> Schema<T> {
    /// Creates an empty schema for the given table
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            fields: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Appends a field
    pub fn field(mut self, field: Field<T>) -> Self {
        self.fields.push(field);
        self
    }

    /// Records that the type declares a lifecycle callback
    pub fn declares_hook(mut self, hook: LifecycleHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    pub fn hooks(&self) -> &[LifecycleHook] {
        &self.hooks
    }

    /// Finds a field by exact field name or column name
    pub fn find(&self, name: &str) -> Option<&Field<T>> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.column_name() == name))
    }

    /// Primary key fields in declaration order
    pub fn primary_keys(&self) -> impl Iterator<Item = &Field<T>> {
        self.fields.iter().filter(|f| f.primary_key)
    }

    /// Checks whether the table has an optimistic locking column
    pub fn has_version(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.column_name().eq_ignore_ascii_case(VERSION_COLUMN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Widget {
        id: i64,
        label: String,
        version: u32,
    }

    fn widget_schema() -> Schema<Widget> {
        Schema::new("widget")
            .field(
                Field::new("Id", |w: &Widget| w.id.into(), |w, v| {
                    w.id = v.try_into()?;
                    Ok(())
                })
                .column("id")
                .primary_key(),
            )
            .field(Field::new("Label", |w: &Widget| w.label.clone().into(), |w, v| {
                w.label = v.try_into()?;
                Ok(())
            }))
            .field(
                Field::new("Version", |w: &Widget| w.version.into(), |w, v| {
                    w.version = v.try_into()?;
                    Ok(())
                })
                .column("version"),
            )
    }

    #[test]
    fn test_find_by_name_or_column() {
        let schema = widget_schema();
        assert_eq!(schema.find("Id").unwrap().column_name(), "id");
        assert_eq!(schema.find("id").unwrap().name(), "Id");
        assert_eq!(schema.find("Label").unwrap().column_name(), "Label");
        assert!(schema.find("label").is_none());
    }

    #[test]
    fn test_version_is_store_default() {
        let schema = widget_schema();
        assert!(schema.has_version());
        assert!(schema.find("Version").unwrap().info().store_default);
        assert!(schema.find("Version").unwrap().info().is_version());
        assert!(!schema.find("Label").unwrap().info().store_default);
    }

    #[test]
    fn test_set_reports_field() {
        let schema = widget_schema();
        let mut w = Widget::default();
        let err = schema
            .find("Label")
            .unwrap()
            .set(&mut w, Value::Int(3))
            .unwrap_err();
        assert!(err.to_string().starts_with("field Label:"));
    }
}
