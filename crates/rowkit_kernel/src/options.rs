//! Per-call options for reads and writes
//!
//! Options are built fresh for every call:
//!
//! ```rust
//! use rowkit_kernel::{Options, Value};
//!
//! let opts = Options::new()
//!     .version(3)
//!     .where_clause("email = ?", vec![Value::from("alice@example.com")])
//!     .after_write(|_records, rows| {
//!         assert!(rows > 0);
//!         Ok(())
//!     });
//! assert_eq!(opts.version_value(), Some(3));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::conflict::OnConflict;
use crate::error::BoxError;
use crate::resource::Resource;
use crate::statement::Expr;
use crate::value::Value;

/// Callback run before a write with the record(s) being written
pub type BeforeWriteFn = Arc<dyn Fn(&[&dyn Resource]) -> Result<(), BoxError> + Send + Sync>;

/// Callback run after a write that affected rows
pub type AfterWriteFn = Arc<dyn Fn(&[&dyn Resource], u64) -> Result<(), BoxError> + Send + Sync>;

/// Options accepted by the reader and writer
#[derive(Clone, Default)]
pub struct Options {
    before_write: Option<BeforeWriteFn>,
    after_write: Option<AfterWriteFn>,
    version: Option<u32>,
    where_clause: Option<Expr>,
    on_conflict: Option<OnConflict>,
    skip_vet_for_write: bool,
    lookup: bool,
    debug: bool,
    field_mask_paths: Vec<String>,
    null_paths: Vec<String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` before the write
    pub fn before_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&[&dyn Resource]) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.before_write = Some(Arc::new(f));
        self
    }

    /// Runs `f` after a write that affected at least one row
    pub fn after_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&[&dyn Resource], u64) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.after_write = Some(Arc::new(f));
        self
    }

    /// Requires the stored row's `version` to equal `version`
    ///
    /// Zero is rejected by the write operations.
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Adds a caller supplied predicate, ANDed with the others
    pub fn where_clause(mut self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.where_clause = Some(Expr::new(sql, args));
        self
    }

    /// Turns a create into an upsert
    pub fn on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = Some(on_conflict);
        self
    }

    /// Skips the record's own `vet_for_write`
    pub fn skip_vet_for_write(mut self, skip: bool) -> Self {
        self.skip_vet_for_write = skip;
        self
    }

    /// Reloads the record from the store after a successful write
    pub fn lookup(mut self, lookup: bool) -> Self {
        self.lookup = lookup;
        self
    }

    /// Logs every statement at debug level
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Field mask forwarded to `vet_for_write` during updates
    pub fn field_mask_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_mask_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Null paths forwarded to `vet_for_write` during updates
    pub fn null_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Copy of these options with both write callbacks removed
    ///
    /// Bulk writes run the callbacks once for the whole batch and hand this
    /// copy to each per-item write.
    pub fn without_callbacks(&self) -> Options {
        let mut opts = self.clone();
        opts.before_write = None;
        opts.after_write = None;
        opts
    }

    pub fn before_write_fn(&self) -> Option<&BeforeWriteFn> {
        self.before_write.as_ref()
    }

    pub fn after_write_fn(&self) -> Option<&AfterWriteFn> {
        self.after_write.as_ref()
    }

    pub fn version_value(&self) -> Option<u32> {
        self.version
    }

    pub fn where_expr(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    pub fn on_conflict_spec(&self) -> Option<&OnConflict> {
        self.on_conflict.as_ref()
    }

    pub fn skips_vet(&self) -> bool {
        self.skip_vet_for_write
    }

    pub fn wants_lookup(&self) -> bool {
        self.lookup
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn mask_paths(&self) -> &[String] {
        &self.field_mask_paths
    }

    pub fn nulls(&self) -> &[String] {
        &self.null_paths
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("before_write", &self.before_write.is_some())
            .field("after_write", &self.after_write.is_some())
            .field("version", &self.version)
            .field("where_clause", &self.where_clause)
            .field("on_conflict", &self.on_conflict)
            .field("skip_vet_for_write", &self.skip_vet_for_write)
            .field("lookup", &self.lookup)
            .field("debug", &self.debug)
            .field("field_mask_paths", &self.field_mask_paths)
            .field("null_paths", &self.null_paths)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictAction, ConflictTarget};

    #[test]
    fn test_defaults() {
        let opts = Options::new();
        assert!(opts.before_write_fn().is_none());
        assert!(opts.after_write_fn().is_none());
        assert_eq!(opts.version_value(), None);
        assert!(opts.where_expr().is_none());
        assert!(!opts.skips_vet());
        assert!(!opts.wants_lookup());
        assert!(opts.mask_paths().is_empty());
    }

    #[test]
    fn test_builder() {
        let opts = Options::new()
            .version(2)
            .skip_vet_for_write(true)
            .lookup(true)
            .on_conflict(OnConflict::new(
                ConflictTarget::columns(["public_id"]),
                ConflictAction::DoNothing,
            ))
            .field_mask_paths(["Name"]);
        assert_eq!(opts.version_value(), Some(2));
        assert!(opts.skips_vet());
        assert!(opts.wants_lookup());
        assert!(opts.on_conflict_spec().is_some());
        assert_eq!(opts.mask_paths(), ["Name".to_string()]);
    }

    #[test]
    fn test_clone_shares_callbacks() {
        let opts = Options::new().before_write(|_| Err("fail".into()));
        let cloned = opts.clone();
        let f = cloned.before_write_fn().unwrap();
        assert_eq!(f(&[]).unwrap_err().to_string(), "fail");
    }
}
