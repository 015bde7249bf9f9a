//! Writer configuration
//!
//! Field deny-lists are plain values handed to [`Rw`](crate::Rw) when it is
//! built, so two writers in one process can use different rules.

use serde::{Deserialize, Serialize};

/// Column that stays fixed once a row exists
pub const DEFAULT_IMMUTABLE_COLUMN: &str = "create_time";

/// Rules applied by the write operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Fields reset to their zero value before an insert so the store
    /// default applies
    pub non_creatable_fields: Vec<String>,
    /// Fields silently dropped from update field masks
    pub non_updatable_fields: Vec<String>,
    /// Columns an on-conflict assignment may never target, in addition to
    /// the primary key
    pub immutable_columns: Vec<String>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            non_creatable_fields: Vec::new(),
            non_updatable_fields: Vec::new(),
            immutable_columns: vec![DEFAULT_IMMUTABLE_COLUMN.to_string()],
        }
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fields cleared before every insert
    pub fn non_creatable_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_creatable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the fields removed from update masks
    pub fn non_updatable_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_updatable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the immutable column list
    pub fn immutable_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.immutable_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Checks, ignoring case, whether `name` may not be set by an update
    pub fn is_non_updatable(&self, name: &str) -> bool {
        self.non_updatable_fields
            .iter()
            .any(|f| f.eq_ignore_ascii_case(name))
    }

    /// Checks, ignoring case, whether `column` is immutable
    pub fn is_immutable_column(&self, column: &str) -> bool {
        self.immutable_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WriterConfig::default();
        assert!(config.non_creatable_fields.is_empty());
        assert!(config.non_updatable_fields.is_empty());
        assert!(config.is_immutable_column("CREATE_TIME"));
    }

    #[test]
    fn test_builder() {
        let config = WriterConfig::new()
            .non_creatable_fields(["CreateTime", "UpdateTime"])
            .non_updatable_fields(["PublicId", "CreateTime"])
            .immutable_columns(["created_at"]);
        assert_eq!(config.non_creatable_fields.len(), 2);
        assert!(config.is_non_updatable("publicid"));
        assert!(!config.is_non_updatable("Name"));
        assert!(config.is_immutable_column("created_at"));
        assert!(!config.is_immutable_column("create_time"));
    }
}
