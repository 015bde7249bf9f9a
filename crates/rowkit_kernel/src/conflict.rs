//! On-conflict (upsert) specifications
//!
//! An [`OnConflict`] names the conflict target and the action to take when
//! an insert collides with an existing row. The writer validates it against
//! the record's schema and turns it into an
//! [`OnConflictClause`](crate::statement::OnConflictClause).

use std::collections::BTreeMap;

use crate::statement::Expr;
use crate::value::Value;

/// Where the conflict is detected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictTarget {
    /// Columns covered by a unique index
    Columns(Vec<String>),
    /// A named constraint
    Constraint(String),
}

impl ConflictTarget {
    /// Convenience constructor for a column list
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConflictTarget::Columns(columns.into_iter().map(Into::into).collect())
    }

    pub fn constraint(name: impl Into<String>) -> Self {
        ConflictTarget::Constraint(name.into())
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            ConflictTarget::Columns(_) => "Columns",
            ConflictTarget::Constraint(_) => "Constraint",
        }
    }
}

/// Source of a column assignment in a conflict update
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    /// Take the value the insert proposed for this column
    Excluded,
    /// Evaluate an expression
    Expr(Expr),
    /// Use a literal value
    Value(Value),
}

/// A column assignment used by [`ConflictAction::SetColumns`]
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue {
    pub column: String,
    pub value: SetValue,
}

/// What to do on conflict
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    /// Leave the existing row untouched
    DoNothing,
    /// Overwrite every inserted non-key column with the proposed values
    UpdateAll,
    /// Apply specific assignments
    SetColumns(Vec<ColumnValue>),
}

impl ConflictAction {
    pub fn variant_name(&self) -> &'static str {
        match self {
            ConflictAction::DoNothing => "DoNothing",
            ConflictAction::UpdateAll => "UpdateAll",
            ConflictAction::SetColumns(_) => "SetColumns",
        }
    }
}

/// Target plus action
#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    pub target: ConflictTarget,
    pub action: ConflictAction,
}

impl OnConflict {
    pub fn new(target: ConflictTarget, action: ConflictAction) -> Self {
        Self { target, action }
    }
}

/// Assignments that copy the proposed value of each named column
pub fn set_columns<I, S>(columns: I) -> Vec<ColumnValue>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    columns
        .into_iter()
        .map(|c| ColumnValue {
            column: c.into(),
            value: SetValue::Excluded,
        })
        .collect()
}

/// Assignments from a column to value/expression map, ordered by column
pub fn set_column_values(values: BTreeMap<String, SetValue>) -> Vec<ColumnValue> {
    values
        .into_iter()
        .map(|(column, value)| ColumnValue { column, value })
        .collect()
}
