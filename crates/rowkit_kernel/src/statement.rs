//! Structured statements
//!
//! The writer builds these and hands them to an
//! [`Executor`](crate::ports::Executor). Turning them into SQL text is the
//! adapter's job, which keeps dialect details out of the write logic.
//! Raw SQL fragments ([`Expr`]) use `?` as the argument placeholder.

use std::collections::BTreeMap;
use std::fmt;

use crate::conflict::ConflictTarget;
use crate::value::Value;

/// A row returned by a fetch, keyed by column name
pub type Row = BTreeMap<String, Value>;

/// Raw SQL fragment with positional `?` arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Expr {
    /// Creates an expression with arguments
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// Creates an expression without arguments, e.g. `Expr::raw("NULL")`
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    /// Number of `?` placeholders in the SQL text
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

/// One conjunct of a where clause
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `[table.]column = value`
    Eq {
        table: Option<String>,
        column: String,
        value: Value,
    },
    /// Caller supplied SQL
    Expr(Expr),
}

/// Conjunction of conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `column = value`
    pub fn and_eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.conditions.push(Condition::Eq {
            table: None,
            column: column.into(),
            value,
        });
        self
    }

    /// Adds `table.column = value`
    pub fn and_qualified_eq(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        value: Value,
    ) -> Self {
        self.conditions.push(Condition::Eq {
            table: Some(table.into()),
            column: column.into(),
            value,
        });
        self
    }

    /// Adds a raw SQL condition
    pub fn and_expr(mut self, expr: Expr) -> Self {
        self.conditions.push(Condition::Expr(expr));
        self
    }

    /// Appends every condition of `other`
    pub fn and(mut self, other: Predicate) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

/// Right-hand side of a `SET column = ...`
#[derive(Debug, Clone, PartialEq)]
pub enum AssignValue {
    /// A literal value
    Value(Value),
    /// SQL NULL, used for explicitly cleared fields
    Null,
    /// The value proposed by the conflicting insert
    Excluded(String),
    /// `column = column + n`
    Increment(i64),
    /// Caller supplied SQL
    Expr(Expr),
}

/// A single `SET` item
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: AssignValue,
}

impl Assignment {
    pub fn new(column: impl Into<String>, value: AssignValue) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// What an insert does when it hits a conflict
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResolution {
    DoNothing,
    Update(Vec<Assignment>),
}

/// Resolved `ON CONFLICT` clause
#[derive(Debug, Clone, PartialEq)]
pub struct OnConflictClause {
    pub target: ConflictTarget,
    pub resolution: ConflictResolution,
    /// Guards the conflict update; empty means unconditional
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
    pub on_conflict: Option<OnConflictClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<Assignment>,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub columns: Vec<String>,
    pub predicate: Predicate,
    pub limit: Option<u64>,
}

/// A statement for an executor
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Select(Select),
    Raw(Expr),
}

impl Statement {
    /// Table targeted by the statement, `None` for raw SQL
    pub fn table(&self) -> Option<&str> {
        match self {
            Statement::Insert(s) => Some(&s.table),
            Statement::Update(s) => Some(&s.table),
            Statement::Delete(s) => Some(&s.table),
            Statement::Select(s) => Some(&s.table),
            Statement::Raw(_) => None,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Insert(s) => {
                write!(f, "insert into {} ({})", s.table, s.columns.join(", "))?;
                if s.on_conflict.is_some() {
                    f.write_str(" on conflict")?;
                }
                Ok(())
            }
            Statement::Update(s) => {
                let cols: Vec<&str> = s.assignments.iter().map(|a| a.column.as_str()).collect();
                write!(f, "update {} set {}", s.table, cols.join(", "))
            }
            Statement::Delete(s) => write!(f, "delete from {}", s.table),
            Statement::Select(s) => write!(f, "select from {}", s.table),
            Statement::Raw(e) => f.write_str(&e.sql),
        }
    }
}
