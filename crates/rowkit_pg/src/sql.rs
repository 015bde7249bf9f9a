//! PostgreSQL rendering of rowkit statements
//!
//! Identifiers are double quoted and values become `$n` bind parameters.
//! NULL values are written inline so PostgreSQL infers the column type
//! instead of the driver guessing one.

use rowkit_kernel::{
    AssignValue, Assignment, Condition, ConflictResolution, ConflictTarget, DbError, Expr,
    Insert, OnConflictClause, Predicate, Select, Statement, Update, Value,
};

/// SQL text with its bind parameters in order
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Renders a statement
///
/// # Errors
///
/// `InvalidParameter` when a raw fragment's `?` placeholders do not match
/// its arguments
pub fn render(statement: &Statement) -> Result<Rendered, DbError> {
    let mut b = Builder::default();
    match statement {
        Statement::Insert(insert) => b.insert(insert)?,
        Statement::Update(update) => b.update(update)?,
        Statement::Delete(delete) => {
            b.push("delete from ");
            b.push(&ident(&delete.table));
            b.predicate(&delete.predicate)?;
        }
        Statement::Select(select) => b.select(select)?,
        Statement::Raw(expr) => b.expr(expr)?,
    }
    Ok(Rendered {
        sql: b.sql,
        args: b.args,
    })
}

/// Quotes a possibly schema qualified identifier
pub fn ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Default)]
struct Builder {
    sql: String,
    args: Vec<Value>,
}

impl Builder {
    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn value(&mut self, value: &Value) {
        if value.is_null() {
            self.push("NULL");
        } else {
            self.args.push(value.clone());
            let n = self.args.len();
            self.push(&format!("${}", n));
        }
    }

    /// Copies a raw fragment, turning each unquoted `?` into a parameter
    fn expr(&mut self, expr: &Expr) -> Result<(), DbError> {
        let mut args = expr.args.iter();
        let mut quoted = false;
        for ch in expr.sql.chars() {
            match ch {
                '\'' => {
                    quoted = !quoted;
                    self.sql.push(ch);
                }
                '?' if !quoted => {
                    let value = args.next().ok_or_else(|| {
                        DbError::invalid(format!("not enough arguments for: {}", expr.sql))
                    })?;
                    self.value(value);
                }
                _ => self.sql.push(ch),
            }
        }
        if args.next().is_some() {
            return Err(DbError::invalid(format!(
                "too many arguments for: {}",
                expr.sql
            )));
        }
        Ok(())
    }

    fn insert(&mut self, insert: &Insert) -> Result<(), DbError> {
        self.push("insert into ");
        self.push(&ident(&insert.table));
        if insert.columns.is_empty() {
            self.push(" default values");
        } else {
            let cols: Vec<String> = insert.columns.iter().map(|c| ident(c)).collect();
            self.push(&format!(" ({}) values (", cols.join(", ")));
            for (i, value) in insert.values.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.value(value);
            }
            self.push(")");
        }
        if let Some(clause) = &insert.on_conflict {
            self.on_conflict(&insert.table, clause)?;
        }
        Ok(())
    }

    fn on_conflict(&mut self, table: &str, clause: &OnConflictClause) -> Result<(), DbError> {
        match &clause.target {
            ConflictTarget::Columns(cols) => {
                let cols: Vec<String> = cols.iter().map(|c| ident(c)).collect();
                self.push(&format!(" on conflict ({})", cols.join(", ")));
            }
            ConflictTarget::Constraint(name) => {
                self.push(" on conflict on constraint ");
                self.push(&ident(name));
            }
        }
        match &clause.resolution {
            ConflictResolution::DoNothing => self.push(" do nothing"),
            ConflictResolution::Update(assignments) => {
                self.push(" do update set ");
                self.assignments(table, assignments)?;
                self.predicate(&clause.predicate)?;
            }
        }
        Ok(())
    }

    fn update(&mut self, update: &Update) -> Result<(), DbError> {
        self.push("update ");
        self.push(&ident(&update.table));
        self.push(" set ");
        self.assignments(&update.table, &update.assignments)?;
        self.predicate(&update.predicate)
    }

    fn assignments(&mut self, table: &str, assignments: &[Assignment]) -> Result<(), DbError> {
        for (i, a) in assignments.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            let column = ident(&a.column);
            self.push(&column);
            self.push(" = ");
            match &a.value {
                AssignValue::Value(v) => self.value(v),
                AssignValue::Null => self.push("NULL"),
                AssignValue::Excluded(c) => {
                    self.push("excluded.");
                    self.push(&ident(c));
                }
                AssignValue::Increment(n) => {
                    self.push(&format!("{}.{} + {}", ident(table), column, n));
                }
                AssignValue::Expr(expr) => self.expr(expr)?,
            }
        }
        Ok(())
    }

    fn select(&mut self, select: &Select) -> Result<(), DbError> {
        self.push("select ");
        if select.columns.is_empty() {
            self.push("*");
        } else {
            let cols: Vec<String> = select.columns.iter().map(|c| ident(c)).collect();
            self.push(&cols.join(", "));
        }
        self.push(" from ");
        self.push(&ident(&select.table));
        self.predicate(&select.predicate)?;
        if let Some(limit) = select.limit {
            self.push(&format!(" limit {}", limit));
        }
        Ok(())
    }

    fn predicate(&mut self, predicate: &Predicate) -> Result<(), DbError> {
        for (i, condition) in predicate.conditions().iter().enumerate() {
            self.push(if i == 0 { " where " } else { " and " });
            match condition {
                Condition::Eq {
                    table,
                    column,
                    value,
                } => {
                    if let Some(table) = table {
                        self.push(&ident(table));
                        self.push(".");
                    }
                    self.push(&ident(column));
                    if value.is_null() {
                        self.push(" is null");
                    } else {
                        self.push(" = ");
                        self.value(value);
                    }
                }
                Condition::Expr(expr) => {
                    self.push("(");
                    self.expr(expr)?;
                    self.push(")");
                }
            }
        }
        Ok(())
    }
}
