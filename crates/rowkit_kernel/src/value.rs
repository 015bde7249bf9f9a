//! Dynamic column values
//!
//! Schema accessors convert record fields into [`Value`]s and mutators
//! convert them back. Conversions out of a value treat `Null` as the zero
//! value of the target type, which is also how non-creatable fields are
//! reset before an insert.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::DbError;

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text value
    Text(String),
    /// Binary value
    Bytes(Vec<u8>),
    /// Exact decimal
    Decimal(Decimal),
    /// Timestamp with time zone
    Timestamp(DateTime<Utc>),
    /// UUID value
    Uuid(Uuid),
    /// JSON document
    Json(serde_json::Value),
}

impl Value {
    /// Reports whether this is the zero value for its type
    ///
    /// `Null`, `false`, numeric zero, empty text or bytes, the Unix epoch,
    /// the nil UUID and JSON `null` are all zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Decimal(d) => d.is_zero(),
            Value::Timestamp(t) => *t == DateTime::<Utc>::default(),
            Value::Uuid(u) => u.is_nil(),
            Value::Json(j) => j.is_null(),
        }
    }

    /// Checks for SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in conversion errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Decimal(_) => "decimal",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
        }
    }

    fn mismatch(&self, want: &str) -> DbError {
        DbError::internal(format!(
            "cannot convert {} value to {}",
            self.type_name(),
            want
        ))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Json(j) => write!(f, "{}", j),
        }
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    Decimal => Decimal,
    DateTime<Utc> => Timestamp,
    Uuid => Uuid,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<Value> for bool {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        match v {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(b),
            other => Err(other.mismatch("bool")),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        match v {
            Value::Null => Ok(0),
            Value::Int(i) => Ok(i),
            other => Err(other.mismatch("i64")),
        }
    }
}

impl TryFrom<Value> for i32 {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        let i = i64::try_from(v)?;
        i32::try_from(i).map_err(|_| DbError::internal(format!("{} overflows i32", i)))
    }
}

impl TryFrom<Value> for u32 {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        let i = i64::try_from(v)?;
        u32::try_from(i).map_err(|_| DbError::internal(format!("{} overflows u32", i)))
    }
}

impl TryFrom<Value> for f64 {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        match v {
            Value::Null => Ok(0.0),
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => Err(other.mismatch("f64")),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        match v {
            Value::Null => Ok(String::new()),
            Value::Text(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        match v {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(b) => Ok(b),
            other => Err(other.mismatch("bytes")),
        }
    }
}

impl TryFrom<Value> for Decimal {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        match v {
            Value::Null => Ok(Decimal::ZERO),
            Value::Decimal(d) => Ok(d),
            Value::Int(i) => Ok(Decimal::from(i)),
            other => Err(other.mismatch("decimal")),
        }
    }
}

impl TryFrom<Value> for Uuid {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        match v {
            Value::Null => Ok(Uuid::nil()),
            Value::Uuid(u) => Ok(u),
            other => Err(other.mismatch("uuid")),
        }
    }
}

impl TryFrom<Value> for DateTime<Utc> {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        match v {
            Value::Null => Ok(DateTime::<Utc>::default()),
            Value::Timestamp(t) => Ok(t),
            other => Err(other.mismatch("timestamp")),
        }
    }
}

impl TryFrom<Value> for serde_json::Value {
    type Error = DbError;

    fn try_from(v: Value) -> Result<Self, DbError> {
        match v {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Json(j) => Ok(j),
            other => Err(other.mismatch("json")),
        }
    }
}

/// Converts a value into an optional field, mapping `Null` to `None`
pub fn optional<T>(v: Value) -> Result<Option<T>, DbError>
where
    T: TryFrom<Value, Error = DbError>,
{
    match v {
        Value::Null => Ok(None),
        other => T::try_from(other).map(Some),
    }
}
