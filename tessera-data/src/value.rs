use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::error::DataError;

/// A scalar stored in a [`Record`](crate::Record) field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I64(_) => "integer",
            Value::F64(_) => "float",
            Value::String(_) => "string",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean reading of the value. Integers are true when non-zero; `Null` is unknown.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::I64(i) => Some(*i != 0),
            Value::F64(f) => Some(*f != 0.0),
            Value::Null | Value::String(_) => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::I64(i) => Some(*i as f64),
            Value::F64(f) => Some(*f),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) | Value::I64(_) | Value::F64(_) => 1,
            Value::String(_) => 2,
        }
    }

    /// Comparison with SQL semantics: any `Null` operand yields `None`.
    ///
    /// Booleans compare as 0/1 and integers compare with floats numerically.
    /// Values of unrelated kinds order numbers before text.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.sort_cmp(other))
    }

    /// Total order used for sorting. `Null` sorts first.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::I64(a), Value::I64(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (a, b) if a.rank() == 1 && b.rank() == 1 => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => Ordering::Equal,
            },
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I64(i) => write!(f, "{i}"),
            Value::F64(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::I64(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::I64(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::I64(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::F64(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// Decoding of a record field into a Rust type.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be decoded from a record field",
    note = "built-in types: bool, i32, i64, u32, f64, String, Value, Option<T>"
)]
pub trait FromValue: Sized {
    fn from_value(value: &Value, field: &str) -> Result<Self, DataError>;

    /// Called when the field is absent from the record.
    fn from_missing(field: &str) -> Result<Self, DataError> {
        Err(DataError::MissingField {
            field: field.to_string(),
        })
    }
}

fn decode_error(field: &str, expected: &'static str, value: &Value) -> DataError {
    DataError::Decode {
        field: field.to_string(),
        expected,
        found: value.kind(),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value, _field: &str) -> Result<Self, DataError> {
        Ok(value.clone())
    }

    fn from_missing(_field: &str) -> Result<Self, DataError> {
        Ok(Value::Null)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value, field: &str) -> Result<Self, DataError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::I64(0) => Ok(false),
            Value::I64(1) => Ok(true),
            other => Err(decode_error(field, "bool", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value, field: &str) -> Result<Self, DataError> {
        match value {
            Value::I64(i) => Ok(*i),
            other => Err(decode_error(field, "i64", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value, field: &str) -> Result<Self, DataError> {
        match value {
            Value::I64(i) => i32::try_from(*i).map_err(|_| decode_error(field, "i32", value)),
            other => Err(decode_error(field, "i32", other)),
        }
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value, field: &str) -> Result<Self, DataError> {
        match value {
            Value::I64(i) => u32::try_from(*i).map_err(|_| decode_error(field, "u32", value)),
            other => Err(decode_error(field, "u32", other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value, field: &str) -> Result<Self, DataError> {
        match value {
            Value::F64(x) => Ok(*x),
            Value::I64(i) => Ok(*i as f64),
            other => Err(decode_error(field, "f64", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value, field: &str) -> Result<Self, DataError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(decode_error(field, "string", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value, field: &str) -> Result<Self, DataError> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v, field).map(Some),
        }
    }

    fn from_missing(_field: &str) -> Result<Self, DataError> {
        Ok(None)
    }
}
