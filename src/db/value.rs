//! Host-side values decoded from result fields.
//!
//! This module defines `Value`, the decoded form of a field, and the
//! `DatabaseValue` trait that lets callers extract Rust types from it
//! without matching on every variant.

use std::fmt::{self, Debug};

use serde::Serialize;

use super::tagged::FieldKind;

/// A decoded field value.
///
/// Text-carrying kinds keep their own variant so callers can tell a `DATE`
/// column from a plain string even though both arrive as text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int32(i32),
    Int64(i64),
    Double(f64),
    Bool(bool),
    Text(String),
    DateTime(String),
    Date(String),
    Uri(String),
}

impl Value {
    /// The field kind this value was decoded from (`NONE` for null).
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Null => FieldKind::None,
            Value::Int32(_) => FieldKind::Int32,
            Value::Int64(_) => FieldKind::Int64,
            Value::Double(_) => FieldKind::Double,
            Value::Bool(_) => FieldKind::Bool,
            Value::Text(_) => FieldKind::String,
            Value::DateTime(_) => FieldKind::DateTime,
            Value::Date(_) => FieldKind::Date,
            Value::Uri(_) => FieldKind::Uri,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Text(s) | Value::DateTime(s) | Value::Date(s) | Value::Uri(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Trait for database values that can be extracted to Rust types.
pub trait DatabaseValue: Clone + Debug {
    /// Extract as String if the value is string-like.
    ///
    /// Returns `None` if the value is null or not string-like.
    fn as_string(&self) -> Option<String>;

    /// Extract as i64 if the value is an integer.
    fn as_i64(&self) -> Option<i64>;

    /// Extract as f64 if the value is numeric.
    fn as_f64(&self) -> Option<f64>;

    fn as_bool(&self) -> Option<bool>;

    /// Get type name for debugging/error messages.
    fn type_name(&self) -> &'static str;
}

impl DatabaseValue for Value {
    fn as_string(&self) -> Option<String> {
        match self {
            Value::Text(s) | Value::DateTime(s) | Value::Date(s) | Value::Uri(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::Text(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Uri(_) => "uri",
        }
    }
}
