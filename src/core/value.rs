//! Database value types
//!
//! This module defines the values carried by columns and query parameters,
//! and the [`FromValue`] trait used for exact-type extraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database value that can hold different types
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DatabaseValue {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Timestamp (Unix timestamp in microseconds)
    Timestamp(i64),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Borrow the string payload without copying
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow the binary payload without copying
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DatabaseValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Extract a typed value; `None` unless the variant matches `T` exactly
    pub fn get<T: FromValue>(&self) -> Option<T> {
        T::from_value(self)
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "null",
            DatabaseValue::Bool(_) => "bool",
            DatabaseValue::Int(_) => "int",
            DatabaseValue::Long(_) => "long",
            DatabaseValue::Float(_) => "float",
            DatabaseValue::Double(_) => "double",
            DatabaseValue::String(_) => "string",
            DatabaseValue::Bytes(_) => "bytes",
            DatabaseValue::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseValue::Null => f.write_str("null"),
            DatabaseValue::Bool(v) => write!(f, "{v}"),
            DatabaseValue::Int(v) => write!(f, "{v}"),
            DatabaseValue::Long(v) => write!(f, "{v}"),
            DatabaseValue::Float(v) => write!(f, "{v}"),
            DatabaseValue::Double(v) => write!(f, "{v}"),
            DatabaseValue::String(s) => f.write_str(s),
            DatabaseValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            DatabaseValue::Timestamp(v) => match DateTime::<Utc>::from_timestamp_micros(*v) {
                Some(ts) => write!(f, "{}", ts.to_rfc3339()),
                None => write!(f, "{v}"),
            },
        }
    }
}

/// Exact-type extraction from a [`DatabaseValue`]
///
/// Implementations must return `Some` only for the variant that stores the
/// implementing type. An `Int(5)` is never an `i64` and a `Long(5)` is never
/// an `i32`; callers that want widening do it themselves.
pub trait FromValue: Sized {
    /// Name used in [`TypeMismatch`](crate::DatabaseError::TypeMismatch) errors
    const TYPE_NAME: &'static str;

    /// Extract `Self` when `value` holds exactly this type
    fn from_value(value: &DatabaseValue) -> Option<Self>;
}

macro_rules! exact_from_value {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FromValue for $ty {
            const TYPE_NAME: &'static str = $name;

            fn from_value(value: &DatabaseValue) -> Option<Self> {
                match value {
                    DatabaseValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

exact_from_value!(bool, Bool, "bool");
exact_from_value!(i32, Int, "int");
exact_from_value!(i64, Long, "long");
exact_from_value!(f32, Float, "float");
exact_from_value!(f64, Double, "double");
exact_from_value!(String, String, "string");
exact_from_value!(Vec<u8>, Bytes, "bytes");

impl FromValue for DateTime<Utc> {
    const TYPE_NAME: &'static str = "timestamp";

    fn from_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Timestamp(micros) => DateTime::from_timestamp_micros(*micros),
            _ => None,
        }
    }
}

impl FromValue for DatabaseValue {
    const TYPE_NAME: &'static str = "any";

    fn from_value(value: &DatabaseValue) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(value.clone())
        }
    }
}

/// `Null` extracts as `Some(None)`; any other variant must match `T` exactly.
impl<T: FromValue> FromValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: &DatabaseValue) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(v: bool) -> Self {
        DatabaseValue::Bool(v)
    }
}

impl From<i32> for DatabaseValue {
    fn from(v: i32) -> Self {
        DatabaseValue::Int(v)
    }
}

impl From<i64> for DatabaseValue {
    fn from(v: i64) -> Self {
        DatabaseValue::Long(v)
    }
}

impl From<f32> for DatabaseValue {
    fn from(v: f32) -> Self {
        DatabaseValue::Float(v)
    }
}

impl From<f64> for DatabaseValue {
    fn from(v: f64) -> Self {
        DatabaseValue::Double(v)
    }
}

impl From<String> for DatabaseValue {
    fn from(v: String) -> Self {
        DatabaseValue::String(v)
    }
}

impl From<&str> for DatabaseValue {
    fn from(v: &str) -> Self {
        DatabaseValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(v: Vec<u8>) -> Self {
        DatabaseValue::Bytes(v)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(v: DateTime<Utc>) -> Self {
        DatabaseValue::Timestamp(v.timestamp_micros())
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DatabaseValue::Null,
        }
    }
}
