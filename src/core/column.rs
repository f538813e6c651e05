//! A single named value within a result row.

use super::value::{DatabaseValue, FromValue};
use serde::Serialize;

/// One named value of a materialized result row
///
/// Columns are immutable once built; drivers create them while reading a
/// cursor and the executor groups them into a [`Row`](super::row::Row).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    name: String,
    value: DatabaseValue,
}

impl Column {
    /// Create a column from its name and value
    pub fn new(name: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Column name as reported by the driver
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stored value, or `None` when the column is NULL
    pub fn value(&self) -> Option<&DatabaseValue> {
        if self.value.is_null() {
            None
        } else {
            Some(&self.value)
        }
    }

    /// The stored value including `Null`
    pub fn raw_value(&self) -> &DatabaseValue {
        &self.value
    }

    /// Typed extraction; succeeds only on an exact type match
    pub fn get<T: FromValue>(&self) -> Option<T> {
        T::from_value(&self.value)
    }

    /// Split the column into its name and value
    pub fn into_parts(self) -> (String, DatabaseValue) {
        (self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_column_has_no_value() {
        let col = Column::new("Email", DatabaseValue::Null);
        assert_eq!(col.name(), "Email");
        assert!(col.value().is_none());
        assert!(col.raw_value().is_null());
        assert_eq!(col.get::<String>(), None);
        assert_eq!(col.get::<Option<String>>(), Some(None));
    }

    #[test]
    fn test_get_requires_exact_type() {
        let col = Column::new("Id", 7i64);
        assert_eq!(col.get::<i64>(), Some(7));
        assert_eq!(col.get::<i32>(), None);
        assert_eq!(col.value(), Some(&DatabaseValue::Long(7)));
    }
}
