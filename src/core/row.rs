//! Materialized result rows
//!
//! A [`Row`] keeps its columns in cursor order and an index from column name
//! to position, so lookups by name and by position are both O(1).

use super::binder::Bind;
use super::column::Column;
use super::error::{DatabaseError, Result};
use super::value::FromValue;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::ops::Index;

/// One record of a result set
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl Row {
    /// Build a row from columns in cursor order
    ///
    /// Duplicate names are accepted, never rejected. The first occurrence
    /// owns the name; later duplicates stay reachable by position.
    pub fn new(columns: Vec<Column>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            index.entry(column.name().to_string()).or_insert(position);
        }

        Self { columns, index }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns in cursor order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Iterate over the columns in cursor order
    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    /// Column names in cursor order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }

    /// Position of the column called `name` (case-sensitive)
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Column called `name`, or `None` if the row has no such column
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|position| &self.columns[position])
    }

    /// Column at `position`, or `None` when out of range
    pub fn column(&self, position: usize) -> Option<&Column> {
        self.columns.get(position)
    }

    /// Typed value of the column called `name`
    ///
    /// Returns `None` if the column is missing, NULL, or holds another type.
    pub fn value<T: FromValue>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(Column::get)
    }

    /// Typed value of the column at `position`
    pub fn value_at<T: FromValue>(&self, position: usize) -> Option<T> {
        self.column(position).and_then(Column::get)
    }

    /// Typed value of the column called `name`, reporting why it is missing
    pub fn try_value<T: FromValue>(&self, name: &str) -> Result<T> {
        let column = self
            .get(name)
            .ok_or_else(|| DatabaseError::column_not_found(name))?;

        column
            .get()
            .ok_or_else(|| DatabaseError::type_mismatch(T::TYPE_NAME, column.raw_value().type_name()))
    }

    /// Map this row onto a record type
    pub fn bind<T: Bind>(&self) -> T {
        super::binder::bind_row(self)
    }

    /// Consume the row and return its columns
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

impl Index<usize> for Row {
    type Output = Column;

    fn index(&self, position: usize) -> &Column {
        &self.columns[position]
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.index.len()))?;
        for (position, column) in self.columns.iter().enumerate() {
            if self.index.get(column.name()) == Some(&position) {
                map.serialize_entry(column.name(), column.raw_value())?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::DatabaseValue;

    fn sample_row() -> Row {
        Row::new(vec![
            Column::new("Id", 1i64),
            Column::new("Name", "Alice"),
            Column::new("Email", DatabaseValue::Null),
        ])
    }

    #[test]
    fn test_lookup_by_name_and_position_agree() {
        let row = sample_row();
        assert_eq!(row.len(), 3);
        for (position, name) in ["Id", "Name", "Email"].iter().enumerate() {
            assert_eq!(row.get(name), Some(&row[position]));
            assert_eq!(row.index_of(name), Some(position));
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let row = sample_row();
        assert!(row.get("name").is_none());
        assert!(row.get("Missing").is_none());
        assert_eq!(row.value::<i64>("id"), None);
    }

    #[test]
    fn test_position_lookup_is_bounds_checked() {
        let row = sample_row();
        assert!(row.column(3).is_none());
        assert_eq!(row.value_at::<String>(1), Some("Alice".to_string()));
    }

    #[test]
    #[should_panic]
    fn test_index_out_of_range_panics() {
        let row = sample_row();
        let _ = &row[10];
    }

    #[test]
    fn test_typed_values() {
        let row = sample_row();
        assert_eq!(row.value::<i64>("Id"), Some(1));
        assert_eq!(row.value::<i32>("Id"), None);
        assert_eq!(row.value::<String>("Email"), None);
        assert_eq!(row.value::<Option<String>>("Email"), Some(None));
    }

    #[test]
    fn test_try_value_errors() {
        let row = sample_row();
        assert_eq!(row.try_value::<String>("Name").unwrap(), "Alice");

        let err = row.try_value::<i64>("Missing").unwrap_err();
        assert!(matches!(err, DatabaseError::ColumnNotFound(ref n) if n == "Missing"));

        let err = row.try_value::<f64>("Id").unwrap_err();
        assert_eq!(err.to_string(), "Type mismatch: expected double, got long");
    }

    #[test]
    fn test_duplicate_names_keep_first_occurrence() {
        let row = Row::new(vec![Column::new("id", 1i64), Column::new("id", 2i64)]);
        assert_eq!(row.value::<i64>("id"), Some(1));
        assert_eq!(row.value_at::<i64>(1), Some(2));
        assert_eq!(row.column_names().collect::<Vec<_>>(), vec!["id", "id"]);
    }

    #[test]
    fn test_row_serializes_as_map() {
        let json = serde_json::to_value(sample_row()).unwrap();
        assert_eq!(json["Name"]["String"], "Alice");
        assert_eq!(json["Email"], "Null");
    }
}
