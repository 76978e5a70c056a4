//! Result row representation.
//!
//! A `Row` maps column names to values and keeps the column order of the
//! result set, so `SELECT *` rows iterate in catalog order.

use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::types::{row_to_values, value_to_json};
use crate::{RelsetError, Result, Value};

/// A single row from a query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    order: Vec<String>,
    pub(crate) columns: HashMap<String, Value>,
}

impl Row {
    /// Creates a row from (column, value) pairs, keeping their order.
    /// A repeated column keeps its first position and its last value.
    pub fn new(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut row = Row::default();
        for (name, value) in pairs {
            if row.columns.insert(name.clone(), value).is_none() {
                row.order.push(name);
            }
        }
        row
    }

    /// Gets a value by column name.
    pub fn get(&self, column: &str) -> Result<&Value> {
        self.columns.get(column).ok_or_else(|| {
            RelsetError::Query(format!("Column '{}' not found in result set", column))
        })
    }

    /// Gets a value by column name, or `None` if absent.
    pub fn try_get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Column names in result order.
    pub fn columns(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// (column, value) pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.order
            .iter()
            .filter_map(|name| self.columns.get(name).map(|v| (name.as_str(), v)))
    }

    pub fn columns_map(&self) -> &HashMap<String, Value> {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Converts the row to a JSON object.
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .iter()
            .map(|(k, v)| (k.to_string(), value_to_json(v)))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }

    /// Converts from a sqlx row.
    pub fn from_sqlx(row: &sqlx::postgres::PgRow) -> Result<Self> {
        Ok(Self::new(row_to_values(row)?))
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(mut self) -> Self::IntoIter {
        let pairs: Vec<(String, Value)> = self
            .order
            .into_iter()
            .filter_map(|name| self.columns.remove(&name).map(|v| (name, v)))
            .collect();
        pairs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::new(vec![
            ("id".to_string(), Value::Int(1)),
            ("name".to_string(), Value::String("Ann".to_string())),
            ("age".to_string(), Value::Null),
        ])
    }

    #[test]
    fn test_row_keeps_order() {
        let row = sample();
        assert_eq!(row.columns(), vec!["id", "name", "age"]);
        assert_eq!(row.len(), 3);
        let names: Vec<String> = row.into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["id", "name", "age"]);
    }

    #[test]
    fn test_row_get() {
        let row = sample();
        assert_eq!(row.get("id").unwrap(), &Value::Int(1));
        assert!(row.get("missing").is_err());
        assert!(row.try_get("missing").is_none());
    }

    #[test]
    fn test_row_duplicate_column() {
        let row = Row::new(vec![
            ("a".to_string(), Value::Int(1)),
            ("a".to_string(), Value::Int(2)),
        ]);
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("a").unwrap(), &Value::Int(2));
    }

    #[test]
    fn test_row_to_json() {
        let json = sample().to_json();
        assert_eq!(json["id"], 1);
        assert_eq!(json["name"], "Ann");
        assert!(json["age"].is_null());
    }
}
