//! Decoded values and rows

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Empty field, or a declared column absent from the file
    Null,
    String(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
    Category(String),
    Boolean(bool),
    /// Value of an undeclared column, kept as raw text
    Extension(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text of string-like values (string, category, extension)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Category(s) | Value::Extension(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::String(s) | Value::Category(s) | Value::Extension(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// One decoded table row.
///
/// Columns are the header columns in file order followed by declared
/// optional columns missing from the file (always null). The column list is
/// shared by every row of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    table: Arc<str>,
    number: u64,
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(table: Arc<str>, number: u64, columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            table,
            number,
            columns,
            values,
        }
    }

    /// Table the row was read from
    pub fn table(&self) -> &str {
        &self.table
    }

    /// 1-based data row number (header excluded)
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Column names, in row order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value of a column; `None` if the table has no such column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Text of a string-like column; `None` if absent or null.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn get_int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_int)
    }

    pub fn get_timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        self.get(column).and_then(Value::as_timestamp)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Value::as_bool)
    }

    /// Column/value pairs in row order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Non-null values of undeclared columns
    pub fn extensions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter_map(|(name, value)| match value {
            Value::Extension(raw) => Some((name, raw.as_str())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row() -> Row {
        Row::new(
            Arc::from("MainTable"),
            4,
            Arc::from(vec![
                "EventID".to_string(),
                "Order".to_string(),
                "X-Mood".to_string(),
                "ServerTimestamp".to_string(),
            ]),
            vec![
                Value::String("E1".into()),
                Value::Int(7),
                Value::Extension("happy".into()),
                Value::Null,
            ],
        )
    }

    #[test]
    fn test_row_accessors() {
        let row = row();
        assert_eq!(row.table(), "MainTable");
        assert_eq!(row.number(), 4);
        assert_eq!(row.get_str("EventID"), Some("E1"));
        assert_eq!(row.get_int("Order"), Some(7));
        assert_eq!(row.get("ServerTimestamp"), Some(&Value::Null));
        assert_eq!(row.get_timestamp("ServerTimestamp"), None);
        assert_eq!(row.get("Nope"), None);
    }

    #[test]
    fn test_row_extensions() {
        let row = row();
        let extensions: Vec<_> = row.extensions().collect();
        assert_eq!(extensions, vec![("X-Mood", "happy")]);
    }

    #[test]
    fn test_value_display() {
        let ts = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(Value::Timestamp(ts).to_string(), "2020-01-02T03:04:05+00:00");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Boolean(true).to_string(), "true");
    }
}
