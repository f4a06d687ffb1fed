//! Column and table schema definitions
//!
//! Supported column types:
//! - string: passthrough text
//! - int: 64-bit signed integer
//! - timestamp: instant, decoded to UTC
//! - category: text, optionally restricted to a declared value set
//! - boolean: fixed token set (true/false, t/f, yes/no, y/n, 1/0)

use serde::{Deserialize, Serialize};

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    #[serde(alias = "integer")]
    Int,
    Timestamp,
    Category,
    #[serde(alias = "bool")]
    Boolean,
}

impl ColumnType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Int => "int",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Category => "category",
            ColumnType::Boolean => "boolean",
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name as it appears in the header
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether the column must be present and non-empty
    #[serde(default)]
    pub required: bool,
    /// Allowed values for category columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    /// Explicit chrono format for timestamp columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ColumnDef {
    /// Create a column definition
    pub fn new(name: impl Into<String>, column_type: ColumnType, required: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            required,
            values: None,
            format: None,
        }
    }

    /// Create a required string column
    pub fn required_string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::String, true)
    }

    /// Create an optional string column
    pub fn optional_string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::String, false)
    }

    /// Create a required int column
    pub fn required_int(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Int, true)
    }

    /// Create an optional int column
    pub fn optional_int(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Int, false)
    }

    /// Create an optional timestamp column
    pub fn optional_timestamp(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Timestamp, false)
    }

    /// Create an optional boolean column
    pub fn optional_boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean, false)
    }

    /// Create a category column, optionally restricted to `values`
    pub fn category(name: impl Into<String>, required: bool, values: Option<&[&str]>) -> Self {
        Self {
            values: values.map(|v| v.iter().map(|s| s.to_string()).collect()),
            ..Self::new(name, ColumnType::Category, required)
        }
    }

    /// Set an explicit timestamp format
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Ordered column schema for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name (e.g. `MainTable`)
    pub name: String,
    /// Declared columns in declaration order
    pub columns: Vec<ColumnDef>,
    /// Primary key column for indexed tables
    pub key: Option<String>,
}

impl TableSchema {
    /// Create a schema without a key column
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            key: None,
        }
    }

    /// Create a schema keyed by `key`
    pub fn keyed(name: impl Into<String>, key: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            key: Some(key.into()),
        }
    }

    /// Looks up a declared column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of required columns, in declaration order
    pub fn required_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().filter(|c| c.required).map(|c| c.name.as_str())
    }

    /// Merges a declared column into this schema.
    ///
    /// New names are appended. An existing column takes the declared
    /// `required`, `values` and `format`, but keeps its type and cannot
    /// become optional.
    pub fn merge_column(&mut self, declared: ColumnDef) -> Result<(), String> {
        match self.columns.iter_mut().find(|c| c.name == declared.name) {
            Some(existing) => {
                if existing.column_type != declared.column_type {
                    return Err(format!(
                        "column '{}' of table '{}' is {} and cannot be redeclared as {}",
                        existing.name,
                        self.name,
                        existing.column_type.type_name(),
                        declared.column_type.type_name()
                    ));
                }
                if existing.required && !declared.required {
                    return Err(format!(
                        "column '{}' of table '{}' must stay required",
                        existing.name, self.name
                    ));
                }
                existing.required = declared.required;
                existing.values = declared.values;
                existing.format = declared.format;
            }
            None => self.columns.push(declared),
        }
        Ok(())
    }
}
