//! Header validation against a declared table schema
//!
//! Validation semantics:
//! - Columns are matched by name; file order is irrelevant
//! - Every required column must be present in the header
//! - Undeclared columns are kept as extension columns, never rejected
//! - Declared optional columns absent from the header decode to null
//! - A header naming the same column twice is malformed

use std::collections::HashSet;

use crate::errors::{ProgsnapError, ProgsnapResult};
use crate::observability::{log_event_with_fields, Event};

use super::types::{ColumnDef, TableSchema};

/// How a header column relates to the declared schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnClass {
    /// Declared and required
    Required(ColumnDef),
    /// Declared and optional
    Optional(ColumnDef),
    /// Present in the data but not declared; preserved untyped
    Extension,
}

impl ColumnClass {
    /// Returns the declared definition, if any
    pub fn def(&self) -> Option<&ColumnDef> {
        match self {
            ColumnClass::Required(def) | ColumnClass::Optional(def) => Some(def),
            ColumnClass::Extension => None,
        }
    }
}

/// A header column with its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedColumn {
    /// Normalized header name
    pub name: String,
    /// Position of the field in each record
    pub index: usize,
    /// Classification
    pub class: ColumnClass,
}

/// Result of matching a header against a schema.
///
/// Decoded rows list header columns first (in file order), then the
/// missing optional columns (in declaration order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    table: String,
    header: Vec<PlannedColumn>,
    missing_optional: Vec<ColumnDef>,
    missing_required: Vec<String>,
}

impl ColumnPlan {
    /// Table this plan was built for
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Header columns in file order
    pub fn header(&self) -> &[PlannedColumn] {
        &self.header
    }

    /// Number of fields each record must carry
    pub fn field_count(&self) -> usize {
        self.header.len()
    }

    /// Declared optional columns absent from the header
    pub fn missing_optional(&self) -> &[ColumnDef] {
        &self.missing_optional
    }

    /// Declared required columns absent from the header
    pub fn missing_required(&self) -> &[String] {
        &self.missing_required
    }

    /// Names of undeclared header columns
    pub fn extension_columns(&self) -> impl Iterator<Item = &str> {
        self.header
            .iter()
            .filter(|c| c.class == ColumnClass::Extension)
            .map(|c| c.name.as_str())
    }

    /// Column names of decoded rows, in row order
    pub fn row_columns(&self) -> Vec<String> {
        self.header
            .iter()
            .map(|c| c.name.clone())
            .chain(self.missing_optional.iter().map(|d| d.name.clone()))
            .collect()
    }

    /// Returns whether every required column is present
    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }
}

/// Matches table headers against a declared schema.
pub struct SchemaValidator<'a> {
    schema: &'a TableSchema,
}

impl<'a> SchemaValidator<'a> {
    /// Creates a validator for the given schema.
    pub fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    /// Classifies every header column without failing on missing ones.
    ///
    /// # Errors
    ///
    /// Returns `DatasetFormat` if the header names a column twice.
    pub fn classify<S: AsRef<str>>(&self, header: &[S]) -> ProgsnapResult<ColumnPlan> {
        let mut seen = HashSet::with_capacity(header.len());
        let mut planned = Vec::with_capacity(header.len());

        for (index, raw) in header.iter().enumerate() {
            let name = normalize_header(raw.as_ref(), index);
            if !seen.insert(name.clone()) {
                return Err(ProgsnapError::format(format!(
                    "table '{}' names column '{}' more than once",
                    self.schema.name, name
                )));
            }

            let class = match self.schema.column(&name) {
                Some(def) if def.required => ColumnClass::Required(def.clone()),
                Some(def) => ColumnClass::Optional(def.clone()),
                None => ColumnClass::Extension,
            };
            planned.push(PlannedColumn { name, index, class });
        }

        let mut missing_optional = Vec::new();
        let mut missing_required = Vec::new();
        for def in &self.schema.columns {
            if seen.contains(&def.name) {
                continue;
            }
            if def.required {
                missing_required.push(def.name.clone());
            } else {
                missing_optional.push(def.clone());
            }
        }

        Ok(ColumnPlan {
            table: self.schema.name.clone(),
            header: planned,
            missing_optional,
            missing_required,
        })
    }

    /// Validates a header and returns its column plan.
    ///
    /// # Errors
    ///
    /// - `SchemaMismatch` naming the first missing required column
    ///   (in declaration order)
    /// - `DatasetFormat` if the header names a column twice
    pub fn validate<S: AsRef<str>>(&self, header: &[S]) -> ProgsnapResult<ColumnPlan> {
        let plan = self.classify(header)?;

        if let Some(column) = plan.missing_required.first() {
            log_event_with_fields(
                Event::SchemaMismatch,
                &[("table", &self.schema.name), ("column", column)],
            );
            return Err(ProgsnapError::schema_mismatch(&self.schema.name, column));
        }

        let extensions: Vec<&str> = plan.extension_columns().collect();
        if !extensions.is_empty() {
            log_event_with_fields(
                Event::ExtensionColumns,
                &[("table", &self.schema.name), ("columns", &extensions.join(","))],
            );
        }

        let columns = plan.field_count().to_string();
        log_event_with_fields(
            Event::SchemaValidated,
            &[("table", &self.schema.name), ("columns", &columns)],
        );

        Ok(plan)
    }
}

/// Trims whitespace and, for the first column, a UTF-8 byte order mark.
fn normalize_header(raw: &str, index: usize) -> String {
    let name = if index == 0 {
        raw.trim_start_matches('\u{feff}')
    } else {
        raw
    };
    name.trim().to_string()
}
