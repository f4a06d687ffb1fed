//! Primary key index over a link table
//!
//! # API
//!
//! - `build(kind, reader)` - Index every row of a table by its key column
//! - `empty(kind)` - Index for an absent optional table
//! - `unusable(kind, error)` - Index for an optional table that failed validation
//! - `lookup(key)` - Resolve a nullable foreign key
//! - `iter()` - Rows in file order

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{ProgsnapError, ProgsnapResult};
use crate::metadata::TableKind;
use crate::observability::{log_event_with_fields, Event};
use crate::table::{Row, TableReader};

/// Outcome of a foreign key lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRef {
    /// The key names an indexed row
    Resolved(Arc<Row>),
    /// The key is set but no row carries it
    Unresolved(String),
    /// The foreign key is null
    Null,
}

impl LinkRef {
    /// Returns the joined row, if resolved
    pub fn row(&self) -> Option<&Arc<Row>> {
        match self {
            LinkRef::Resolved(row) => Some(row),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, LinkRef::Resolved(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, LinkRef::Null)
    }
}

/// In-memory index of one link table, keyed by its primary key column
#[derive(Debug, Clone)]
pub struct LinkIndex {
    kind: TableKind,
    rows: Vec<Arc<Row>>,
    by_key: HashMap<String, usize>,
    skipped: u64,
    /// Why the table could not be indexed; lookups then behave as on an empty index
    unusable: Option<ProgsnapError>,
}

impl LinkIndex {
    /// Creates an index with no rows
    pub fn empty(kind: TableKind) -> Self {
        Self {
            kind,
            rows: Vec::new(),
            by_key: HashMap::new(),
            skipped: 0,
            unusable: None,
        }
    }

    /// Creates an index with no rows for a table that cannot be read.
    ///
    /// Foreign keys into it stay `Unresolved`; `check` returns `error`.
    pub fn unusable(kind: TableKind, error: ProgsnapError) -> Self {
        Self {
            unusable: Some(error),
            ..Self::empty(kind)
        }
    }

    /// Reads a whole table and indexes it by its key column.
    ///
    /// Behavior:
    /// - Rows are kept in file order
    /// - Row errors follow the reader's policy
    /// - A key seen twice is FATAL
    pub fn build(kind: TableKind, mut reader: TableReader) -> ProgsnapResult<Self> {
        let key_column = kind.key_column().ok_or_else(|| {
            ProgsnapError::format(format!("table '{}' has no key column", kind))
        })?;

        let mut index = Self::empty(kind);
        while let Some(row) = reader.read_next()? {
            let key = match row.get_str(key_column) {
                Some(key) => key.to_string(),
                None => {
                    return Err(ProgsnapError::format_at(
                        reader.path(),
                        format!("row {} has no value for key column '{}'", row.number(), key_column),
                    ))
                }
            };

            if let Some(&first) = index.by_key.get(&key) {
                let first_row = index.rows[first].number().to_string();
                let second_row = row.number().to_string();
                log_event_with_fields(
                    Event::DuplicateKey,
                    &[
                        ("table", kind.name()),
                        ("key", &key),
                        ("first_row", &first_row),
                        ("second_row", &second_row),
                    ],
                );
                return Err(ProgsnapError::format_at(
                    reader.path(),
                    format!(
                        "duplicate {} '{}' (rows {} and {})",
                        key_column, key, first_row, second_row
                    ),
                ));
            }

            index.by_key.insert(key, index.rows.len());
            index.rows.push(Arc::new(row));
        }
        index.skipped = reader.skipped();

        log_event_with_fields(
            Event::IndexBuilt,
            &[("table", kind.name()), ("rows", &index.rows.len().to_string())],
        );
        Ok(index)
    }

    /// Table this index covers
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Row with the given key
    pub fn get(&self, key: &str) -> Option<&Arc<Row>> {
        self.by_key.get(key).map(|&i| &self.rows[i])
    }

    /// Resolves a nullable foreign key.
    pub fn lookup(&self, key: Option<&str>) -> LinkRef {
        match key {
            None => LinkRef::Null,
            Some(key) => match self.get(key) {
                Some(row) => LinkRef::Resolved(Arc::clone(row)),
                None => LinkRef::Unresolved(key.to_string()),
            },
        }
    }

    /// Rows in file order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Row>> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows skipped while building under the skip policy
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Error that made the table unusable, if any
    pub fn error(&self) -> Option<&ProgsnapError> {
        self.unusable.as_ref()
    }

    /// Returns the index, or the error that made its table unusable.
    pub fn check(&self) -> ProgsnapResult<&Self> {
        match &self.unusable {
            Some(error) => Err(error.clone()),
            None => Ok(self),
        }
    }
}
