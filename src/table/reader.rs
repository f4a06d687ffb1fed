//! Streaming table reader
//!
//! Reads one CSV table row by row:
//! - The header is validated against the declared schema at open
//! - Each record is decoded into a typed `Row`
//! - Row numbers count data rows from 1
//!
//! Failure semantics:
//! - Decode failures follow the configured `RowPolicy`
//! - I/O failures are always fatal
//! - After any error, the reader yields nothing further

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RowPolicy;
use crate::errors::{ProgsnapError, ProgsnapResult, RowDecodeError};
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{ColumnPlan, SchemaValidator, TableSchema};
use crate::source::{DatasetSource, SourceReader};

use super::coerce::decode_field;
use super::value::{Row, Value};

/// Callback receiving every row skipped under `RowPolicy::Skip`
pub type ErrorCollector = Box<dyn FnMut(&RowDecodeError) + Send>;

/// Sequential reader over one table file.
///
/// Single pass; reading again requires reopening the file.
pub struct TableReader {
    table: Arc<str>,
    path: PathBuf,
    plan: ColumnPlan,
    columns: Arc<[String]>,
    reader: csv::Reader<SourceReader>,
    record: csv::ByteRecord,
    timestamp_format: Option<String>,
    policy: RowPolicy,
    collector: Option<ErrorCollector>,
    rows_read: u64,
    skipped: u64,
    finished: bool,
}

impl TableReader {
    /// Opens a table file and validates its header.
    ///
    /// # Errors
    ///
    /// - `DatasetFormat` if the file cannot be opened or has no header
    /// - `SchemaMismatch` if a required column is missing
    pub fn open(path: &Path, schema: &TableSchema) -> ProgsnapResult<Self> {
        let file = File::open(path)
            .map_err(|e| ProgsnapError::format_at(path, format!("cannot open table: {}", e)))?;
        Self::from_reader(path, Box::new(file), schema)
    }

    /// Opens a table stored in a dataset directory or archive.
    pub fn open_in(
        source: &DatasetSource,
        relative: &str,
        schema: &TableSchema,
    ) -> ProgsnapResult<Self> {
        let path = source.location(relative);
        let input = source
            .open_file(relative)
            .map_err(|e| ProgsnapError::format_at(&path, format!("cannot open table: {}", e)))?;
        Self::from_reader(&path, input, schema)
    }

    /// Reads a table from `input`; `path` only labels errors and logs.
    pub fn from_reader(
        path: &Path,
        input: SourceReader,
        schema: &TableSchema,
    ) -> ProgsnapResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let header = reader
            .byte_headers()
            .map_err(|e| ProgsnapError::format_at(path, format!("unreadable header: {}", e)))?
            .clone();
        if header.is_empty() {
            return Err(ProgsnapError::format_at(path, "table has no header row"));
        }

        let mut names = Vec::with_capacity(header.len());
        for field in header.iter() {
            let name = std::str::from_utf8(field)
                .map_err(|_| ProgsnapError::format_at(path, "header is not valid UTF-8"))?;
            names.push(name.to_string());
        }

        let plan = SchemaValidator::new(schema).validate(&names)?;
        let columns: Arc<[String]> = plan.row_columns().into();

        Ok(Self {
            table: Arc::from(schema.name.as_str()),
            path: path.to_path_buf(),
            plan,
            columns,
            reader,
            record: csv::ByteRecord::new(),
            timestamp_format: None,
            policy: RowPolicy::default(),
            collector: None,
            rows_read: 0,
            skipped: 0,
            finished: false,
        })
    }

    /// Sets the row decode policy.
    pub fn with_policy(mut self, policy: RowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the dataset-wide timestamp format.
    pub fn with_timestamp_format(mut self, format: Option<&str>) -> Self {
        self.timestamp_format = format.map(str::to_string);
        self
    }

    /// Registers a callback for rows skipped under `RowPolicy::Skip`.
    pub fn on_error(mut self, collector: ErrorCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Path of the table file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column plan computed from the header
    pub fn plan(&self) -> &ColumnPlan {
        &self.plan
    }

    /// Data rows consumed so far, including skipped ones
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Rows skipped under `RowPolicy::Skip`
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Reads the next row.
    ///
    /// Returns `Ok(None)` at end of file and after any error.
    pub fn read_next(&mut self) -> ProgsnapResult<Option<Row>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            match self.reader.read_byte_record(&mut self.record) {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.finished = true;
                    return Err(ProgsnapError::format_at(
                        &self.path,
                        format!("read failed after row {}: {}", self.rows_read, e),
                    ));
                }
            }
            self.rows_read += 1;

            let details = match self.decode_record() {
                Ok(row) => return Ok(Some(row)),
                Err(details) => details,
            };

            let row = details.row.to_string();
            let fields = [
                ("table", details.table.as_str()),
                ("row", row.as_str()),
                ("column", details.column.as_str()),
                ("reason", details.reason.as_str()),
            ];
            match self.policy {
                RowPolicy::FailFast => {
                    log_event_with_fields(Event::RowRejected, &fields);
                    self.finished = true;
                    return Err(details.into());
                }
                RowPolicy::Skip => {
                    log_event_with_fields(Event::RowSkipped, &fields);
                    self.skipped += 1;
                    if let Some(collector) = self.collector.as_mut() {
                        collector(&details);
                    }
                }
            }
        }
    }

    fn decode_record(&self) -> Result<Row, RowDecodeError> {
        let header = self.plan.header();
        let found = self.record.len();

        if found != header.len() {
            let (column, raw) = if found < header.len() {
                (header[found].name.clone(), String::new())
            } else {
                let surplus = String::from_utf8_lossy(&self.record[header.len()]).into_owned();
                (format!("#{}", header.len()), surplus)
            };
            return Err(self.row_error(
                column,
                raw,
                format!("expected {} fields, found {}", header.len(), found),
            ));
        }

        let mut values = Vec::with_capacity(self.columns.len());
        for planned in header {
            let bytes = &self.record[planned.index];
            let raw = std::str::from_utf8(bytes).map_err(|_| {
                self.row_error(
                    planned.name.clone(),
                    String::from_utf8_lossy(bytes).into_owned(),
                    "invalid UTF-8",
                )
            })?;

            let value = match planned.class.def() {
                Some(def) => decode_field(def, raw, self.timestamp_format.as_deref())
                    .map_err(|reason| self.row_error(planned.name.clone(), raw, reason))?,
                None if raw.is_empty() => Value::Null,
                None => Value::Extension(raw.to_string()),
            };
            values.push(value);
        }
        values.resize(self.columns.len(), Value::Null);

        Ok(Row::new(
            Arc::clone(&self.table),
            self.rows_read,
            Arc::clone(&self.columns),
            values,
        ))
    }

    fn row_error(
        &self,
        column: String,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> RowDecodeError {
        RowDecodeError::new(self.table.as_ref(), self.rows_read, column, raw, reason)
    }
}

impl Iterator for TableReader {
    type Item = ProgsnapResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

impl std::iter::FusedIterator for TableReader {}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("table", &self.table)
            .field("path", &self.path)
            .field("rows_read", &self.rows_read)
            .field("skipped", &self.skipped)
            .field("finished", &self.finished)
            .finish()
    }
}
