//! Error types for the Progsnap reader
//!
//! Error codes:
//! - PROGSNAP_DATASET_FORMAT (FATAL)
//! - PROGSNAP_SCHEMA_MISMATCH (FATAL)
//! - PROGSNAP_UNSUPPORTED_VERSION (FATAL)
//! - PROGSNAP_ROW_DECODE (ERROR)
//! - PROGSNAP_CODE_STATE_NOT_FOUND (ERROR)
//!
//! Structural errors make the dataset unusable. Row and code-state errors are
//! local to one row or one lookup.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Severity levels for reader errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Affects a single row or lookup; the dataset stays usable
    Error,
    /// The dataset (or table) cannot be read
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Stable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    DatasetFormat,
    SchemaMismatch,
    RowDecode,
    CodeStateNotFound,
    UnsupportedVersion,
}

impl ErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::DatasetFormat => "PROGSNAP_DATASET_FORMAT",
            ErrorCode::SchemaMismatch => "PROGSNAP_SCHEMA_MISMATCH",
            ErrorCode::RowDecode => "PROGSNAP_ROW_DECODE",
            ErrorCode::CodeStateNotFound => "PROGSNAP_CODE_STATE_NOT_FOUND",
            ErrorCode::UnsupportedVersion => "PROGSNAP_UNSUPPORTED_VERSION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::RowDecode | ErrorCode::CodeStateNotFound => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single row that could not be decoded.
///
/// Carries enough context to locate the offending cell in the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDecodeError {
    /// Table the row belongs to
    pub table: String,
    /// 1-based data row number (header excluded)
    pub row: u64,
    /// Column whose value failed to decode
    pub column: String,
    /// Raw field text as found in the file
    pub raw: String,
    /// Why the value was rejected
    pub reason: String,
}

impl RowDecodeError {
    pub fn new(
        table: impl Into<String>,
        row: u64,
        column: impl Into<String>,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            row,
            column: column.into(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RowDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table '{}' row {} column '{}': {} (raw value {:?})",
            self.table, self.row, self.column, self.reason, self.raw
        )
    }
}

/// Reader error type
#[derive(Debug, Clone, Error)]
pub enum ProgsnapError {
    #[error("[FATAL] PROGSNAP_DATASET_FORMAT: {message}{}", display_path(.path))]
    DatasetFormat {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("[FATAL] PROGSNAP_SCHEMA_MISMATCH: table '{table}' is missing required column '{column}'")]
    SchemaMismatch { table: String, column: String },

    #[error("[ERROR] PROGSNAP_ROW_DECODE: {0}")]
    RowDecode(RowDecodeError),

    #[error("[ERROR] PROGSNAP_CODE_STATE_NOT_FOUND: code state '{code_state_id}': {reason}")]
    CodeStateNotFound {
        code_state_id: String,
        reason: String,
    },

    #[error("[FATAL] PROGSNAP_UNSUPPORTED_VERSION: version '{version}' is not supported (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" ({})", p.display()),
        None => String::new(),
    }
}

impl ProgsnapError {
    /// Create a structural error without a file location
    pub fn format(message: impl Into<String>) -> Self {
        ProgsnapError::DatasetFormat {
            message: message.into(),
            path: None,
        }
    }

    /// Create a structural error tied to a file
    pub fn format_at(path: &Path, message: impl Into<String>) -> Self {
        ProgsnapError::DatasetFormat {
            message: message.into(),
            path: Some(path.to_path_buf()),
        }
    }

    /// Create a missing required column error
    pub fn schema_mismatch(table: impl Into<String>, column: impl Into<String>) -> Self {
        ProgsnapError::SchemaMismatch {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a code state lookup failure
    pub fn code_state_not_found(code_state_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ProgsnapError::CodeStateNotFound {
            code_state_id: code_state_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported version error
    pub fn unsupported_version(version: impl Into<String>, supported: impl Into<String>) -> Self {
        ProgsnapError::UnsupportedVersion {
            version: version.into(),
            supported: supported.into(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            ProgsnapError::DatasetFormat { .. } => ErrorCode::DatasetFormat,
            ProgsnapError::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            ProgsnapError::RowDecode(_) => ErrorCode::RowDecode,
            ProgsnapError::CodeStateNotFound { .. } => ErrorCode::CodeStateNotFound,
            ProgsnapError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code().severity()
    }

    /// Returns whether this error makes the dataset unusable
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns the row decode details if this is a row error
    pub fn as_row_error(&self) -> Option<&RowDecodeError> {
        match self {
            ProgsnapError::RowDecode(details) => Some(details),
            _ => None,
        }
    }
}

impl From<RowDecodeError> for ProgsnapError {
    fn from(details: RowDecodeError) -> Self {
        ProgsnapError::RowDecode(details)
    }
}

/// Result type for reader operations
pub type ProgsnapResult<T> = Result<T, ProgsnapError>;
