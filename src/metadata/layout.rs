//! On-disk layout of a Progsnap dataset (version family 6.x)
//!
//! ```text
//! <root>/
//!   DatasetMetadata.csv          Property,Value pairs (mandatory)
//!   MainTable.csv                one row per event (mandatory)
//!   TableSchemas.json            extra column declarations (optional)
//!   LinkTables/Subject.csv       keyed by SubjectID (optional)
//!   LinkTables/ToolInstance.csv  keyed by ToolInstanceID (optional)
//!   CodeStates/CodeStates.csv    keyed by CodeStateID (mandatory for inline code)
//!   CodeStates/ab/abc123.txt     external code state files
//! ```

use std::fmt;

use crate::errors::{ProgsnapError, ProgsnapResult};
use crate::schema::{ColumnDef, TableSchema};

/// Metadata descriptor file name
pub const METADATA_FILE: &str = "DatasetMetadata.csv";

/// Optional column declaration file name
pub const TABLE_SCHEMAS_FILE: &str = "TableSchemas.json";

/// Directory holding code state tables and files
pub const CODE_STATES_DIR: &str = "CodeStates";

/// Supported major version of the Progsnap layout
pub const SUPPORTED_MAJOR_VERSION: u32 = 6;

/// Human readable form of the supported versions
pub const SUPPORTED_VERSIONS: &str = "6.x";

/// Tables a dataset may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableKind {
    MainTable,
    Subject,
    ToolInstance,
    CodeStates,
}

impl TableKind {
    /// All known tables
    pub const ALL: [TableKind; 4] = [
        TableKind::MainTable,
        TableKind::Subject,
        TableKind::ToolInstance,
        TableKind::CodeStates,
    ];

    /// Table name used in metadata and error messages
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::MainTable => "MainTable",
            TableKind::Subject => "Subject",
            TableKind::ToolInstance => "ToolInstance",
            TableKind::CodeStates => "CodeStates",
        }
    }

    /// Path of the table file relative to the dataset root
    pub fn relative_path(&self) -> &'static str {
        match self {
            TableKind::MainTable => "MainTable.csv",
            TableKind::Subject => "LinkTables/Subject.csv",
            TableKind::ToolInstance => "LinkTables/ToolInstance.csv",
            TableKind::CodeStates => "CodeStates/CodeStates.csv",
        }
    }

    /// Primary key column of indexed tables
    pub fn key_column(&self) -> Option<&'static str> {
        match self {
            TableKind::MainTable => None,
            TableKind::Subject => Some("SubjectID"),
            TableKind::ToolInstance => Some("ToolInstanceID"),
            TableKind::CodeStates => Some("CodeStateID"),
        }
    }

    /// Looks up a table by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Where code state text lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStateStorage {
    /// `Code` column of the CodeStates table (`CodeStateRepresentation=Table`)
    Inline,
    /// Files under the dataset root (`CodeStateRepresentation=Directory`)
    External,
}

impl CodeStateStorage {
    /// Parses the `CodeStateRepresentation` property
    pub fn from_property(value: &str) -> ProgsnapResult<Self> {
        match value.trim() {
            "Table" => Ok(CodeStateStorage::Inline),
            "Directory" => Ok(CodeStateStorage::External),
            other => Err(ProgsnapError::format(format!(
                "unsupported CodeStateRepresentation '{}' (expected Table or Directory)",
                other
            ))),
        }
    }
}

/// Whether the physical row order of the Main Table follows `Order`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrdering {
    /// Rows are already in `Order` sequence; streamed directly
    Consistent,
    /// Rows must be buffered and sorted by `Order`
    Unordered,
}

/// Parsed `Version` property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecVersion {
    raw: String,
    major: u32,
}

impl SpecVersion {
    /// Parses and checks a declared version.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedVersion` for anything outside the 6.x family.
    pub fn parse(raw: &str) -> ProgsnapResult<Self> {
        let trimmed = raw.trim();
        let major = trimmed
            .split('.')
            .next()
            .and_then(|m| m.parse::<u32>().ok())
            .filter(|_| {
                trimmed
                    .split('.')
                    .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
            });

        match major {
            Some(SUPPORTED_MAJOR_VERSION) => Ok(Self {
                raw: trimmed.to_string(),
                major: SUPPORTED_MAJOR_VERSION,
            }),
            _ => Err(ProgsnapError::unsupported_version(trimmed, SUPPORTED_VERSIONS)),
        }
    }

    /// Version string as declared
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Major version
    pub fn major(&self) -> u32 {
        self.major
    }
}

/// Built-in column schema of a table for the supported version.
pub fn builtin_schema(kind: TableKind, storage: CodeStateStorage) -> TableSchema {
    match kind {
        TableKind::MainTable => TableSchema::new(
            kind.name(),
            vec![
                ColumnDef::required_string("EventID"),
                ColumnDef::category("EventType", true, None),
                ColumnDef::required_int("Order"),
                ColumnDef::required_string("SubjectID"),
                ColumnDef::optional_string("ToolInstanceID"),
                ColumnDef::optional_string("CodeStateID"),
                ColumnDef::optional_timestamp("ServerTimestamp"),
                ColumnDef::optional_string("ServerTimezone"),
                ColumnDef::optional_timestamp("ClientTimestamp"),
                ColumnDef::optional_string("SessionID"),
                ColumnDef::optional_string("AssignmentID"),
                ColumnDef::optional_string("ProblemID"),
                ColumnDef::optional_string("ParentEventID"),
                ColumnDef::category("Compile.Result", false, Some(&["Success", "Warning", "Error"])),
            ],
        ),
        TableKind::Subject => TableSchema::keyed(
            kind.name(),
            "SubjectID",
            vec![ColumnDef::required_string("SubjectID")],
        ),
        TableKind::ToolInstance => TableSchema::keyed(
            kind.name(),
            "ToolInstanceID",
            vec![
                ColumnDef::required_string("ToolInstanceID"),
                ColumnDef::optional_string("ToolName"),
                ColumnDef::optional_string("ToolVersion"),
            ],
        ),
        TableKind::CodeStates => {
            let content = match storage {
                CodeStateStorage::Inline => ColumnDef::optional_string("Code"),
                CodeStateStorage::External => ColumnDef::optional_string("Path"),
            };
            TableSchema::keyed(
                kind.name(),
                "CodeStateID",
                vec![ColumnDef::required_string("CodeStateID"), content],
            )
        }
    }
}

/// Whether a table must exist on disk for the given storage mode.
pub fn is_mandatory(kind: TableKind, storage: CodeStateStorage) -> bool {
    match kind {
        TableKind::MainTable => true,
        TableKind::CodeStates => storage == CodeStateStorage::Inline,
        TableKind::Subject | TableKind::ToolInstance => false,
    }
}
