//! Metadata loader
//!
//! - `DatasetMetadata.csv` is mandatory; its absence is a FATAL format error
//! - The declared `Version` must belong to the supported family
//! - Tables mandatory for that version must exist on disk
//! - `TableSchemas.json`, when present, extends the built-in schemas

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::{ProgsnapError, ProgsnapResult};
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{ColumnDef, TableSchema};
use crate::source::DatasetSource;
use crate::table::parse_boolean;

use super::layout::{
    builtin_schema, is_mandatory, CodeStateStorage, EventOrdering, SpecVersion, TableKind,
    METADATA_FILE, TABLE_SCHEMAS_FILE,
};

const PROPERTY_COLUMN: &str = "Property";
const VALUE_COLUMN: &str = "Value";

/// Dataset metadata: version, properties and the column schema of every table.
///
/// Loaded once when a dataset is opened; read-only afterwards.
#[derive(Debug, Clone)]
pub struct Metadata {
    version: SpecVersion,
    properties: BTreeMap<String, String>,
    ordering: EventOrdering,
    code_state_storage: CodeStateStorage,
    timestamp_format: Option<String>,
    tables: BTreeMap<TableKind, TableSchema>,
    present: BTreeSet<TableKind>,
}

impl Metadata {
    /// Declared Progsnap version
    pub fn version(&self) -> &SpecVersion {
        &self.version
    }

    /// Raw value of a metadata property
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// All metadata properties, sorted by name
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether the Main Table is physically ordered by `Order`
    pub fn ordering(&self) -> EventOrdering {
        self.ordering
    }

    /// Code state storage convention
    pub fn code_state_storage(&self) -> CodeStateStorage {
        self.code_state_storage
    }

    /// Dataset-wide timestamp format override
    pub fn timestamp_format(&self) -> Option<&str> {
        self.timestamp_format.as_deref()
    }

    /// Declared schema of a table
    pub fn schema(&self, kind: TableKind) -> &TableSchema {
        // Every TableKind is inserted by the loader.
        &self.tables[&kind]
    }

    /// Declared tables with their schemas, in a fixed order
    pub fn tables(&self) -> impl Iterator<Item = (TableKind, &TableSchema)> {
        self.tables.iter().map(|(k, s)| (*k, s))
    }

    /// Whether the table file exists on disk
    pub fn is_present(&self, kind: TableKind) -> bool {
        self.present.contains(&kind)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclaredTable {
    columns: Vec<ColumnDef>,
}

/// Reads and checks the metadata of a dataset.
pub struct MetadataLoader {
    source: DatasetSource,
}

impl MetadataLoader {
    /// Creates a loader for the dataset stored in `source`.
    pub fn new(source: DatasetSource) -> Self {
        Self { source }
    }

    /// Storage the loader reads from
    pub fn source(&self) -> &DatasetSource {
        &self.source
    }

    /// Location of the metadata descriptor
    pub fn metadata_path(&self) -> PathBuf {
        self.source.location(METADATA_FILE)
    }

    /// Location of a table file
    pub fn table_path(&self, kind: TableKind) -> PathBuf {
        self.source.location(kind.relative_path())
    }

    /// Loads the metadata.
    ///
    /// # Errors
    ///
    /// - `DatasetFormat` if the root or descriptor is missing or malformed,
    ///   if `TableSchemas.json` is malformed, or if a mandatory table is absent
    /// - `UnsupportedVersion` if the declared version is not supported
    pub fn load(&self) -> ProgsnapResult<Metadata> {
        if let DatasetSource::Directory(root) = &self.source {
            if !root.is_dir() {
                return Err(ProgsnapError::format_at(root, "dataset root is not a directory"));
            }
        }

        let properties = self.read_properties()?;

        let version = match properties.get("Version") {
            Some(raw) => SpecVersion::parse(raw)?,
            None => {
                return Err(ProgsnapError::format_at(
                    &self.metadata_path(),
                    "missing required property 'Version'",
                ))
            }
        };

        let ordering = match properties.get("IsEventOrderingConsistent") {
            Some(raw) => match parse_boolean(raw) {
                Some(true) => EventOrdering::Consistent,
                Some(false) => EventOrdering::Unordered,
                None => {
                    return Err(ProgsnapError::format_at(
                        &self.metadata_path(),
                        format!("IsEventOrderingConsistent is not a boolean: {:?}", raw),
                    ))
                }
            },
            None => EventOrdering::Unordered,
        };

        let code_state_storage = match properties.get("CodeStateRepresentation") {
            Some(raw) => CodeStateStorage::from_property(raw)?,
            None => CodeStateStorage::Inline,
        };

        let timestamp_format = properties
            .get("TimestampFormat")
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        let mut tables: BTreeMap<TableKind, TableSchema> = TableKind::ALL
            .iter()
            .map(|k| (*k, builtin_schema(*k, code_state_storage)))
            .collect();
        self.apply_declared_schemas(&mut tables)?;

        let mut present = BTreeSet::new();
        for kind in TableKind::ALL {
            let path = self.table_path(kind);
            if self.source.is_file(kind.relative_path()) {
                present.insert(kind);
            } else if is_mandatory(kind, code_state_storage) {
                return Err(ProgsnapError::format_at(
                    &path,
                    format!("mandatory table '{}' is missing", kind),
                ));
            } else {
                log_event_with_fields(
                    Event::TableAbsent,
                    &[("table", kind.name()), ("path", &path.display().to_string())],
                );
            }
        }

        log_event_with_fields(
            Event::MetadataLoaded,
            &[
                ("version", version.as_str()),
                ("tables", &present.len().to_string()),
                (
                    "ordering",
                    if ordering == EventOrdering::Consistent { "consistent" } else { "unordered" },
                ),
            ],
        );

        Ok(Metadata {
            version,
            properties,
            ordering,
            code_state_storage,
            timestamp_format,
            tables,
            present,
        })
    }

    /// Reads `Property,Value` pairs from the descriptor.
    fn read_properties(&self) -> ProgsnapResult<BTreeMap<String, String>> {
        let path = self.metadata_path();
        if !self.source.is_file(METADATA_FILE) {
            return Err(ProgsnapError::format_at(&path, "metadata descriptor is missing"));
        }

        let input = self
            .source
            .open_file(METADATA_FILE)
            .map_err(|e| ProgsnapError::format_at(&path, format!("cannot open metadata: {}", e)))?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| ProgsnapError::format_at(&path, format!("unreadable header: {}", e)))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
                .ok_or_else(|| {
                    ProgsnapError::format_at(&path, format!("header lacks '{}' column", name))
                })
        };
        let property_idx = column(PROPERTY_COLUMN)?;
        let value_idx = column(VALUE_COLUMN)?;

        let mut properties = BTreeMap::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                ProgsnapError::format_at(&path, format!("malformed row {}: {}", line + 1, e))
            })?;
            let name = record.get(property_idx).unwrap_or_default().trim();
            let value = record.get(value_idx).unwrap_or_default().trim();
            if name.is_empty() {
                return Err(ProgsnapError::format_at(
                    &path,
                    format!("row {} has an empty property name", line + 1),
                ));
            }
            if properties.insert(name.to_string(), value.to_string()).is_some() {
                return Err(ProgsnapError::format_at(
                    &path,
                    format!("property '{}' is declared more than once", name),
                ));
            }
        }

        Ok(properties)
    }

    /// Merges `TableSchemas.json` into the built-in schemas, if present.
    fn apply_declared_schemas(
        &self,
        tables: &mut BTreeMap<TableKind, TableSchema>,
    ) -> ProgsnapResult<()> {
        if !self.source.is_file(TABLE_SCHEMAS_FILE) {
            return Ok(());
        }

        let path = self.source.location(TABLE_SCHEMAS_FILE);
        let bytes = self
            .source
            .read(TABLE_SCHEMAS_FILE)
            .map_err(|e| ProgsnapError::format_at(&path, format!("failed to read file: {}", e)))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| ProgsnapError::format_at(&path, "file is not valid UTF-8"))?;
        let declared: BTreeMap<String, DeclaredTable> = serde_json::from_str(&content)
            .map_err(|e| ProgsnapError::format_at(&path, format!("invalid JSON: {}", e)))?;

        let mut columns = 0usize;
        for (table_name, table) in declared {
            let kind = TableKind::from_name(&table_name).ok_or_else(|| {
                ProgsnapError::format_at(&path, format!("unknown table '{}'", table_name))
            })?;
            let schema = tables
                .get_mut(&kind)
                .ok_or_else(|| ProgsnapError::format_at(&path, format!("unknown table '{}'", kind)))?;
            for column in table.columns {
                schema
                    .merge_column(column)
                    .map_err(|reason| ProgsnapError::format_at(&path, reason))?;
                columns += 1;
            }
        }

        log_event_with_fields(Event::SchemasDeclared, &[("columns", &columns.to_string())]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use crate::schema::ColumnType;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn loader(root: &Path) -> MetadataLoader {
        MetadataLoader::new(DatasetSource::directory(root))
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn minimal_dataset(metadata: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), METADATA_FILE, metadata);
        write(dir.path(), "MainTable.csv", "EventID,EventType,Order,SubjectID\n");
        write(dir.path(), "CodeStates/CodeStates.csv", "CodeStateID,Code\n");
        dir
    }

    #[test]
    fn test_load_minimal_metadata() {
        let dir = minimal_dataset("Property,Value\nVersion,6.0\n");
        let metadata = loader(dir.path()).load().unwrap();

        assert_eq!(metadata.version().as_str(), "6.0");
        assert_eq!(metadata.ordering(), EventOrdering::Unordered);
        assert_eq!(metadata.code_state_storage(), CodeStateStorage::Inline);
        assert!(metadata.is_present(TableKind::MainTable));
        assert!(!metadata.is_present(TableKind::Subject));
        assert_eq!(metadata.tables().count(), 4);
    }

    #[test]
    fn test_missing_metadata_file() {
        let dir = TempDir::new().unwrap();
        let err = loader(dir.path()).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetFormat);
        assert!(err.to_string().contains("metadata descriptor is missing"));
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = loader(&dir.path().join("nope")).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetFormat);
    }

    #[test]
    fn test_missing_version_property() {
        let dir = minimal_dataset("Property,Value\nIsEventOrderingConsistent,true\n");
        let err = loader(dir.path()).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetFormat);
    }

    #[test]
    fn test_unsupported_version() {
        let dir = minimal_dataset("Property,Value\nVersion,3.0\n");
        let err = loader(dir.path()).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedVersion);
        assert!(err.to_string().contains("3.0"));
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let dir = minimal_dataset("Property,Value\nVersion,6.0\nVersion,6.1\n");
        let err = loader(dir.path()).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetFormat);
    }

    #[test]
    fn test_properties_parsed() {
        let dir = minimal_dataset(
            "Property,Value\nVersion,6\nIsEventOrderingConsistent,TRUE\nTimestampFormat,%d/%m/%Y %H:%M\nCourse,CS1\n",
        );
        let metadata = loader(dir.path()).load().unwrap();
        assert_eq!(metadata.ordering(), EventOrdering::Consistent);
        assert_eq!(metadata.timestamp_format(), Some("%d/%m/%Y %H:%M"));
        assert_eq!(metadata.property("Course"), Some("CS1"));
    }

    #[test]
    fn test_bad_ordering_flag() {
        let dir = minimal_dataset("Property,Value\nVersion,6\nIsEventOrderingConsistent,maybe\n");
        let err = loader(dir.path()).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetFormat);
    }

    #[test]
    fn test_missing_main_table() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), METADATA_FILE, "Property,Value\nVersion,6.0\n");
        write(dir.path(), "CodeStates/CodeStates.csv", "CodeStateID,Code\n");
        let err = loader(dir.path()).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetFormat);
        assert!(err.to_string().contains("MainTable"));
    }

    #[test]
    fn test_code_states_table_optional_for_directory_storage() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            METADATA_FILE,
            "Property,Value\nVersion,6.0\nCodeStateRepresentation,Directory\n",
        );
        write(dir.path(), "MainTable.csv", "EventID,EventType,Order,SubjectID\n");
        let metadata = loader(dir.path()).load().unwrap();
        assert_eq!(metadata.code_state_storage(), CodeStateStorage::External);
        assert!(!metadata.is_present(TableKind::CodeStates));
    }

    #[test]
    fn test_declared_schemas_merged() {
        let dir = minimal_dataset("Property,Value\nVersion,6.0\n");
        write(
            dir.path(),
            TABLE_SCHEMAS_FILE,
            r#"{
                "MainTable": {"columns": [
                    {"name": "X-Attempt", "type": "int", "required": false},
                    {"name": "EventType", "type": "category", "required": true,
                     "values": ["Run.Program", "Submit"]}
                ]},
                "Subject": {"columns": [{"name": "X-Instructor", "type": "boolean"}]}
            }"#,
        );
        let metadata = loader(dir.path()).load().unwrap();

        let main = metadata.schema(TableKind::MainTable);
        assert_eq!(main.column("X-Attempt").unwrap().column_type, ColumnType::Int);
        assert_eq!(main.column("EventType").unwrap().values.as_ref().unwrap().len(), 2);
        let subject = metadata.schema(TableKind::Subject);
        assert_eq!(subject.column("X-Instructor").unwrap().column_type, ColumnType::Boolean);
    }

    #[test]
    fn test_declared_schema_unknown_table() {
        let dir = minimal_dataset("Property,Value\nVersion,6.0\n");
        write(dir.path(), TABLE_SCHEMAS_FILE, r#"{"Assignments": {"columns": []}}"#);
        let err = loader(dir.path()).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetFormat);
        assert!(err.to_string().contains("Assignments"));
    }

    #[test]
    fn test_declared_schema_type_change_rejected() {
        let dir = minimal_dataset("Property,Value\nVersion,6.0\n");
        write(
            dir.path(),
            TABLE_SCHEMAS_FILE,
            r#"{"MainTable": {"columns": [{"name": "Order", "type": "string", "required": true}]}}"#,
        );
        let err = loader(dir.path()).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetFormat);
    }

    #[test]
    fn test_unparsable_declared_schemas() {
        let dir = minimal_dataset("Property,Value\nVersion,6.0\n");
        write(dir.path(), TABLE_SCHEMAS_FILE, "{ not json");
        let err = loader(dir.path()).load().unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }
}
