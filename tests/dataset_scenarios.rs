//! End-to-end dataset scenarios
//!
//! Covers:
//! - Inline code state resolution through the event stream
//! - Missing required columns failing open
//! - External code state files and lazy lookup failures
//! - Extension columns and dangling foreign keys
//! - Optional link tables with a broken header
//! - Zipped datasets

mod common;

use common::{main_rows, zip_dataset, DatasetBuilder};
use progsnap::{Dataset, ErrorCode, LinkRef, ProgsnapError, TableKind, Value};

fn inline_scenario() -> tempfile::TempDir {
    DatasetBuilder::new()
        .main_table(&main_rows(&[
            "E1,Run.Program,1,S1,,C1,",
            "E2,Run.Program,2,S1,,,",
        ]))
        .code_states("CodeStateID,Code\nC1,print(1)\nC2,\n")
        .build()
}

fn assert_inline_scenario(dataset: &Dataset) {
    let events: Vec<_> = dataset.events().unwrap().map(Result::unwrap).collect();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_id(), "E1");
    assert_eq!(events[0].code_state_text().unwrap().as_deref(), Some("print(1)"));
    assert_eq!(events[1].event_id(), "E2");
    assert!(events[1].code_state().is_none());
    assert_eq!(events[1].code_state_text().unwrap(), None);
}

// =============================================================================
// Inline Code States
// =============================================================================

/// Test: E1 references C1 (inline `print(1)`), E2 has no code state.
#[test]
fn test_inline_code_state_scenario() {
    let dir = inline_scenario();
    let dataset = Dataset::open(dir.path()).unwrap();
    assert!(!dataset.source().is_zip());
    assert_inline_scenario(&dataset);
}

/// An empty inline Code field is an empty snapshot.
#[test]
fn test_empty_inline_code_state() {
    let dir = inline_scenario();
    let dataset = Dataset::open(dir.path()).unwrap();
    assert_eq!(&*dataset.resolve_code_state("C2").unwrap(), "");
}

/// Resolving the same code state twice yields identical text.
#[test]
fn test_code_state_resolution_is_idempotent() {
    let dir = DatasetBuilder::new()
        .code_states("CodeStateID,Code\nC1,\"def f():\n    return 1\n\"\n")
        .build();

    for cache_entries in [0, 16] {
        let config = progsnap::ReaderConfig::default().with_cache_entries(cache_entries);
        let dataset = Dataset::open_with_config(dir.path(), config).unwrap();
        let first = dataset.resolve_code_state("C1").unwrap();
        let second = dataset.resolve_code_state("C1").unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(&*first, "def f():\n    return 1\n");
    }
}

// =============================================================================
// Schema Failures
// =============================================================================

/// Test: required SubjectID absent from the Main Table header.
#[test]
fn test_missing_subject_id_column() {
    let dir = DatasetBuilder::new()
        .main_table("EventID,EventType,Order\nE1,Run.Program,1\n")
        .build();

    let err = Dataset::open(dir.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SchemaMismatch);
    match err {
        ProgsnapError::SchemaMismatch { table, column } => {
            assert_eq!(table, "MainTable");
            assert_eq!(column, "SubjectID");
        }
        other => panic!("unexpected error: {}", other),
    }
}

/// Unsupported versions fail at open.
#[test]
fn test_unsupported_version() {
    let dir = DatasetBuilder::new().property("Version", "5.1").build();
    let err = Dataset::open(dir.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedVersion);
    assert!(err.is_fatal());
}

/// A dataset without a descriptor is not a dataset.
#[test]
fn test_missing_descriptor() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = Dataset::open(dir.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DatasetFormat);
}

// =============================================================================
// External Code States
// =============================================================================

/// Test: `abc123` lives at `CodeStates/ab/abc123.txt`; a missing file fails
/// only its own lookup.
#[test]
fn test_external_code_state_scenario() {
    let dir = DatasetBuilder::new()
        .external_code_states()
        .main_table(&main_rows(&[
            "E1,Submit,1,S1,,abc123,",
            "E2,Submit,2,S1,,xyz789,",
            "E3,Submit,3,S1,,,",
        ]))
        .file("CodeStates/xy/xyz789.txt", "x = 1\n")
        .build();

    let dataset = Dataset::open(dir.path()).unwrap();
    assert_eq!(
        dataset.code_state_resolver().external_path("abc123").unwrap(),
        dir.path().join("CodeStates").join("ab").join("abc123.txt")
    );

    let events: Vec<_> = dataset.events().unwrap().map(Result::unwrap).collect();
    assert_eq!(events.len(), 3);

    let err = events[0].code_state_text().unwrap_err();
    assert_eq!(err.code(), ErrorCode::CodeStateNotFound);
    assert!(!err.is_fatal());
    assert_eq!(events[1].code_state_text().unwrap().as_deref(), Some("x = 1\n"));
    assert_eq!(events[2].code_state_text().unwrap(), None);
}

/// External storage may still carry a CodeStates table with path fragments.
#[test]
fn test_external_code_state_path_column() {
    let dir = DatasetBuilder::new()
        .external_code_states()
        .code_states("CodeStateID,Path\nC1,snapshots/c1.py\n")
        .file("snapshots/c1.py", "print('c1')")
        .main_table(&main_rows(&["E1,Submit,1,S1,,C1,"]))
        .build();

    let dataset = Dataset::open(dir.path()).unwrap();
    let event = dataset.events().unwrap().next().unwrap().unwrap();
    assert_eq!(event.code_state_text().unwrap().as_deref(), Some("print('c1')"));
}

// =============================================================================
// Extension Columns and Links
// =============================================================================

/// Undeclared columns are preserved untyped and never fail decoding.
#[test]
fn test_extension_columns_preserved() {
    let dir = DatasetBuilder::new()
        .main_table(
            "EventID,EventType,Order,SubjectID,X-Attempt,X-Note\n\
             E1,Submit,1,S1,3,first\n\
             E2,Submit,2,S1,three,\n",
        )
        .build();

    let dataset = Dataset::open(dir.path()).unwrap();
    let events: Vec<_> = dataset.events().unwrap().map(Result::unwrap).collect();

    assert_eq!(events[0].get("X-Attempt"), Some(&Value::Extension("3".into())));
    assert_eq!(events[1].get("X-Attempt"), Some(&Value::Extension("three".into())));
    assert_eq!(events[1].get("X-Note"), Some(&Value::Null));
    let extensions: Vec<_> = events[0].row().extensions().collect();
    assert_eq!(extensions, vec![("X-Attempt", "3"), ("X-Note", "first")]);
}

/// Declared extension columns are typed.
#[test]
fn test_declared_extension_column_is_typed() {
    let dir = DatasetBuilder::new()
        .table_schemas(r#"{"MainTable": {"columns": [{"name": "X-Attempt", "type": "int"}]}}"#)
        .main_table("EventID,EventType,Order,SubjectID,X-Attempt\nE1,Submit,1,S1,3\n")
        .build();

    let dataset = Dataset::open(dir.path()).unwrap();
    let event = dataset.events().unwrap().next().unwrap().unwrap();
    assert_eq!(event.get("X-Attempt"), Some(&Value::Int(3)));
}

/// Absent foreign keys are reported with an explicit marker.
#[test]
fn test_unresolved_and_null_links() {
    let dir = DatasetBuilder::new()
        .subjects("SubjectID\nS1\n")
        .tool_instances("ToolInstanceID,ToolName,ToolVersion\nT1,BlueJ,4.2\n")
        .main_table(&main_rows(&["E1,Run.Program,1,S1,T1,,", "E2,Run.Program,2,S404,,,"]))
        .build();

    let dataset = Dataset::open(dir.path()).unwrap();
    let events: Vec<_> = dataset.events().unwrap().map(Result::unwrap).collect();

    assert!(events[0].subject().is_resolved());
    assert_eq!(
        events[0].tool_instance().row().unwrap().get_str("ToolVersion"),
        Some("4.2")
    );
    assert_eq!(events[1].subject(), &LinkRef::Unresolved("S404".into()));
    assert_eq!(events[1].tool_instance(), &LinkRef::Null);
}

/// A duplicate link table key fails at index build.
#[test]
fn test_duplicate_subject_key() {
    let dir = DatasetBuilder::new().subjects("SubjectID\nS1\nS1\n").build();
    let err = Dataset::open(dir.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DatasetFormat);
    assert!(err.to_string().contains("duplicate SubjectID 'S1'"));
}

/// Link tables are enumerated in file order.
#[test]
fn test_link_table_enumeration() {
    let dir = DatasetBuilder::new()
        .subjects("SubjectID\nS3\nS1\nS2\n")
        .build();

    let dataset = Dataset::open(dir.path()).unwrap();
    let ids: Vec<_> = dataset
        .subjects()
        .unwrap()
        .map(|r| r.get_str("SubjectID").unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["S3", "S1", "S2"]);
    assert_eq!(dataset.schema(TableKind::Subject).key.as_deref(), Some("SubjectID"));
}

/// Test: a Subject table without SubjectID is set aside; the Main Table
/// still streams and subject links stay unresolved.
#[test]
fn test_broken_optional_link_table() {
    let dir = DatasetBuilder::new()
        .subjects("Name\nAda\n")
        .tool_instances("ToolInstanceID,ToolName\nT1,BlueJ\n")
        .main_table(&main_rows(&["E1,Run.Program,1,S1,T1,,", "E2,Compile,2,S2,,,"]))
        .build();

    let dataset = Dataset::open(dir.path()).unwrap();
    let err = dataset.subjects().err().unwrap();
    assert_eq!(err.code(), ErrorCode::SchemaMismatch);
    assert!(err.is_fatal());
    assert_eq!(
        dataset.read_table(TableKind::Subject).unwrap_err().code(),
        ErrorCode::SchemaMismatch
    );

    let events: Vec<_> = dataset.events().unwrap().map(Result::unwrap).collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].subject(), &LinkRef::Unresolved("S1".into()));
    assert!(events[0].tool_instance().is_resolved());
    assert_eq!(dataset.tool_instances().unwrap().count(), 1);
}

// =============================================================================
// Zipped Datasets
// =============================================================================

/// The inline scenario reads the same from an archive, whether the dataset
/// sits at the archive's top level or in a single folder.
#[test]
fn test_inline_scenario_from_zip() {
    let dir = inline_scenario();
    for prefix in ["", "cs1-fall/"] {
        let (_out, archive) = zip_dataset(dir.path(), prefix);
        let dataset = Dataset::open(&archive).unwrap();
        assert!(dataset.source().is_zip());
        assert_eq!(dataset.root(), archive.as_path());
        assert_eq!(dataset.tables().count(), 4);
        assert_inline_scenario(&dataset);
    }
}

/// External code state files are read from inside the archive.
#[test]
fn test_external_code_states_from_zip() {
    let dir = DatasetBuilder::new()
        .external_code_states()
        .subjects("SubjectID\nS1\n")
        .main_table(&main_rows(&["E1,Submit,1,S1,,abc123,", "E2,Submit,2,S1,,xyz789,"]))
        .file("CodeStates/xy/xyz789.txt", "x = 1\n")
        .build();
    let (_out, archive) = zip_dataset(dir.path(), "dataset/");

    let dataset = Dataset::open(&archive).unwrap();
    assert_eq!(
        dataset.code_state_resolver().external_path("xyz789").unwrap(),
        archive.join("dataset/CodeStates/xy/xyz789.txt")
    );
    assert!(dataset.subject("S1").unwrap().is_some());

    let events: Vec<_> = dataset.events().unwrap().map(Result::unwrap).collect();
    assert_eq!(events[0].code_state_text().unwrap_err().code(), ErrorCode::CodeStateNotFound);
    assert_eq!(events[1].code_state_text().unwrap().as_deref(), Some("x = 1\n"));
}

/// A file that is not an archive is not a dataset.
#[test]
fn test_non_archive_file_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("dataset.zip");
    std::fs::write(&path, "plain text").unwrap();
    let err = Dataset::open(&path).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DatasetFormat);
}
