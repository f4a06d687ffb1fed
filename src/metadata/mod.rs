//! Dataset metadata
//!
//! Parses `DatasetMetadata.csv`, checks the declared version, resolves the
//! column schema of every table and checks that mandatory tables exist.

mod layout;
mod loader;

pub use layout::{
    builtin_schema, is_mandatory, CodeStateStorage, EventOrdering, SpecVersion, TableKind,
    CODE_STATES_DIR, METADATA_FILE, SUPPORTED_MAJOR_VERSION, SUPPORTED_VERSIONS,
    TABLE_SCHEMAS_FILE,
};
pub use loader::{Metadata, MetadataLoader};
