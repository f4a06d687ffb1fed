//! Observable events emitted while reading a dataset
//!
//! Events are explicit and typed.

use std::fmt;

/// Observable reader events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Dataset lifecycle
    /// `DatasetMetadata.csv` parsed and version accepted
    MetadataLoaded,
    /// Column declarations merged from `TableSchemas.json`
    SchemasDeclared,
    /// Optional link table absent on disk
    TableAbsent,
    /// Optional link table present but unreadable; the rest of the dataset stays open
    TableUnusable,
    /// Dataset handle released
    DatasetClosed,

    // Schema
    /// Table header validated against its declared schema
    SchemaValidated,
    /// Header carries columns that are not declared
    ExtensionColumns,
    /// Table header lacks a required column
    SchemaMismatch,

    // Rows
    /// Malformed row skipped under the tolerant policy
    RowSkipped,
    /// Malformed row stopped the stream under the fail-fast policy
    RowRejected,

    // Link tables
    /// Link table index built
    IndexBuilt,
    /// Link table contains the same key twice
    DuplicateKey,

    // Event stream
    /// Main Table buffered for sorting by Order
    EventsBuffered,
    /// Main Table exhausted
    EventsExhausted,
    /// Order or EventID invariant violated
    OrderViolation,

    // Code states
    /// Code state served from the cache
    CodeStateCacheHit,
    /// Code state read from its backing storage
    CodeStateLoaded,
    /// Code state could not be resolved
    CodeStateMissing,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::MetadataLoaded => "METADATA_LOADED",
            Event::SchemasDeclared => "SCHEMAS_DECLARED",
            Event::TableAbsent => "TABLE_ABSENT",
            Event::TableUnusable => "TABLE_UNUSABLE",
            Event::DatasetClosed => "DATASET_CLOSED",

            Event::SchemaValidated => "SCHEMA_VALIDATED",
            Event::ExtensionColumns => "EXTENSION_COLUMNS",
            Event::SchemaMismatch => "SCHEMA_MISMATCH",

            Event::RowSkipped => "ROW_SKIPPED",
            Event::RowRejected => "ROW_REJECTED",

            Event::IndexBuilt => "INDEX_BUILT",
            Event::DuplicateKey => "INDEX_DUPLICATE_KEY",

            Event::EventsBuffered => "EVENTS_BUFFERED",
            Event::EventsExhausted => "EVENTS_EXHAUSTED",
            Event::OrderViolation => "EVENT_ORDER_VIOLATION",

            Event::CodeStateCacheHit => "CODE_STATE_CACHE_HIT",
            Event::CodeStateLoaded => "CODE_STATE_LOADED",
            Event::CodeStateMissing => "CODE_STATE_MISSING",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Event::SchemaMismatch | Event::DuplicateKey | Event::OrderViolation
        )
    }

    /// Returns true for per-row / per-lookup events that are logged at TRACE
    pub fn is_high_volume(&self) -> bool {
        matches!(self, Event::CodeStateCacheHit | Event::CodeStateLoaded)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::MetadataLoaded,
            Event::SchemasDeclared,
            Event::TableAbsent,
            Event::TableUnusable,
            Event::DatasetClosed,
            Event::SchemaValidated,
            Event::ExtensionColumns,
            Event::SchemaMismatch,
            Event::RowSkipped,
            Event::RowRejected,
            Event::IndexBuilt,
            Event::DuplicateKey,
            Event::EventsBuffered,
            Event::EventsExhausted,
            Event::OrderViolation,
            Event::CodeStateCacheHit,
            Event::CodeStateLoaded,
            Event::CodeStateMissing,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::SchemaMismatch.is_fatal());
        assert!(Event::DuplicateKey.is_fatal());
        assert!(!Event::RowSkipped.is_fatal());
        assert!(!Event::CodeStateMissing.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::IndexBuilt), "INDEX_BUILT");
        assert_eq!(format!("{}", Event::OrderViolation), "EVENT_ORDER_VIOLATION");
    }
}
