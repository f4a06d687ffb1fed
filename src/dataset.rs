//! Dataset handle
//!
//! `Dataset::open` loads metadata, validates the header of every present
//! table and indexes the link tables. Events are streamed on demand.
//!
//! An optional link table whose header lacks a required column is set aside
//! rather than failing the open: its accessors return the `SchemaMismatch`
//! and foreign keys into it stay unresolved.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::codestate::{CacheStats, CodeStateResolver, CodeStateSource};
use crate::config::ReaderConfig;
use crate::errors::{ProgsnapError, ProgsnapResult, RowDecodeError};
use crate::events::{EventFilter, EventJoins, EventStream};
use crate::index::LinkIndex;
use crate::metadata::{is_mandatory, CodeStateStorage, Metadata, MetadataLoader, TableKind};
use crate::observability::{log_event_with_fields, Event as LogEvent, ObservationScope};
use crate::schema::TableSchema;
use crate::source::DatasetSource;
use crate::table::{ErrorCollector, Row, TableReader};

/// An open Progsnap dataset.
///
/// Immutable once opened. Dropping it releases the indexes and the code
/// state cache; open event streams keep what they share alive.
#[derive(Debug)]
pub struct Dataset {
    source: DatasetSource,
    config: ReaderConfig,
    metadata: Metadata,
    subjects: Arc<LinkIndex>,
    tool_instances: Arc<LinkIndex>,
    resolver: Arc<CodeStateResolver>,
    collector: Option<SharedCollector>,
}

impl Dataset {
    /// Opens a dataset with the default (fail-fast) configuration.
    pub fn open(root: impl AsRef<Path>) -> ProgsnapResult<Self> {
        Self::open_with_config(root, ReaderConfig::default())
    }

    /// Opens a dataset directory or zip archive.
    ///
    /// # Errors
    ///
    /// - `DatasetFormat` for a missing root, an unreadable archive, a missing
    ///   or malformed descriptor, a missing mandatory table, a malformed
    ///   table or a duplicate link table key
    /// - `UnsupportedVersion` for a version outside 6.x
    /// - `SchemaMismatch` if a mandatory table lacks a required column
    /// - `RowDecode` for a malformed link table row under fail-fast
    pub fn open_with_config(root: impl AsRef<Path>, config: ReaderConfig) -> ProgsnapResult<Self> {
        Self::open_observed(root.as_ref(), config, None)
    }

    /// Opens a dataset, passing every row skipped under `RowPolicy::Skip` to
    /// `collector`.
    ///
    /// The collector sees link table rows skipped during the open and Main
    /// Table rows skipped by event streams and `read_table` readers, unless
    /// those register their own.
    pub fn open_with_collector(
        root: impl AsRef<Path>,
        config: ReaderConfig,
        collector: ErrorCollector,
    ) -> ProgsnapResult<Self> {
        Self::open_observed(root.as_ref(), config, Some(SharedCollector::new(collector)))
    }

    fn open_observed(
        root: &Path,
        config: ReaderConfig,
        collector: Option<SharedCollector>,
    ) -> ProgsnapResult<Self> {
        let display = root.display().to_string();
        let scope = ObservationScope::with_fields("DATASET_OPEN", &[("root", &display)]);

        match Self::load(root, config, collector) {
            Ok(dataset) => {
                scope.complete_with_fields(&[
                    ("subjects", &dataset.subjects.len().to_string()),
                    ("tool_instances", &dataset.tool_instances.len().to_string()),
                    ("code_states", &dataset.resolver.index().len().to_string()),
                ]);
                Ok(dataset)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn load(
        root: &Path,
        config: ReaderConfig,
        collector: Option<SharedCollector>,
    ) -> ProgsnapResult<Self> {
        let source = DatasetSource::open(root)?;
        let metadata = MetadataLoader::new(source.clone()).load()?;
        let opener = TableOpener {
            source: &source,
            metadata: &metadata,
            config: &config,
            collector: collector.as_ref(),
        };

        // Header check only; events reopen the file.
        opener.open_reader(TableKind::MainTable)?;

        let subjects = opener.build_index(TableKind::Subject)?;
        let tool_instances = opener.build_index(TableKind::ToolInstance)?;
        let code_states = opener.build_index(TableKind::CodeStates)?;

        let code_state_source = match metadata.code_state_storage() {
            CodeStateStorage::Inline => CodeStateSource::Inline(code_states),
            CodeStateStorage::External => CodeStateSource::External {
                source: source.clone(),
                index: code_states,
            },
        };
        let resolver = CodeStateResolver::new(code_state_source, config.code_state_cache_entries);

        Ok(Self {
            source,
            config,
            metadata,
            subjects: Arc::new(subjects),
            tool_instances: Arc::new(tool_instances),
            resolver: Arc::new(resolver),
            collector,
        })
    }

    /// Directory or zip archive the dataset was opened from
    pub fn root(&self) -> &Path {
        self.source.root()
    }

    /// Storage backing the dataset
    pub fn source(&self) -> &DatasetSource {
        &self.source
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Declared tables with their schemas
    pub fn tables(&self) -> impl Iterator<Item = (TableKind, &TableSchema)> {
        self.metadata.tables()
    }

    /// Declared schema of a table
    pub fn schema(&self, kind: TableKind) -> &TableSchema {
        self.metadata.schema(kind)
    }

    /// Opens a raw row reader over any present table.
    ///
    /// # Errors
    ///
    /// - `DatasetFormat` if the table is absent or unreadable
    /// - `SchemaMismatch` if the table was set aside at open
    pub fn read_table(&self, kind: TableKind) -> ProgsnapResult<TableReader> {
        match kind {
            TableKind::Subject => {
                self.subjects.check()?;
            }
            TableKind::ToolInstance => {
                self.tool_instances.check()?;
            }
            TableKind::CodeStates => {
                self.resolver.index().check()?;
            }
            TableKind::MainTable => {}
        }
        self.opener().open_reader(kind)
    }

    /// All events in `Order` sequence.
    pub fn events(&self) -> ProgsnapResult<EventStream> {
        self.events_filtered(EventFilter::all())
    }

    /// Events accepted by `filter`, in `Order` sequence.
    ///
    /// Each call reopens the Main Table.
    pub fn events_filtered(&self, filter: EventFilter) -> ProgsnapResult<EventStream> {
        let reader = self.read_table(TableKind::MainTable)?;
        let joins = EventJoins {
            subjects: Arc::clone(&self.subjects),
            tool_instances: Arc::clone(&self.tool_instances),
            resolver: Arc::clone(&self.resolver),
        };
        Ok(EventStream::new(
            reader,
            self.metadata.ordering(),
            joins,
            filter,
            self.config.check_unique_event_ids,
        ))
    }

    /// Event history of one subject.
    pub fn events_for_subject(&self, subject_id: &str) -> ProgsnapResult<EventStream> {
        self.events_filtered(EventFilter::all().with_subject_ids([subject_id]))
    }

    /// Source text of a code state.
    pub fn resolve_code_state(&self, code_state_id: &str) -> ProgsnapResult<Arc<str>> {
        self.resolver.resolve(code_state_id)
    }

    pub fn code_state_resolver(&self) -> &CodeStateResolver {
        &self.resolver
    }

    /// Code state cache counters
    pub fn code_state_stats(&self) -> CacheStats {
        self.resolver.stats()
    }

    /// Subject row with the given key.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` if the Subject table was set aside at open.
    pub fn subject(&self, subject_id: &str) -> ProgsnapResult<Option<&Arc<Row>>> {
        Ok(self.subjects.check()?.get(subject_id))
    }

    /// Subject rows in file order
    pub fn subjects(&self) -> ProgsnapResult<impl Iterator<Item = &Arc<Row>>> {
        Ok(self.subjects.check()?.iter())
    }

    /// ToolInstance row with the given key.
    pub fn tool_instance(&self, tool_instance_id: &str) -> ProgsnapResult<Option<&Arc<Row>>> {
        Ok(self.tool_instances.check()?.get(tool_instance_id))
    }

    /// ToolInstance rows in file order
    pub fn tool_instances(&self) -> ProgsnapResult<impl Iterator<Item = &Arc<Row>>> {
        Ok(self.tool_instances.check()?.iter())
    }

    /// Link table rows skipped at open under the skip policy
    pub fn skipped_link_rows(&self) -> u64 {
        self.subjects.skipped() + self.tool_instances.skipped() + self.resolver.index().skipped()
    }

    /// Closes the dataset. Equivalent to dropping it.
    pub fn close(self) {
        let stats = self.resolver.stats();
        log_event_with_fields(
            LogEvent::DatasetClosed,
            &[
                ("root", &self.root().display().to_string()),
                ("cache_hits", &stats.hits.to_string()),
                ("cache_misses", &stats.misses.to_string()),
            ],
        );
    }

    fn opener(&self) -> TableOpener<'_> {
        TableOpener {
            source: &self.source,
            metadata: &self.metadata,
            config: &self.config,
            collector: self.collector.as_ref(),
        }
    }
}

/// One error collector shared by every reader a dataset opens
#[derive(Clone)]
struct SharedCollector(Arc<Mutex<ErrorCollector>>);

impl SharedCollector {
    fn new(collector: ErrorCollector) -> Self {
        Self(Arc::new(Mutex::new(collector)))
    }

    /// A per-reader collector forwarding to the shared one
    fn attach(&self) -> ErrorCollector {
        let shared = Arc::clone(&self.0);
        Box::new(move |e: &RowDecodeError| {
            let mut collect = shared.lock().unwrap_or_else(|p| p.into_inner());
            (*collect)(e);
        })
    }
}

impl fmt::Debug for SharedCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedCollector")
    }
}

/// Everything needed to open a table reader
struct TableOpener<'a> {
    source: &'a DatasetSource,
    metadata: &'a Metadata,
    config: &'a ReaderConfig,
    collector: Option<&'a SharedCollector>,
}

impl TableOpener<'_> {
    fn open_reader(&self, kind: TableKind) -> ProgsnapResult<TableReader> {
        if !self.metadata.is_present(kind) {
            return Err(ProgsnapError::format_at(
                &self.source.location(kind.relative_path()),
                format!("table '{}' is not present", kind),
            ));
        }

        let reader = TableReader::open_in(self.source, kind.relative_path(), self.metadata.schema(kind))?
            .with_policy(self.config.row_policy)
            .with_timestamp_format(self.metadata.timestamp_format());
        Ok(match self.collector {
            Some(collector) => reader.on_error(collector.attach()),
            None => reader,
        })
    }

    /// Indexes a link table. An absent table yields an empty index; an
    /// optional table with a bad header yields an unusable one.
    fn build_index(&self, kind: TableKind) -> ProgsnapResult<LinkIndex> {
        if !self.metadata.is_present(kind) {
            return Ok(LinkIndex::empty(kind));
        }

        let reader = match self.open_reader(kind) {
            Ok(reader) => reader,
            Err(e @ ProgsnapError::SchemaMismatch { .. })
                if !is_mandatory(kind, self.metadata.code_state_storage()) =>
            {
                log_event_with_fields(
                    LogEvent::TableUnusable,
                    &[("table", kind.name()), ("reason", &e.to_string())],
                );
                return Ok(LinkIndex::unusable(kind, e));
            }
            Err(e) => return Err(e),
        };
        LinkIndex::build(kind, reader)
    }
}
