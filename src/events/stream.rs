//! Event stream over the Main Table
//!
//! Ordering:
//! - Consistent ordering: rows are streamed, each `Order` must exceed the last
//! - Otherwise: every row is buffered on the first pull and sorted by `Order`
//!
//! Checks:
//! - `Order` values are unique
//! - `EventID` values are unique (configurable)
//!
//! Filters run on the decoded row; rows they reject are never joined.

use std::collections::HashSet;
use std::mem;
use std::path::PathBuf;

use crate::errors::{ProgsnapError, ProgsnapResult};
use crate::metadata::EventOrdering;
use crate::observability::{log_event_with_fields, Event as LogEvent};
use crate::table::{ErrorCollector, Row, TableReader};

use super::event::{event_order, Event, EventJoins, EVENT_ID};
use super::filter::EventFilter;

enum Source {
    /// Physically ordered file, read row by row
    Streaming(TableReader),
    /// Unordered file not read yet
    Pending(TableReader),
    /// Sorted rows
    Buffered(std::vec::IntoIter<Row>),
    Done,
}

/// Integrity checks applied to every decoded Main Table row
struct StreamChecks {
    path: PathBuf,
    seen_ids: Option<HashSet<String>>,
    last_order: Option<(i64, u64)>,
}

impl StreamChecks {
    fn check_event_id(&mut self, row: &Row) -> ProgsnapResult<()> {
        let Some(seen) = self.seen_ids.as_mut() else {
            return Ok(());
        };
        let event_id = row.get_str(EVENT_ID).unwrap_or_default();
        if !seen.insert(event_id.to_string()) {
            log_event_with_fields(
                LogEvent::DuplicateKey,
                &[("table", row.table()), ("key", event_id), ("row", &row.number().to_string())],
            );
            return Err(ProgsnapError::format_at(
                &self.path,
                format!("duplicate EventID '{}' at row {}", event_id, row.number()),
            ));
        }
        Ok(())
    }

    fn check_increasing(&mut self, row: &Row, order: i64) -> ProgsnapResult<()> {
        if let Some((previous, previous_row)) = self.last_order {
            if order <= previous {
                return Err(self.order_violation(
                    format!(
                        "Order {} at row {} does not follow Order {} at row {}",
                        order,
                        row.number(),
                        previous,
                        previous_row
                    ),
                    order,
                ));
            }
        }
        self.last_order = Some((order, row.number()));
        Ok(())
    }

    fn order_violation(&self, message: String, order: i64) -> ProgsnapError {
        log_event_with_fields(
            LogEvent::OrderViolation,
            &[("order", &order.to_string()), ("reason", &message)],
        );
        ProgsnapError::format_at(&self.path, message)
    }
}

/// Lazy, single-pass sequence of joined events in `Order` sequence.
///
/// Holds the Main Table file open until exhausted or dropped. Stops after
/// the first error.
pub struct EventStream {
    source: Source,
    checks: StreamChecks,
    joins: EventJoins,
    filter: EventFilter,
    emitted: u64,
    skipped: u64,
    finished: bool,
}

impl EventStream {
    pub(crate) fn new(
        reader: TableReader,
        ordering: EventOrdering,
        joins: EventJoins,
        filter: EventFilter,
        check_unique_event_ids: bool,
    ) -> Self {
        let checks = StreamChecks {
            path: reader.path().to_path_buf(),
            seen_ids: check_unique_event_ids.then(HashSet::new),
            last_order: None,
        };
        let source = match ordering {
            EventOrdering::Consistent => Source::Streaming(reader),
            EventOrdering::Unordered => Source::Pending(reader),
        };

        Self {
            source,
            checks,
            joins,
            filter,
            emitted: 0,
            skipped: 0,
            finished: false,
        }
    }

    /// Registers a callback for Main Table rows skipped under the skip policy.
    pub fn on_row_skipped(mut self, collector: ErrorCollector) -> Self {
        self.source = match mem::replace(&mut self.source, Source::Done) {
            Source::Streaming(reader) => Source::Streaming(reader.on_error(collector)),
            Source::Pending(reader) => Source::Pending(reader.on_error(collector)),
            other => other,
        };
        self
    }

    /// Events yielded so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Main Table rows skipped so far under the skip policy
    pub fn skipped(&self) -> u64 {
        match &self.source {
            Source::Streaming(reader) | Source::Pending(reader) => reader.skipped(),
            _ => self.skipped,
        }
    }

    /// Reads the next event.
    ///
    /// Returns `Ok(None)` when exhausted and after any error.
    pub fn read_next(&mut self) -> ProgsnapResult<Option<Event>> {
        if self.finished {
            return Ok(None);
        }

        match self.pull() {
            Ok(Some(event)) => {
                self.emitted += 1;
                Ok(Some(event))
            }
            Ok(None) => {
                self.finish();
                log_event_with_fields(
                    LogEvent::EventsExhausted,
                    &[
                        ("emitted", &self.emitted.to_string()),
                        ("skipped", &self.skipped.to_string()),
                    ],
                );
                Ok(None)
            }
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    fn pull(&mut self) -> ProgsnapResult<Option<Event>> {
        loop {
            let row = match &mut self.source {
                Source::Streaming(reader) => match reader.read_next()? {
                    Some(row) => {
                        let order = event_order(&row)?;
                        self.checks.check_increasing(&row, order)?;
                        self.checks.check_event_id(&row)?;
                        row
                    }
                    None => return Ok(None),
                },
                Source::Pending(_) => {
                    self.buffer()?;
                    continue;
                }
                Source::Buffered(rows) => match rows.next() {
                    Some(row) => row,
                    None => return Ok(None),
                },
                Source::Done => return Ok(None),
            };

            if self.filter.matches(&row) {
                return Event::join(row, &self.joins).map(Some);
            }
        }
    }

    /// Reads the whole Main Table and sorts it by `Order`.
    fn buffer(&mut self) -> ProgsnapResult<()> {
        let mut reader = match mem::replace(&mut self.source, Source::Done) {
            Source::Pending(reader) => reader,
            other => {
                self.source = other;
                return Ok(());
            }
        };

        let mut keyed = Vec::new();
        while let Some(row) = reader.read_next()? {
            let order = event_order(&row)?;
            self.checks.check_event_id(&row)?;
            keyed.push((order, row));
        }
        self.skipped = reader.skipped();

        keyed.sort_by_key(|(order, _)| *order);
        if let Some(pair) = keyed.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            let (order, first) = (&pair[0].0, &pair[0].1);
            let second = &pair[1].1;
            return Err(self.checks.order_violation(
                format!(
                    "duplicate Order {} at rows {} and {}",
                    order,
                    first.number().min(second.number()),
                    first.number().max(second.number())
                ),
                *order,
            ));
        }

        log_event_with_fields(
            LogEvent::EventsBuffered,
            &[("rows", &keyed.len().to_string()), ("skipped", &self.skipped.to_string())],
        );
        let rows: Vec<Row> = keyed.into_iter().map(|(_, row)| row).collect();
        self.source = Source::Buffered(rows.into_iter());
        Ok(())
    }

    /// Drops the reader (closing the file) and keeps its skip count.
    fn finish(&mut self) {
        self.skipped = self.skipped();
        self.source = Source::Done;
        self.finished = true;
    }
}

impl Iterator for EventStream {
    type Item = ProgsnapResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

impl std::iter::FusedIterator for EventStream {}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("filter", &self.filter)
            .field("emitted", &self.emitted)
            .field("skipped", &self.skipped())
            .field("finished", &self.finished)
            .finish()
    }
}
