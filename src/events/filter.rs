//! Event filtering
//!
//! A filter sees the decoded Main Table row only. It runs before the row is
//! joined and before any code state is loaded.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::table::Row;

use super::event::{EVENT_TYPE, SUBJECT_ID};

type RowPredicate = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// Selects which Main Table rows become events.
///
/// All criteria must hold. An empty filter accepts every row.
#[derive(Clone, Default)]
pub struct EventFilter {
    event_types: Option<HashSet<String>>,
    subject_ids: Option<HashSet<String>>,
    predicate: Option<RowPredicate>,
}

impl EventFilter {
    /// Filter accepting every row
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep only the given event types
    pub fn with_event_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Keep only events of the given subjects
    pub fn with_subject_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subject_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Keep only rows satisfying `predicate`
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Returns whether the filter accepts every row
    pub fn is_empty(&self) -> bool {
        self.event_types.is_none() && self.subject_ids.is_none() && self.predicate.is_none()
    }

    /// Returns whether a decoded Main Table row passes the filter.
    pub fn matches(&self, row: &Row) -> bool {
        if let Some(types) = &self.event_types {
            if !row.get_str(EVENT_TYPE).is_some_and(|t| types.contains(t)) {
                return false;
            }
        }
        if let Some(ids) = &self.subject_ids {
            if !row.get_str(SUBJECT_ID).is_some_and(|s| ids.contains(s)) {
                return false;
            }
        }
        match &self.predicate {
            Some(predicate) => predicate(row),
            None => true,
        }
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("event_types", &self.event_types)
            .field("subject_ids", &self.subject_ids)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
