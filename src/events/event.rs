//! Joined event records

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::codestate::CodeStateResolver;
use crate::errors::{ProgsnapError, ProgsnapResult};
use crate::index::{LinkIndex, LinkRef};
use crate::table::{Row, Value};

pub(crate) const EVENT_ID: &str = "EventID";
pub(crate) const EVENT_TYPE: &str = "EventType";
pub(crate) const ORDER: &str = "Order";
pub(crate) const SUBJECT_ID: &str = "SubjectID";
const TOOL_INSTANCE_ID: &str = "ToolInstanceID";
const CODE_STATE_ID: &str = "CodeStateID";
const SERVER_TIMESTAMP: &str = "ServerTimestamp";
const CLIENT_TIMESTAMP: &str = "ClientTimestamp";

/// Deferred handle to an event's code state.
///
/// Holds no file handle; content is loaded on `text()`.
#[derive(Clone)]
pub struct CodeStateRef {
    id: String,
    resolver: Arc<CodeStateResolver>,
}

impl CodeStateRef {
    pub(crate) fn new(id: impl Into<String>, resolver: Arc<CodeStateResolver>) -> Self {
        Self {
            id: id.into(),
            resolver,
        }
    }

    /// Code state identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Loads the source text.
    ///
    /// # Errors
    ///
    /// `CodeStateNotFound` if the code state cannot be located.
    pub fn text(&self) -> ProgsnapResult<Arc<str>> {
        self.resolver.resolve(&self.id)
    }
}

impl fmt::Debug for CodeStateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CodeStateRef").field(&self.id).finish()
    }
}

/// Indexes and resolver events are joined against
#[derive(Debug, Clone)]
pub(crate) struct EventJoins {
    pub subjects: Arc<LinkIndex>,
    pub tool_instances: Arc<LinkIndex>,
    pub resolver: Arc<CodeStateResolver>,
}

/// One Main Table row joined with its link table rows.
///
/// A value object: it owns its row and shares the indexes read-only.
#[derive(Debug, Clone)]
pub struct Event {
    row: Row,
    order: i64,
    subject: LinkRef,
    tool_instance: LinkRef,
    code_state: Option<CodeStateRef>,
}

impl Event {
    pub(crate) fn join(row: Row, joins: &EventJoins) -> ProgsnapResult<Self> {
        let order = event_order(&row)?;
        required_str(&row, EVENT_ID)?;
        required_str(&row, EVENT_TYPE)?;
        let subject = joins.subjects.lookup(Some(required_str(&row, SUBJECT_ID)?));
        let tool_instance = joins.tool_instances.lookup(row.get_str(TOOL_INSTANCE_ID));
        let code_state = row
            .get_str(CODE_STATE_ID)
            .map(|id| CodeStateRef::new(id, Arc::clone(&joins.resolver)));

        Ok(Self {
            row,
            order,
            subject,
            tool_instance,
            code_state,
        })
    }

    pub fn event_id(&self) -> &str {
        self.row.get_str(EVENT_ID).unwrap_or_default()
    }

    pub fn event_type(&self) -> &str {
        self.row.get_str(EVENT_TYPE).unwrap_or_default()
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn subject_id(&self) -> &str {
        self.row.get_str(SUBJECT_ID).unwrap_or_default()
    }

    pub fn tool_instance_id(&self) -> Option<&str> {
        self.row.get_str(TOOL_INSTANCE_ID)
    }

    pub fn code_state_id(&self) -> Option<&str> {
        self.code_state.as_ref().map(CodeStateRef::id)
    }

    pub fn server_timestamp(&self) -> Option<DateTime<Utc>> {
        self.row.get_timestamp(SERVER_TIMESTAMP)
    }

    pub fn client_timestamp(&self) -> Option<DateTime<Utc>> {
        self.row.get_timestamp(CLIENT_TIMESTAMP)
    }

    /// Joined Subject row, or a marker
    pub fn subject(&self) -> &LinkRef {
        &self.subject
    }

    /// Joined ToolInstance row, or a marker
    pub fn tool_instance(&self) -> &LinkRef {
        &self.tool_instance
    }

    /// Deferred code state handle; `None` when the event has no code state
    pub fn code_state(&self) -> Option<&CodeStateRef> {
        self.code_state.as_ref()
    }

    /// Loads the code state text, if the event references one.
    ///
    /// # Errors
    ///
    /// `CodeStateNotFound` if the referenced code state cannot be located.
    pub fn code_state_text(&self) -> ProgsnapResult<Option<Arc<str>>> {
        self.code_state.as_ref().map(CodeStateRef::text).transpose()
    }

    /// Any column of the underlying row, declared or extension
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.row.get(column)
    }

    /// Underlying Main Table row
    pub fn row(&self) -> &Row {
        &self.row
    }
}

/// Reads the `Order` value of a Main Table row.
pub(crate) fn event_order(row: &Row) -> ProgsnapResult<i64> {
    row.get_int(ORDER).ok_or_else(|| missing_core(row, ORDER))
}

fn required_str<'r>(row: &'r Row, column: &str) -> ProgsnapResult<&'r str> {
    row.get_str(column).ok_or_else(|| missing_core(row, column))
}

fn missing_core(row: &Row, column: &str) -> ProgsnapError {
    // Unreachable for validated Main Table rows: these columns are required.
    ProgsnapError::format(format!(
        "table '{}' row {} has no value for '{}'",
        row.table(),
        row.number(),
        column
    ))
}
