//! Observability for the reader
//!
//! - Structured log records with sorted fields
//! - Typed lifecycle events
//! - Scope-based begin/complete logging
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on reading
//! 3. No background threads
//!
//! # Usage
//!
//! ```ignore
//! use progsnap::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::IndexBuilt, &[("table", "Subject"), ("rows", "12")]);
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(default_severity(event), event.as_str(), fields);
}

/// Log a lifecycle event at an explicit severity
pub fn log_event_at(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}

fn default_severity(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_high_volume() {
        Severity::Trace
    } else {
        match event {
            Event::RowSkipped | Event::CodeStateMissing | Event::TableAbsent => Severity::Warn,
            Event::RowRejected | Event::TableUnusable => Severity::Error,
            _ => Severity::Info,
        }
    }
}
