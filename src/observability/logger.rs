//! Structured logger for the reader
//!
//! - Explicit severity levels
//! - One log record = one event
//! - Deterministic field ordering (sorted by key)
//!
//! Records are handed to `tracing`; whichever subscriber the consumer installs
//! decides where they end up. The library never installs one itself.

use std::fmt;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-row and per-lookup detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues (skipped rows, missing code states)
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Dataset unusable
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured logger.
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let rendered = Self::render_fields(fields);
        match severity {
            Severity::Trace => tracing::trace!(target: "progsnap", event, fields = %rendered),
            Severity::Info => tracing::info!(target: "progsnap", event, fields = %rendered),
            Severity::Warn => tracing::warn!(target: "progsnap", event, fields = %rendered),
            Severity::Error => tracing::error!(target: "progsnap", event, fields = %rendered),
            Severity::Fatal => {
                tracing::error!(target: "progsnap", event, fatal = true, fields = %rendered)
            }
        }
    }

    /// Renders fields as `key=value` pairs sorted by key.
    ///
    /// Values containing whitespace, quotes or `=` are quoted.
    pub fn render_fields(fields: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);

        let mut output = String::with_capacity(fields.len() * 16);
        for (i, (key, value)) in sorted.into_iter().enumerate() {
            if i > 0 {
                output.push(' ');
            }
            output.push_str(key);
            output.push('=');
            if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"' || c == '=') {
                output.push_str(&format!("{:?}", value));
            } else {
                output.push_str(value);
            }
        }
        output
    }

    /// Log at TRACE level
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    /// Log at FATAL level
    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Fatal, event, fields);
    }
}
