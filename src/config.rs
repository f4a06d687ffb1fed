//! Reader configuration
//!
//! A library-level object passed to `Dataset::open_with_config`. Nothing is
//! read from the process environment.

use serde::{Deserialize, Serialize};

use crate::errors::{ProgsnapError, ProgsnapResult};

/// What to do with a row whose values cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Surface the error and stop the stream at that row.
    FailFast,
    /// Log the row, hand it to the error collector, and continue.
    Skip,
}

impl Default for RowPolicy {
    fn default() -> Self {
        RowPolicy::FailFast
    }
}

/// Reader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Row decode failure policy (default: fail fast)
    #[serde(default)]
    pub row_policy: RowPolicy,

    /// Maximum code states held by the resolver cache; 0 disables caching
    #[serde(default = "default_cache_entries")]
    pub code_state_cache_entries: usize,

    /// Track seen EventIDs and reject duplicates (default: true)
    #[serde(default = "default_check_unique_event_ids")]
    pub check_unique_event_ids: bool,
}

fn default_cache_entries() -> usize {
    256
}

fn default_check_unique_event_ids() -> bool {
    true
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            row_policy: RowPolicy::default(),
            code_state_cache_entries: default_cache_entries(),
            check_unique_event_ids: default_check_unique_event_ids(),
        }
    }
}

impl ReaderConfig {
    /// Fail-fast configuration (the default).
    pub fn strict() -> Self {
        Self::default()
    }

    /// Skip-and-report configuration for tolerant consumers.
    pub fn tolerant() -> Self {
        Self {
            row_policy: RowPolicy::Skip,
            ..Self::default()
        }
    }

    /// Set the code state cache size (0 disables caching).
    pub fn with_cache_entries(mut self, entries: usize) -> Self {
        self.code_state_cache_entries = entries;
        self
    }

    /// Set the row decode policy.
    pub fn with_row_policy(mut self, policy: RowPolicy) -> Self {
        self.row_policy = policy;
        self
    }

    /// Enable or disable EventID uniqueness tracking.
    pub fn with_unique_event_ids(mut self, check: bool) -> Self {
        self.check_unique_event_ids = check;
        self
    }

    /// Returns whether the code state cache is enabled.
    pub fn cache_enabled(&self) -> bool {
        self.code_state_cache_entries > 0
    }

    /// Parse a configuration from JSON; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> ProgsnapResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ProgsnapError::format(format!("Invalid reader configuration: {}", e)))
    }
}
