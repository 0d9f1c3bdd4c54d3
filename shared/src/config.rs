use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::capabilities::{ApiBaseUrl, ApiCall};
use crate::{FETCH_TIMEOUT, MAX_CALL_TIMEOUT, MIN_CALL_TIMEOUT, MUTATION_TIMEOUT};

/// Settings the shell hands to the core with `Event::Configure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub api_base_url: ApiBaseUrl,
    pub mutation_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    /// Whether the loop-back corrections (DroppedOff→Waiting, Absent→Waiting)
    /// are offered. Turn off for servers that refuse `waiting` as a target.
    pub allow_revert_to_waiting: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: ApiBaseUrl::default(),
            mutation_timeout_ms: duration_ms(MUTATION_TIMEOUT),
            fetch_timeout_ms: duration_ms(FETCH_TIMEOUT),
            allow_revert_to_waiting: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be between {min_ms}ms and {max_ms}ms, got {value_ms}ms")]
    TimeoutOutOfRange {
        field: &'static str,
        value_ms: u64,
        min_ms: u64,
        max_ms: u64,
    },

    #[error("invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_timeout("mutation_timeout_ms", self.mutation_timeout_ms)?;
        check_timeout("fetch_timeout_ms", self.fetch_timeout_ms)?;
        Ok(())
    }

    #[must_use]
    pub const fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }

    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    #[must_use]
    pub const fn timeout_for(&self, call: &ApiCall) -> Duration {
        if call.is_mutation() {
            self.mutation_timeout()
        } else {
            self.fetch_timeout()
        }
    }
}

fn check_timeout(field: &'static str, value_ms: u64) -> Result<(), ConfigError> {
    let min_ms = duration_ms(MIN_CALL_TIMEOUT);
    let max_ms = duration_ms(MAX_CALL_TIMEOUT);
    if (min_ms..=max_ms).contains(&value_ms) {
        Ok(())
    } else {
        Err(ConfigError::TimeoutOutOfRange {
            field,
            value_ms,
            min_ms,
            max_ms,
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
