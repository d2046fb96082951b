use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

/// Tail loop tuning. Lives under `[tail]` in the server config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TailConfig {
    /// Sleep between polls when no new complete batch exists. Fixed, no backoff.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// First delay after a storage error. `0` retries immediately.
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    /// Upper bound for the doubling storage-error delay.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Deliver complete batches with zero matching records (`match_count = 0`).
    /// When `false` such batches are skipped but the cursor still moves past them.
    #[serde(default = "default_emit_empty")]
    pub emit_empty: bool,
}

fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_retry_initial_ms() -> u64 {
    10
}
fn default_retry_max_ms() -> u64 {
    1000
}
fn default_emit_empty() -> bool {
    true
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
            emit_empty: default_emit_empty(),
        }
    }
}

impl TailConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_initial(&self) -> Duration {
        Duration::from_millis(self.retry_initial_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.poll_interval_ms == 0 {
            return Err(EngineError::Config("tail.poll_interval_ms must be > 0".into()));
        }
        if self.retry_initial_ms > self.retry_max_ms {
            return Err(EngineError::Config(format!(
                "tail.retry_initial_ms ({}) exceeds tail.retry_max_ms ({})",
                self.retry_initial_ms, self.retry_max_ms,
            )));
        }
        Ok(())
    }
}
