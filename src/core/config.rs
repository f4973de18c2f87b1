use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::error::{ExecutionError, Result};

/// Tunables shared by every execution a host starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Iteration interval used until an execution picks its own.
    pub default_interval_ms: u64,

    /// How often a paused execution wakes up to look for `resume`/`stop`.
    pub paused_poll_interval_ms: u64,

    /// Longest a flush waits on a slow subscriber before dropping the batch.
    pub flush_timeout_ms: u64,

    /// Batches a subscriber may have queued before flushes start waiting.
    pub subscriber_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 100,
            paused_poll_interval_ms: 50,
            flush_timeout_ms: 1_000,
            subscriber_capacity: 16,
        }
    }
}

impl ExecutionConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ExecutionError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&content)?;
        log::info!("Loaded execution config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subscriber_capacity == 0 {
            return Err(ExecutionError::InvalidConfig(
                "subscriber_capacity must be at least 1".into(),
            ));
        }
        if self.paused_poll_interval_ms == 0 {
            return Err(ExecutionError::InvalidConfig(
                "paused_poll_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Durations are stored in whole milliseconds; the `with_*` setters round
    /// any fraction up, so a non-zero duration never becomes zero.
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval_ms = whole_millis(interval);
        self
    }

    pub fn with_paused_poll_interval(mut self, interval: Duration) -> Self {
        self.paused_poll_interval_ms = whole_millis(interval);
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout_ms = whole_millis(timeout);
        self
    }

    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity;
        self
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn paused_poll_interval(&self) -> Duration {
        Duration::from_millis(self.paused_poll_interval_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

fn whole_millis(duration: Duration) -> u64 {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX)
}
