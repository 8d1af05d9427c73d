//! # Session timing configuration
//!
//! [`SessionConfig`] holds the three timings of the session lifecycle:
//!
//! | Field | Default | Meaning |
//! |-------|---------|---------|
//! | `refresh_buffer_secs` | 300 | Refresh this long before the access token expires. |
//! | `retry_backoff_ms` | 5000 | Wait before the single retry of a failed refresh. |
//! | `recheck_interval_secs` | 60 | Period of the background session re-validation. |
//!
//! All fields carry serde defaults so a partial (or empty) JSON object is
//! equivalent to the default configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_refresh_buffer")]
    pub refresh_buffer_secs: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_recheck_interval")]
    pub recheck_interval_secs: u64,
}

fn default_refresh_buffer() -> u64 {
    300
}

fn default_retry_backoff() -> u64 {
    5_000
}

fn default_recheck_interval() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_buffer_secs: default_refresh_buffer(),
            retry_backoff_ms: default_retry_backoff(),
            recheck_interval_secs: default_recheck_interval(),
        }
    }
}

impl SessionConfig {
    /// Builder method to set the retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"refresh_buffer_secs":120}"#).unwrap();
        assert_eq!(config.refresh_buffer(), Duration::from_secs(120));
        assert_eq!(config.retry_backoff(), Duration::from_secs(5));
        assert_eq!(config.recheck_interval(), Duration::from_secs(60));

        let empty: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, SessionConfig::default());
    }
}
