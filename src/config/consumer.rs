//! Consumer configuration

use serde::Deserialize;
use std::time::Duration;

use crate::domain::ConflictPolicy;

use super::error::ValidationError;

/// Remote change consumption settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Bus poll timeout in milliseconds. Kept short so shutdown stays
    /// responsive.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,

    /// Policy applied when an incoming change collides with an existing
    /// row version
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    /// Back-off after a transient processing failure, in milliseconds
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,
}

impl ConsumerConfig {
    /// Get poll timeout as Duration
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Get error back-off as Duration
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Validate consumer settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout(),
            conflict_policy: ConflictPolicy::default(),
            error_backoff_ms: default_error_backoff(),
        }
    }
}

fn default_poll_timeout() -> u64 {
    1_000
}

fn default_error_backoff() -> u64 {
    1_000
}
