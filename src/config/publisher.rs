//! Publisher configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Outbox drain settings
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    /// Maximum outbox rows leased per drain. Also bounds worst-case
    /// replay after a crashed drain.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// How often to poll the outbox, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Back-off after a failed drain, in milliseconds
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,
}

impl PublisherConfig {
    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get error back-off as Duration
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Validate publisher settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 || self.batch_size > 10_000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval(),
            error_backoff_ms: default_error_backoff(),
        }
    }
}

fn default_batch_size() -> u32 {
    100
}

fn default_poll_interval() -> u64 {
    500
}

fn default_error_backoff() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PublisherConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_batch() {
        let config = PublisherConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_oversized_batch() {
        let config = PublisherConfig {
            batch_size: 20_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
