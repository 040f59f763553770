//! Kafka configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Message bus (Kafka) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap broker list
    pub brokers: String,

    /// Consumer group id; one group per contour deployment
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Client id reported to the brokers
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Per-message produce timeout in milliseconds. A produce that has
    /// not been acknowledged within this window fails the batch.
    #[serde(default = "default_produce_timeout")]
    pub produce_timeout_ms: u64,

    /// Consumer session timeout in milliseconds
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,

    /// Where a fresh consumer group starts reading
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
}

impl KafkaConfig {
    /// Get produce timeout as Duration
    pub fn produce_timeout(&self) -> Duration {
        Duration::from_millis(self.produce_timeout_ms)
    }

    /// Validate Kafka configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.brokers.trim().is_empty() {
            return Err(ValidationError::MissingBrokers);
        }
        if self.produce_timeout_ms == 0 || self.session_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.auto_offset_reset != "earliest" && self.auto_offset_reset != "latest" {
            return Err(ValidationError::InvalidOffsetReset);
        }
        Ok(())
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: String::new(),
            group_id: default_group_id(),
            client_id: default_client_id(),
            produce_timeout_ms: default_produce_timeout(),
            session_timeout_ms: default_session_timeout(),
            auto_offset_reset: default_auto_offset_reset(),
        }
    }
}

fn default_group_id() -> String {
    "contour-sync".to_string()
}

fn default_client_id() -> String {
    "contour-sync".to_string()
}

fn default_produce_timeout() -> u64 {
    10_000
}

fn default_session_timeout() -> u64 {
    6_000
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> KafkaConfig {
        KafkaConfig {
            brokers: "kafka-1:9092,kafka-2:9092".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = KafkaConfig::default();
        assert_eq!(config.group_id, "contour-sync");
        assert_eq!(config.auto_offset_reset, "earliest");
        assert_eq!(config.produce_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validation_missing_brokers() {
        assert!(KafkaConfig::default().validate().is_err());
    }

    #[test]
    fn test_validation_invalid_offset_reset() {
        let config = KafkaConfig {
            auto_offset_reset: "newest".to_string(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = KafkaConfig {
            produce_timeout_ms: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(valid_config().validate().is_ok());
    }
}
