//! Janitor (retention) configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Retention settings for the outbox and the processed-event ledger.
///
/// The SQL routines can also be driven by cron; enabling the in-process
/// janitor is for deployments without an external scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct JanitorConfig {
    /// Run the in-process janitor loop
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between cleanup passes
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Days to keep published outbox rows
    #[serde(default = "default_outbox_retention")]
    pub outbox_retention_days: u32,

    /// Days to keep processed-event entries. Must cover the bus
    /// redelivery window, so it cannot be shorter than outbox retention.
    #[serde(default = "default_ledger_retention")]
    pub ledger_retention_days: u32,
}

impl JanitorConfig {
    /// Get cleanup interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate retention windows
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.outbox_retention_days == 0 || self.ledger_retention_days == 0 {
            return Err(ValidationError::InvalidRetention);
        }
        if self.ledger_retention_days < self.outbox_retention_days {
            return Err(ValidationError::LedgerRetentionTooShort);
        }
        if self.enabled && self.interval_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval(),
            outbox_retention_days: default_outbox_retention(),
            ledger_retention_days: default_ledger_retention(),
        }
    }
}

fn default_interval() -> u64 {
    3_600
}

fn default_outbox_retention() -> u32 {
    7
}

fn default_ledger_retention() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = JanitorConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval(), Duration::from_secs(3_600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ledger_retention_must_cover_outbox() {
        let config = JanitorConfig {
            outbox_retention_days: 14,
            ledger_retention_days: 7,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retention_rejected() {
        let config = JanitorConfig {
            outbox_retention_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
