//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment
//! variables using the `config` and `dotenvy` crates. Configuration is
//! loaded with the `CONTOUR_SYNC` prefix and nested values use double
//! underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use contour_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Replicating tables {:?}", config.replication.tables);
//! ```

mod consumer;
mod contour;
mod database;
mod error;
mod janitor;
mod kafka;
mod publisher;
mod replication;

pub use consumer::ConsumerConfig;
pub use contour::ContourConfig;
pub use database::{DatabaseConfig, CONSUMER_ORIGIN, ORIGIN_PARAMETER};
pub use error::{ConfigError, ValidationError};
pub use janitor::JanitorConfig;
pub use kafka::KafkaConfig;
pub use publisher::PublisherConfig;
pub use replication::ReplicationConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Contains all configuration sections for one contour-sync process.
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Contour identity (name, database label)
    pub contour: ContourConfig,

    /// Database configuration (PostgreSQL connection, session origin)
    pub database: DatabaseConfig,

    /// Message bus configuration (Kafka)
    pub kafka: KafkaConfig,

    /// Replicated table set
    pub replication: ReplicationConfig,

    /// Outbox drain settings
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Remote change consumption settings
    #[serde(default)]
    pub consumer: ConsumerConfig,

    /// Retention settings
    #[serde(default)]
    pub janitor: JanitorConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `CONTOUR_SYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `CONTOUR_SYNC__CONTOUR__NAME=A` -> `contour.name = "A"`
    /// - `CONTOUR_SYNC__DATABASE__URL=...` -> `database.url = ...`
    /// - `CONTOUR_SYNC__REPLICATION__TABLES=users,orders` -> table list
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required environment variables are
    /// missing or values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CONTOUR_SYNC")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("replication.tables"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    /// A process refusing to start here is the intended failure mode for
    /// misconfiguration; a consumer without its session origin would
    /// silently replicate its own writes back.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.contour.validate()?;
        self.database.validate()?;
        self.kafka.validate()?;
        self.replication.validate()?;
        self.publisher.validate()?;
        self.consumer.validate()?;
        self.janitor.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set environment variables for testing
    /// Uses double underscores to separate nested config values
    fn set_minimal_env() {
        env::set_var("CONTOUR_SYNC__CONTOUR__NAME", "A");
        env::set_var(
            "CONTOUR_SYNC__DATABASE__URL",
            "postgresql://test@localhost/contour",
        );
        env::set_var("CONTOUR_SYNC__KAFKA__BROKERS", "localhost:9092");
        env::set_var("CONTOUR_SYNC__REPLICATION__TABLES", "users,orders");
    }

    /// Helper to clear environment variables after testing
    fn clear_env() {
        env::remove_var("CONTOUR_SYNC__CONTOUR__NAME");
        env::remove_var("CONTOUR_SYNC__DATABASE__URL");
        env::remove_var("CONTOUR_SYNC__KAFKA__BROKERS");
        env::remove_var("CONTOUR_SYNC__REPLICATION__TABLES");
        env::remove_var("CONTOUR_SYNC__CONSUMER__CONFLICT_POLICY");
        env::remove_var("CONTOUR_SYNC__PUBLISHER__BATCH_SIZE");
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.contour.name, "A");
        assert_eq!(config.database.url, "postgresql://test@localhost/contour");
        assert_eq!(config.replication.tables, vec!["users", "orders"]);
    }

    #[test]
    fn test_validate_full_config() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok());
        let config = result.unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.publisher.batch_size, 100);
        assert_eq!(config.consumer.poll_timeout_ms, 1_000);
        assert!(!config.janitor.enabled);
        assert_eq!(config.contour.database, "primary");
    }

    #[test]
    fn test_custom_batch_size() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("CONTOUR_SYNC__PUBLISHER__BATCH_SIZE", "25");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.publisher.batch_size, 25);
    }

    #[test]
    fn test_conflict_policy_from_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("CONTOUR_SYNC__CONSUMER__CONFLICT_POLICY", "skip");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(
            config.consumer.conflict_policy,
            crate::domain::ConflictPolicy::Skip
        );
    }
}
