//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Contour name must not be empty")]
    MissingContourName,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Session origin parameter must be 'app.replication_origin', the name compiled into the capture triggers")]
    OriginParameterMismatch,

    #[error("Consumer origin value must be 'consumer', the value compiled into the capture triggers")]
    ConsumerOriginMismatch,

    #[error("Kafka brokers must not be empty")]
    MissingBrokers,

    #[error("auto_offset_reset must be 'earliest' or 'latest'")]
    InvalidOffsetReset,

    #[error("Timeout values must be greater than zero")]
    InvalidTimeout,

    #[error("Replicated table list must not be empty")]
    EmptyTableList,

    #[error("Invalid replicated table name: {0}")]
    InvalidTableName(String),

    #[error("Publisher batch size must be between 1 and 10000")]
    InvalidBatchSize,

    #[error("Ledger retention must not be shorter than outbox retention")]
    LedgerRetentionTooShort,

    #[error("Retention windows must be greater than zero")]
    InvalidRetention,
}
