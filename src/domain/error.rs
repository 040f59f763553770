//! Error types for the replication core.
//!
//! The variants map onto the operational taxonomy the services act on:
//! transient infrastructure failures are retried without acknowledging the
//! message, poison payloads are acknowledged so they cannot stall a
//! partition, and version conflicts under the `error` policy are pushed
//! back to the bus for an operator to resolve.

use thiserror::Error;

/// Errors produced by the replication pipeline.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Database connectivity or statement failure.
    #[error("database error: {0}")]
    Database(String),

    /// Message bus produce, consume, or commit failure.
    #[error("bus error: {0}")]
    Bus(String),

    /// Event document that cannot be parsed or fails shape validation.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Version conflict surfaced under the `error` conflict policy.
    #[error("version conflict on {table} key {key}: existing version {existing}, incoming version {incoming}")]
    Conflict {
        table: String,
        key: String,
        existing: i64,
        incoming: i64,
    },

    /// Constraint violation the version checks could not resolve. Without
    /// schema coordination the event can never apply, so it is dropped
    /// rather than redelivered forever.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Table or column name that fails the identifier whitelist.
    #[error("unsafe identifier {0:?}")]
    InvalidIdentifier(String),

    /// The service cannot run with the supplied configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ReplicationError {
    /// Wraps a database driver error.
    pub fn database(err: impl std::fmt::Display) -> Self {
        ReplicationError::Database(err.to_string())
    }

    /// Wraps a bus client error.
    pub fn bus(err: impl std::fmt::Display) -> Self {
        ReplicationError::Bus(err.to_string())
    }

    /// Builds a malformed-event error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        ReplicationError::MalformedEvent(reason.into())
    }

    /// Poison errors: the message can never succeed, so it is acknowledged
    /// and counted as failed instead of being redelivered forever.
    pub fn is_poison(&self) -> bool {
        matches!(
            self,
            ReplicationError::MalformedEvent(_)
                | ReplicationError::InvalidIdentifier(_)
                | ReplicationError::Integrity(_)
        )
    }

    /// Transient errors: the message is left unacknowledged and the
    /// dependency is given time to recover.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReplicationError::Database(_) | ReplicationError::Bus(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poison_classification_covers_unprocessable_variants() {
        assert!(ReplicationError::malformed("bad json").is_poison());
        assert!(ReplicationError::InvalidIdentifier("a;b".into()).is_poison());
        assert!(ReplicationError::Integrity("unique_violation".into()).is_poison());
        assert!(!ReplicationError::database("down").is_poison());
    }

    #[test]
    fn transient_classification_covers_infrastructure_variants() {
        assert!(ReplicationError::database("down").is_transient());
        assert!(ReplicationError::bus("broker unreachable").is_transient());
        assert!(!ReplicationError::malformed("bad json").is_transient());
    }

    #[test]
    fn conflict_is_neither_poison_nor_transient() {
        let err = ReplicationError::Conflict {
            table: "users".into(),
            key: "1".into(),
            existing: 3,
            incoming: 2,
        };
        assert!(!err.is_poison());
        assert!(!err.is_transient());
    }

    #[test]
    fn conflict_displays_versions() {
        let err = ReplicationError::Conflict {
            table: "users".into(),
            key: "7".into(),
            existing: 5,
            incoming: 4,
        };
        assert_eq!(
            format!("{}", err),
            "version conflict on users key 7: existing version 5, incoming version 4"
        );
    }
}
