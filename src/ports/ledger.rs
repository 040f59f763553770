//! Processed-event ledger port.
//!
//! The ledger records every event id the local consumer has committed.
//! The transactional insert-and-check lives inside the applier's
//! transaction; this port covers the surrounding concerns: retention
//! pruning for the janitor and an existence probe for operational
//! tooling and tests. Retention must exceed the bus message retention,
//! or a late redelivery could slip past the dedupe check.

use async_trait::async_trait;

use crate::domain::{EventId, ReplicationError};

/// Port over the processed-event ledger.
#[async_trait]
pub trait ProcessedEventLedger: Send + Sync {
    /// Whether an event id has been committed by the local consumer.
    async fn contains(&self, event_id: &EventId) -> Result<bool, ReplicationError>;

    /// Deletes ledger entries older than the retention window, returning
    /// the number removed.
    async fn prune(&self, retention_days: u32) -> Result<u64, ReplicationError>;
}
