//! Change applier port: the consumer's write path into the local
//! database.
//!
//! One `apply` call is one local transaction covering the ledger dedupe
//! check, the DML itself, and the ledger insert, so a change is either
//! fully applied and recorded or not applied at all. Implementations
//! must write through a connection that has declared the consumer session
//! identity, otherwise the capture triggers would echo every applied
//! change back onto the bus.

use async_trait::async_trait;

use crate::domain::{ChangeEvent, ConflictPolicy, ReplicationError};

/// Result of applying one remote change locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The change was written (deleting an absent row counts: the delete
    /// is idempotent and the outcome converges).
    Applied,
    /// The event id was already in the ledger; nothing was written.
    Duplicate,
    /// An existing row won the version conflict; nothing was written.
    ConflictSkipped,
}

/// Applies remote change events to the local database.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    /// Applies one event under the given conflict policy.
    ///
    /// Returns `Err(ReplicationError::Conflict { .. })` only under the
    /// `error` policy; the caller leaves such messages unacknowledged.
    async fn apply(
        &self,
        event: &ChangeEvent,
        policy: ConflictPolicy,
    ) -> Result<ApplyOutcome, ReplicationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_applier_object_safe(_: &dyn ChangeApplier) {}

    #[test]
    fn outcomes_are_comparable() {
        assert_ne!(ApplyOutcome::Applied, ApplyOutcome::Duplicate);
        assert_eq!(ApplyOutcome::ConflictSkipped, ApplyOutcome::ConflictSkipped);
    }
}
