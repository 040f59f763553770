//! Ports: the seams between the replication core and its collaborators.
//!
//! Each port is an object-safe async trait; adapters provide the
//! PostgreSQL, Kafka, and in-memory implementations.

mod applier;
mod bus;
mod ledger;
mod outbox;

pub use applier::{ApplyOutcome, ChangeApplier};
pub use bus::{IncomingMessage, MessageConsumer, MessageProducer};
pub use ledger::ProcessedEventLedger;
pub use outbox::{OutboxEntry, OutboxLease, OutboxStore};
