//! Message bus ports.
//!
//! The bus is the only channel between contours. Delivery is at-least-once:
//! the producer's publish is synchronous with respect to the drain
//! transaction, and the consumer acknowledges only after its local commit.
//! `rewind` expresses "do not acknowledge": the message must come back on
//! a later poll.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::ReplicationError;

/// A message read from the bus, with the coordinates needed to
/// acknowledge or redeliver it.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Publishes change events onto the bus.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Publishes one message and waits until the bus has durably accepted
    /// it, bounded by the adapter's produce timeout.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8])
        -> Result<(), ReplicationError>;
}

/// Consumes change events from the bus in partition order.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Polls for the next message; `None` when the timeout elapses with
    /// nothing to deliver.
    async fn poll(&self, timeout: Duration) -> Result<Option<IncomingMessage>, ReplicationError>;

    /// Acknowledges a message as fully processed.
    async fn ack(&self, message: &IncomingMessage) -> Result<(), ReplicationError>;

    /// Pushes a message back so the next poll on its partition delivers
    /// it again.
    async fn rewind(&self, message: &IncomingMessage) -> Result<(), ReplicationError>;
}
