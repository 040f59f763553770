//! In-memory message bus for testing.
//!
//! Per-topic FIFO with committed-offset consumers: a message stays
//! visible to `poll` until it is acknowledged, which models at-least-once
//! redelivery without a broker. Each consumer tracks its own offsets, so
//! two contours reading the same bus are independent consumer groups.
//!
//! # Panics
//!
//! Methods may panic if internal locks are poisoned. This is acceptable
//! for test code but this adapter should NOT be used in production.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::ReplicationError;
use crate::ports::{IncomingMessage, MessageConsumer, MessageProducer};

#[derive(Debug, Clone)]
struct StoredMessage {
    key: Option<String>,
    payload: Vec<u8>,
}

type TopicLog = Arc<Mutex<HashMap<String, Vec<StoredMessage>>>>;

/// In-memory bus shared by both sides of a test.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    log: TopicLog,
}

impl InMemoryBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a consumer over the given topics with its own offsets.
    pub fn consumer(&self, topics: Vec<String>) -> InMemoryBusConsumer {
        InMemoryBusConsumer {
            log: Arc::clone(&self.log),
            topics,
            committed: Mutex::new(HashMap::new()),
        }
    }

    /// Number of messages ever published to a topic.
    pub fn message_count(&self, topic: &str) -> usize {
        self.log
            .lock()
            .expect("lock poisoned")
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Keys of the messages on a topic, in publish order.
    pub fn keys(&self, topic: &str) -> Vec<Option<String>> {
        self.log
            .lock()
            .expect("lock poisoned")
            .get(topic)
            .map_or_else(Vec::new, |messages| {
                messages.iter().map(|m| m.key.clone()).collect()
            })
    }
}

#[async_trait]
impl MessageProducer for InMemoryBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(), ReplicationError> {
        self.log
            .lock()
            .expect("lock poisoned")
            .entry(topic.to_string())
            .or_default()
            .push(StoredMessage {
                key: Some(key.to_string()),
                payload: payload.to_vec(),
            });
        Ok(())
    }
}

/// Consumer over an [`InMemoryBus`] with per-topic committed offsets.
pub struct InMemoryBusConsumer {
    log: TopicLog,
    topics: Vec<String>,
    committed: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl MessageConsumer for InMemoryBusConsumer {
    async fn poll(&self, _timeout: Duration) -> Result<Option<IncomingMessage>, ReplicationError> {
        let log = self.log.lock().expect("lock poisoned");
        let committed = self.committed.lock().expect("lock poisoned");

        for topic in &self.topics {
            let offset = committed.get(topic).copied().unwrap_or(0);
            if let Some(message) = log.get(topic).and_then(|messages| messages.get(offset)) {
                return Ok(Some(IncomingMessage {
                    topic: topic.clone(),
                    partition: 0,
                    offset: offset as i64,
                    key: message.key.clone(),
                    payload: message.payload.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn ack(&self, message: &IncomingMessage) -> Result<(), ReplicationError> {
        let mut committed = self.committed.lock().expect("lock poisoned");
        let entry = committed.entry(message.topic.clone()).or_insert(0);
        let next = (message.offset + 1) as usize;
        if next > *entry {
            *entry = next;
        }
        Ok(())
    }

    async fn rewind(&self, _message: &IncomingMessage) -> Result<(), ReplicationError> {
        // Un-acked messages are redelivered on the next poll already.
        Ok(())
    }
}
