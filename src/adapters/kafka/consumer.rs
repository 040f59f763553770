//! Kafka implementation of the message consumer.
//!
//! Auto-commit is disabled: an offset is committed only after the local
//! database transaction for its message has committed, which is the
//! "ack" of the abstract bus. A message that must be redelivered is
//! expressed by seeking the partition back to its offset, so the next
//! poll returns it again.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};
use std::time::Duration;

use crate::config::KafkaConfig;
use crate::domain::ReplicationError;
use crate::ports::{IncomingMessage, MessageConsumer};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka implementation of [`MessageConsumer`].
pub struct KafkaMessageConsumer {
    consumer: StreamConsumer,
}

impl KafkaMessageConsumer {
    /// Builds a consumer subscribed to the given topics.
    pub fn from_config(config: &KafkaConfig, topics: &[String]) -> Result<Self, ReplicationError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("client.id", &config.client_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .create()
            .map_err(ReplicationError::bus)?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(ReplicationError::bus)?;

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageConsumer for KafkaMessageConsumer {
    async fn poll(&self, timeout: Duration) -> Result<Option<IncomingMessage>, ReplicationError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(err)) => Err(ReplicationError::bus(err)),
            Ok(Ok(message)) => Ok(Some(IncomingMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message
                    .key()
                    .map(|key| String::from_utf8_lossy(key).into_owned()),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            })),
        }
    }

    async fn ack(&self, message: &IncomingMessage) -> Result<(), ReplicationError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(ReplicationError::bus)?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(ReplicationError::bus)
    }

    async fn rewind(&self, message: &IncomingMessage) -> Result<(), ReplicationError> {
        self.consumer
            .seek(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset),
                SEEK_TIMEOUT,
            )
            .map_err(ReplicationError::bus)
    }
}
