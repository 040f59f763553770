//! Kafka implementation of the message producer.
//!
//! The producer is idempotent with `acks=all`, and every publish awaits
//! broker acknowledgement within a bounded timeout. The publisher's
//! drain transaction stays open across the await, which is what makes
//! publication synchronous with respect to the outbox lease.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

use crate::config::KafkaConfig;
use crate::domain::ReplicationError;
use crate::ports::MessageProducer;

/// Kafka implementation of [`MessageProducer`].
pub struct KafkaMessageProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaMessageProducer {
    /// Builds a producer from the bus configuration.
    pub fn from_config(config: &KafkaConfig) -> Result<Self, ReplicationError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", config.produce_timeout_ms.to_string())
            .create()
            .map_err(ReplicationError::bus)?;

        Ok(Self {
            producer,
            send_timeout: config.produce_timeout(),
        })
    }
}

#[async_trait]
impl MessageProducer for KafkaMessageProducer {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(), ReplicationError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map(|_| ())
            .map_err(|(err, _message)| ReplicationError::bus(err))
    }
}
