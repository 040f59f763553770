//! Kafka adapters for the bus ports.

mod consumer;
mod producer;

pub use consumer::KafkaMessageConsumer;
pub use producer::KafkaMessageProducer;
