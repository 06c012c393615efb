//! Kafka plumbing: the ingestion producer, the consumer-group runtime and
//! the per-partition batching consumer that feeds Postgres and Elasticsearch.

pub mod consumer;
pub mod group;
pub mod producer;

pub use consumer::{FlushTrigger, LogBatch, LogIndexConsumer};
pub use group::{
    ClaimCancellations, ClaimDispatcher, ClaimMessage, ClaimSession, ConsumerGroupError, ConsumerGroupHandler,
    KafkaConsumerGroup, OffsetStore, PartitionClaim,
};
pub use producer::{KafkaLogProducer, LogProducer, ProducerError};

#[cfg(test)]
pub use producer::MockLogProducer;
