use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::models::LogEntry;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Join(String),
}

/// Broker producer role.
///
/// Returns once the broker has acknowledged the write; it never waits for
/// downstream consumption.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogProducer: Send + Sync {
    async fn send_log(&self, entry: &LogEntry) -> Result<(), ProducerError>;
}

/// Kafka producer for ingested log entries
#[derive(Clone)]
pub struct KafkaLogProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaLogProducer {
    /// Configuration ensures:
    /// - `acks = all`: the strongest acknowledgment tier
    /// - `enable.idempotence = true`: retries do not duplicate within a session
    /// - `retries`: bounded internal retries before the send fails
    pub fn new(config: &KafkaConfig) -> Result<Self, ProducerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", config.producer_retries.to_string())
            .set("retry.backoff.ms", "100")
            .set("message.timeout.ms", "10000")
            .set("compression.type", "lz4")
            .create()?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            retries = config.producer_retries,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            timeout: Duration::from_secs(10),
        })
    }

    /// Fetch topic metadata; fails when the cluster is unreachable.
    pub async fn health_check(&self) -> Result<(), ProducerError> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        let timeout = self.timeout;

        // librdkafka performs the metadata fetch synchronously.
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(topic.as_str()), timeout)
                .map(|_| ())
        })
        .await
        .map_err(|e| ProducerError::Join(e.to_string()))??;

        Ok(())
    }

    /// Wait for in-flight deliveries before exit.
    pub async fn flush(&self, timeout: Duration) -> Result<(), ProducerError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| ProducerError::Join(e.to_string()))??;
        Ok(())
    }
}

#[async_trait]
impl LogProducer for KafkaLogProducer {
    async fn send_log(&self, entry: &LogEntry) -> Result<(), ProducerError> {
        let payload = serde_json::to_vec(entry)?;

        // service_name as key keeps each service's events on one partition
        let record = FutureRecord::to(&self.topic)
            .key(entry.partition_key())
            .payload(&payload);

        let (partition, offset) = self
            .producer
            .send(record, self.timeout)
            .await
            .map_err(|(err, _)| ProducerError::Kafka(err))?;

        debug!(
            topic = %self.topic,
            partition,
            offset,
            service = %entry.service_name,
            "Log entry published"
        );
        Ok(())
    }
}
