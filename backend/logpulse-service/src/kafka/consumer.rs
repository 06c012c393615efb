//! Indexing consumer: per-partition batches bounded by size and age.
//!
//! For each message the claim:
//! 1. decodes the entry (undecodable messages are marked and skipped),
//! 2. writes it to the durable store, keeping the stored copy with its id,
//! 3. marks the offset,
//! 4. appends it to the batch and flushes to the search index when full.
//!
//! A periodic timer flushes partial batches; the timer restarts after every
//! size-triggered flush so no entry waits longer than the flush interval.
//! Index failures drop the batch: the durable store is authoritative and
//! offsets are already marked.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::group::{
    cancelled, ClaimMessage, ClaimSession, ConsumerGroupError, ConsumerGroupHandler,
    PartitionClaim,
};
use crate::config::BatchConfig;
use crate::db::LogRepository;
use crate::error::degraded_continue;
use crate::metrics;
use crate::models::LogEntry;
use crate::services::search_index::LogSearchIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Interval,
    Shutdown,
    StreamClosed,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Interval => "interval",
            FlushTrigger::Shutdown => "shutdown",
            FlushTrigger::StreamClosed => "stream_closed",
        }
    }
}

/// Entries awaiting one bulk index call. Owned by a single partition claim.
#[derive(Debug)]
pub struct LogBatch {
    entries: Vec<LogEntry>,
    max_size: usize,
}

impl LogBatch {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: Vec::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_size
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Hand the entries over and leave the batch empty.
    pub fn take(&mut self) -> Vec<LogEntry> {
        std::mem::replace(&mut self.entries, Vec::with_capacity(self.max_size))
    }
}

pub struct LogIndexConsumer {
    repository: Arc<dyn LogRepository>,
    search_index: Arc<dyn LogSearchIndex>,
    batch: BatchConfig,
}

impl LogIndexConsumer {
    pub fn new(
        repository: Arc<dyn LogRepository>,
        search_index: Arc<dyn LogSearchIndex>,
        batch: BatchConfig,
    ) -> Self {
        Self {
            repository,
            search_index,
            batch,
        }
    }

    /// Decode and persist one message, appending it to `batch`.
    async fn handle_message(&self, message: &ClaimMessage, batch: &mut LogBatch) {
        let entry: LogEntry = match serde_json::from_slice(&message.payload) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Skipping undecodable message"
                );
                metrics::record_consumer_message("poison");
                return;
            }
        };

        match self.repository.create(&entry).await {
            Ok(stored) => {
                metrics::record_consumer_message("stored");
                batch.push(stored);
            }
            Err(e) => {
                // Still indexed so the event stays searchable.
                error!(
                    partition = message.partition,
                    offset = message.offset,
                    service = %entry.service_name,
                    error = %e,
                    "Failed to persist log entry"
                );
                metrics::record_consumer_message("store_failed");
                batch.push(entry);
            }
        }
    }

    /// Send the batch to the search index and clear it.
    pub async fn flush(&self, batch: &mut LogBatch, trigger: FlushTrigger) {
        if batch.is_empty() {
            return;
        }

        let entries = batch.take();
        let count = entries.len();

        match self.search_index.bulk_index(&entries).await {
            Ok(()) => {
                info!(count, trigger = trigger.as_str(), "Bulk indexed logs");
                metrics::record_batch_flush(trigger.as_str(), "ok");
            }
            Err(e) => {
                metrics::record_batch_flush(trigger.as_str(), "dropped");
                if let Err(fatal) = degraded_continue("search_index", "bulk_index", e) {
                    error!(count, error = %fatal, "Bulk index failed");
                }
            }
        }
    }
}

#[async_trait]
impl ConsumerGroupHandler for LogIndexConsumer {
    async fn setup(&self) -> Result<(), ConsumerGroupError> {
        debug!(
            max_size = self.batch.max_size,
            flush_interval_ms = self.batch.flush_interval_ms,
            "Consumer group session starting"
        );
        Ok(())
    }

    async fn consume_claim(
        &self,
        session: ClaimSession,
        mut claim: PartitionClaim,
    ) -> Result<(), ConsumerGroupError> {
        let mut cancel = session.cancellation();
        let mut batch = LogBatch::new(self.batch.max_size);
        let period = self.batch.flush_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            topic = %claim.topic(),
            partition = claim.partition(),
            "Partition claim consuming"
        );

        loop {
            tokio::select! {
                biased;

                // Once revoked, queued messages belong to the next owner.
                _ = cancelled(&mut cancel) => {
                    self.flush(&mut batch, FlushTrigger::Shutdown).await;
                    break;
                }
                message = claim.recv() => {
                    let Some(message) = message else {
                        self.flush(&mut batch, FlushTrigger::StreamClosed).await;
                        break;
                    };

                    self.handle_message(&message, &mut batch).await;
                    session.mark_message(&message);

                    if batch.is_full() {
                        self.flush(&mut batch, FlushTrigger::Size).await;
                        ticker.reset();
                    }
                }
                _ = ticker.tick() => {
                    self.flush(&mut batch, FlushTrigger::Interval).await;
                }
            }
        }

        info!(
            topic = %claim.topic(),
            partition = claim.partition(),
            "Partition claim finished"
        );
        Ok(())
    }
}
