/// Log service - ingestion, cache-aside reads and search
///
/// Writes never touch the durable store directly: an accepted entry is
/// published to the broker and becomes visible to reads once the consumer
/// has persisted it.
use std::sync::Arc;
use tracing::{debug, error};

use crate::cache::LogCache;
use crate::db::LogRepository;
use crate::error::{degraded_continue, AppError, Result};
use crate::kafka::LogProducer;
use crate::metrics;
use crate::models::LogEntry;
use crate::services::search_index::LogSearchIndex;

pub struct LogService {
    producer: Arc<dyn LogProducer>,
    repository: Arc<dyn LogRepository>,
    cache: Arc<dyn LogCache>,
    search_index: Arc<dyn LogSearchIndex>,
}

impl LogService {
    pub fn new(
        producer: Arc<dyn LogProducer>,
        repository: Arc<dyn LogRepository>,
        cache: Arc<dyn LogCache>,
        search_index: Arc<dyn LogSearchIndex>,
    ) -> Self {
        Self {
            producer,
            repository,
            cache,
            search_index,
        }
    }

    /// Publish a validated entry and bump the shared counter.
    ///
    /// Returns the counter value after this entry. A counter failure does not
    /// fail the request since the entry is already on the broker.
    pub async fn create_log(&self, entry: LogEntry) -> Result<i64> {
        if let Err(e) = self.producer.send_log(&entry).await {
            error!(service = %entry.service_name, error = %e, "Failed to publish log entry");
            metrics::record_ingest_failure();
            return Err(e.into());
        }
        metrics::record_ingested();

        match self.cache.increment_log_count().await {
            Ok(total) => Ok(total),
            Err(e) => {
                degraded_continue("cache", "increment_log_count", e)?;
                Ok(self.cache.log_count().await.unwrap_or(0))
            }
        }
    }

    /// Cache-aside lookup. `Ok(None)` means the durable store has no such entry.
    pub async fn get_log(&self, id: i64) -> Result<Option<LogEntry>> {
        match self.cache.get_log(id).await {
            Ok(Some(entry)) => {
                metrics::record_cache_lookup("hit");
                debug!(id, "Cache hit");
                return Ok(Some(entry));
            }
            Ok(None) => metrics::record_cache_lookup("miss"),
            Err(e) => {
                metrics::record_cache_lookup("error");
                degraded_continue("cache", "get_log", e)?;
            }
        }

        let Some(entry) = self.repository.get_by_id(id).await? else {
            return Ok(None);
        };

        if let Err(e) = self.cache.set_log(&entry).await {
            degraded_continue("cache", "set_log", e)?;
        }

        Ok(Some(entry))
    }

    pub async fn search_logs(&self, query: &str) -> Result<Vec<LogEntry>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation(
                "Query parameter 'q' is required".into(),
            ));
        }

        Ok(self.search_index.search(query).await?)
    }

    pub async fn total_logged(&self) -> Result<i64> {
        Ok(self.cache.log_count().await?)
    }

    /// Readiness probe: the shared counter store must answer.
    pub async fn check_ready(&self) -> Result<()> {
        self.cache.log_count().await?;
        Ok(())
    }
}
