//! In-memory backends for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cache::{CacheError, LogCache};
use crate::db::{LogRepository, RepositoryError};
use crate::kafka::{ClaimMessage, ConsumerGroupError, LogProducer, OffsetStore, ProducerError};
use crate::models::LogEntry;
use crate::services::rate_limiter::{
    refill_and_take, BucketRequest, BucketState, Clock, RateLimitError, TokenBucketStore,
};
use crate::services::search_index::{LogSearchIndex, SearchIndexError};

pub fn entry(service: &str, message: &str) -> LogEntry {
    LogEntry::new(service, "INFO", message, chrono::Utc::now())
}

pub fn claim_message(partition: i32, offset: i64, entry: &LogEntry) -> ClaimMessage {
    ClaimMessage {
        topic: "logs".into(),
        partition,
        offset,
        payload: serde_json::to_vec(entry).unwrap(),
    }
}

/// Assigns sequential ids; can be switched to fail every write.
#[derive(Default)]
pub struct MemoryRepository {
    rows: Mutex<Vec<LogEntry>>,
    next_id: AtomicI64,
    failing: AtomicBool,
}

impl MemoryRepository {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<LogEntry> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogRepository for MemoryRepository {
    async fn create(&self, entry: &LogEntry) -> Result<LogEntry, RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut stored = entry.clone();
        stored.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        stored.created_at = Some(chrono::Utc::now());
        self.rows.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<LogEntry>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.id == Some(id))
            .cloned())
    }
}

/// Records every bulk call as one flush.
#[derive(Default)]
pub struct MemoryIndex {
    flushes: Mutex<Vec<Vec<LogEntry>>>,
    failing: AtomicBool,
}

impl MemoryIndex {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sizes of the successful flushes, in order.
    pub fn flush_sizes(&self) -> Vec<usize> {
        self.flushes.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn indexed(&self) -> Vec<LogEntry> {
        self.flushes.lock().unwrap().concat()
    }
}

#[async_trait]
impl LogSearchIndex for MemoryIndex {
    async fn bulk_index(&self, entries: &[LogEntry]) -> Result<(), SearchIndexError> {
        if entries.is_empty() {
            return Ok(());
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SearchIndexError::Rejected { status: 503 });
        }
        self.flushes.lock().unwrap().push(entries.to_vec());
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<LogEntry>, SearchIndexError> {
        let needle = query.to_lowercase();
        Ok(self
            .indexed()
            .into_iter()
            .filter(|e| {
                e.message.to_lowercase().contains(&needle)
                    || e.service_name.to_lowercase().contains(&needle)
                    || e.level.to_lowercase().contains(&needle)
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<i64, LogEntry>>,
    count: AtomicI64,
    writes: AtomicUsize,
}

impl MemoryCache {
    /// Number of entry snapshots written so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogCache for MemoryCache {
    async fn get_log(&self, id: i64) -> Result<Option<LogEntry>, CacheError> {
        Ok(self.entries.lock().unwrap().get(&id).cloned())
    }

    async fn set_log(&self, entry: &LogEntry) -> Result<(), CacheError> {
        let id = entry.id.ok_or(CacheError::MissingIdentity)?;
        self.entries.lock().unwrap().insert(id, entry.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn increment_log_count(&self) -> Result<i64, CacheError> {
        Ok(self.count.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn log_count(&self) -> Result<i64, CacheError> {
        Ok(self.count.load(Ordering::SeqCst))
    }
}

/// Collects published entries in send order.
#[derive(Default)]
pub struct MemoryProducer {
    sent: Mutex<Vec<LogEntry>>,
}

impl MemoryProducer {
    pub fn sent(&self) -> Vec<LogEntry> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogProducer for MemoryProducer {
    async fn send_log(&self, entry: &LogEntry) -> Result<(), ProducerError> {
        self.sent.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingOffsets {
    marks: Mutex<Vec<(i32, i64)>>,
}

impl RecordingOffsets {
    pub fn marked(&self) -> Vec<(i32, i64)> {
        self.marks.lock().unwrap().clone()
    }
}

impl OffsetStore for RecordingOffsets {
    fn mark(&self, _topic: &str, partition: i32, offset: i64) -> Result<(), ConsumerGroupError> {
        self.marks.lock().unwrap().push((partition, offset));
        Ok(())
    }
}

/// Clock advanced by hand.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn at(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Runs the token bucket in process with the same arithmetic as the script.
#[derive(Default)]
pub struct MemoryBucketStore {
    buckets: Mutex<HashMap<String, BucketState>>,
    failing: AtomicBool,
}

impl MemoryBucketStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn bucket(&self, key: &str) -> Option<BucketState> {
        self.buckets.lock().unwrap().get(key).copied()
    }
}

#[async_trait]
impl TokenBucketStore for MemoryBucketStore {
    async fn take(&self, key: &str, request: BucketRequest) -> Result<bool, RateLimitError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RateLimitError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))));
        }
        let mut buckets = self.buckets.lock().unwrap();
        let (allowed, state) = refill_and_take(buckets.get(key).copied(), &request);
        buckets.insert(key.to_string(), state);
        Ok(allowed)
    }
}
