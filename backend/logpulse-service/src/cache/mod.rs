//! Redis-backed cache for entry snapshots and the aggregate counter
//!
//! A lookup distinguishes a miss (`Ok(None)`) from a failure (`Err`), so the
//! read path can fall through to the durable store in both cases while still
//! reporting connectivity problems.

pub mod keys;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisError;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::LogEntry;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("entry has no identity and cannot be cached")]
    MissingIdentity,
}

/// Cache role: entry snapshots plus the shared ingestion counter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogCache: Send + Sync {
    async fn get_log(&self, id: i64) -> Result<Option<LogEntry>, CacheError>;

    /// Store a snapshot of a persisted entry with the configured lifetime.
    async fn set_log(&self, entry: &LogEntry) -> Result<(), CacheError>;

    /// Atomically increment the aggregate counter and return the new value.
    async fn increment_log_count(&self) -> Result<i64, CacheError>;

    async fn log_count(&self) -> Result<i64, CacheError>;
}

#[derive(Clone)]
pub struct RedisLogCache {
    conn: ConnectionManager,
    entry_ttl: Duration,
}

impl RedisLogCache {
    pub fn new(conn: ConnectionManager, entry_ttl: Duration) -> Self {
        Self { conn, entry_ttl }
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl LogCache for RedisLogCache {
    async fn get_log(&self, id: i64) -> Result<Option<LogEntry>, CacheError> {
        let key = keys::log_entry(id);
        let mut conn = self.conn.clone();

        let value: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        match value {
            Some(json) => {
                debug!("Cache hit for {}", key);
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                debug!("Cache miss for {}", key);
                Ok(None)
            }
        }
    }

    async fn set_log(&self, entry: &LogEntry) -> Result<(), CacheError> {
        let id = entry.id.ok_or(CacheError::MissingIdentity)?;
        let key = keys::log_entry(id);
        let json = serde_json::to_string(entry)?;
        let mut conn = self.conn.clone();

        redis::cmd("SETEX")
            .arg(&key)
            .arg(self.entry_ttl.as_secs().max(1))
            .arg(json)
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn increment_log_count(&self) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("INCR")
            .arg(keys::LOG_COUNT_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn log_count(&self) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let count: Option<i64> = redis::cmd("GET")
            .arg(keys::LOG_COUNT_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(count.unwrap_or(0))
    }
}
