/// Data model shared by the ingestion, consumer and read paths.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A single structured log event.
///
/// `id` and `created_at` are assigned by the durable store on the first
/// successful write; both are `None` while the entry is in flight on the
/// broker. Entries are never mutated after creation: the consumer replaces
/// an in-flight entry with the stored copy returned by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogEntry {
    #[serde(default)]
    pub id: Option<i64>,
    pub service_name: String,
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn new(
        service_name: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            service_name: service_name.into(),
            level: level.into(),
            message: message.into(),
            timestamp,
            created_at: None,
        }
    }

    /// Partition key used on the broker. Ordering holds only per service.
    pub fn partition_key(&self) -> &str {
        &self.service_name
    }
}

/// Ingestion request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLogRequest {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl CreateLogRequest {
    /// Validate the request and build the entry to publish.
    ///
    /// A missing timestamp, or one at or before the Unix epoch (the zero value
    /// most clients send for "unset"), is replaced with `now`.
    pub fn into_entry(self, now: DateTime<Utc>) -> Result<LogEntry> {
        if self.service_name.trim().is_empty() {
            return Err(AppError::Validation("service_name is required".into()));
        }
        if self.level.trim().is_empty() {
            return Err(AppError::Validation("level is required".into()));
        }
        if self.message.trim().is_empty() {
            return Err(AppError::Validation("message is required".into()));
        }

        let timestamp = match self.timestamp {
            Some(ts) if ts.timestamp_millis() > 0 => ts,
            _ => now,
        };

        Ok(LogEntry::new(
            self.service_name,
            self.level,
            self.message,
            timestamp,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLogResponse {
    pub message: String,
    /// Always `null` on the ingestion path: the identity is assigned later
    /// by the consumer's durable write.
    pub id: Option<i64>,
    pub total_logged: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub count: usize,
    pub data: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_logged: i64,
}
