/// Log entry repository - the authoritative copy of every ingested entry
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::models::LogEntry;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable store role. The store assigns `id` and `created_at`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Persist an entry and return the stored copy with its identity.
    async fn create(&self, entry: &LogEntry) -> Result<LogEntry, RepositoryError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<LogEntry>, RepositoryError>;
}

/// Postgres-backed repository.
///
/// Expects the `log_entries` table to exist; schema management is handled
/// outside the service.
#[derive(Clone)]
pub struct PgLogRepository {
    pool: PgPool,
}

impl PgLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connectivity probe used at startup and by the readiness check
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LogRepository for PgLogRepository {
    async fn create(&self, entry: &LogEntry) -> Result<LogEntry, RepositoryError> {
        let stored = sqlx::query_as::<_, LogEntry>(
            "INSERT INTO log_entries (service_name, level, message, \"timestamp\", created_at) \
             VALUES ($1, $2, $3, $4, NOW()) \
             RETURNING id, service_name, level, message, \"timestamp\", created_at",
        )
        .bind(&entry.service_name)
        .bind(&entry.level)
        .bind(&entry.message)
        .bind(entry.timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<LogEntry>, RepositoryError> {
        let entry = sqlx::query_as::<_, LogEntry>(
            "SELECT id, service_name, level, message, \"timestamp\", created_at \
             FROM log_entries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }
}
