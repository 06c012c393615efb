/// Configuration management for logpulse-service
///
/// Loads configuration from environment variables with sensible defaults.
/// A `.env` file, when present, is loaded first by `main`.
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub batch: BatchConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Grace period for draining in-flight HTTP requests on shutdown
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Lifetime of cached entry snapshots
    pub entry_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub producer_retries: u32,
}

#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
}

/// Consumer batching: flush at `max_size` entries or every `flush_interval`.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_size: usize,
    pub flush_interval_ms: u64,
}

impl BatchConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            flush_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Max burst requests
    pub capacity: u32,
    /// Tokens per second refill rate
    pub refill_rate: f64,
    /// Inactivity expiry of a bucket in the shared store
    pub bucket_ttl_secs: u64,
    /// Redis operation timeout in milliseconds; a timeout fails open
    pub redis_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 100,
            refill_rate: 50.0,
            bucket_ttl_secs: 60,
            redis_timeout_ms: 100,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let rate_defaults = RateLimitConfig::default();
        let batch_defaults = BatchConfig::default();

        // Zero capacity or rate would deny everything; treat as unset.
        let capacity = env_or("RATE_LIMIT_CAPACITY", rate_defaults.capacity)?;
        let refill_rate = env_or("RATE_LIMIT_RATE", rate_defaults.refill_rate)?;

        Ok(Config {
            app: AppConfig {
                host: env_or("APP_HOST", "0.0.0.0".to_string())?,
                port: env_or("APP_PORT", 8080)?,
                shutdown_grace_secs: env_or("SHUTDOWN_GRACE_SECS", 5)?,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: env_or("REDIS_URL", "redis://127.0.0.1:6379".to_string())?,
                entry_ttl_secs: env_or("CACHE_ENTRY_TTL_SECS", 3600)?,
            },
            kafka: KafkaConfig {
                brokers: required("KAFKA_BROKERS")?,
                topic: env_or("KAFKA_TOPIC", "logs".to_string())?,
                group_id: env_or("KAFKA_GROUP_ID", "logpulse-indexer".to_string())?,
                producer_retries: env_or("KAFKA_PRODUCER_RETRIES", 5)?,
            },
            elasticsearch: ElasticsearchConfig {
                url: env_or("ELASTICSEARCH_URL", "http://127.0.0.1:9200".to_string())?,
                index: env_or("ELASTICSEARCH_INDEX", "logs".to_string())?,
            },
            batch: BatchConfig {
                max_size: env_or("BATCH_SIZE", batch_defaults.max_size)?.max(1),
                flush_interval_ms: env_or(
                    "BATCH_FLUSH_INTERVAL_MS",
                    batch_defaults.flush_interval_ms,
                )?
                .max(1),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("RATE_LIMIT_ENABLED", false)?,
                capacity: if capacity == 0 {
                    rate_defaults.capacity
                } else {
                    capacity
                },
                refill_rate: if refill_rate <= 0.0 {
                    rate_defaults.refill_rate
                } else {
                    refill_rate
                },
                bucket_ttl_secs: env_or("RATE_LIMIT_BUCKET_TTL_SECS", rate_defaults.bucket_ttl_secs)?,
                redis_timeout_ms: env_or(
                    "RATE_LIMIT_REDIS_TIMEOUT_MS",
                    rate_defaults.redis_timeout_ms,
                )?,
            },
        })
    }
}

fn required(key: &str) -> Result<String, AppError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!("{key} must be set"))),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {key}: {raw}"))),
        _ => Ok(default),
    }
}
