pub mod log_service;
pub mod rate_limiter;
pub mod search_index;

pub use log_service::LogService;
pub use rate_limiter::{RateLimitDecision, RateLimiter, RedisTokenBucketStore, SystemClock};
pub use search_index::{ElasticsearchLogIndex, LogSearchIndex, SearchIndexError};
