//! Distributed token-bucket rate limiter.
//!
//! Bucket state lives in Redis as a hash `{tokens, last_time}` per client
//! identity, so every instance shares one budget per client. Refill and
//! consume happen inside one Lua script; Redis runs scripts atomically, so
//! concurrent requests for the same key cannot both take the last token.
//!
//! Limiter failures never reject traffic: a store error or timeout lets the
//! request through and is reported as degraded.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::cache::keys;
use crate::config::RateLimitConfig;
use crate::error::{degraded_continue, AppError};
use crate::metrics;

/// KEYS[1] bucket key
/// ARGV: capacity, refill rate (tokens/s), now (ms), requested, ttl (s)
pub const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local requested = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local state = redis.call("HMGET", key, "tokens", "last_time")
local tokens = tonumber(state[1]) or capacity
local last_time = tonumber(state[2]) or now

local elapsed = math.max(0, now - last_time) / 1000
tokens = math.min(capacity, tokens + elapsed * rate)

local allowed = 0
if tokens >= requested then
    tokens = tokens - requested
    allowed = 1
end

redis.call("HSET", key, "tokens", tokens, "last_time", now)
redis.call("EXPIRE", key, ttl)
return allowed
"#;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("rate limit store timed out after {0}ms")]
    Timeout(u64),
}

/// Wall clock in Unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketRequest {
    pub capacity: u32,
    pub refill_rate: f64,
    pub now_ms: i64,
    pub requested: u32,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub tokens: f64,
    pub last_refill_ms: i64,
}

/// The script's arithmetic. A missing bucket starts full; clock skew
/// between instances never removes tokens.
pub fn refill_and_take(state: Option<BucketState>, request: &BucketRequest) -> (bool, BucketState) {
    let capacity = f64::from(request.capacity);
    let (tokens, last) = match state {
        Some(s) => (s.tokens, s.last_refill_ms),
        None => (capacity, request.now_ms),
    };

    let elapsed_secs = (request.now_ms - last).max(0) as f64 / 1000.0;
    let mut tokens = capacity.min(tokens + elapsed_secs * request.refill_rate);

    let requested = f64::from(request.requested);
    let allowed = tokens >= requested;
    if allowed {
        tokens -= requested;
    }

    (
        allowed,
        BucketState {
            tokens,
            last_refill_ms: request.now_ms,
        },
    )
}

/// Shared bucket storage with an atomic refill-then-consume.
#[async_trait]
pub trait TokenBucketStore: Send + Sync {
    /// Returns `true` when the requested tokens were taken.
    async fn take(&self, key: &str, request: BucketRequest) -> Result<bool, RateLimitError>;
}

pub struct RedisTokenBucketStore {
    conn: ConnectionManager,
    script: redis::Script,
}

impl RedisTokenBucketStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: redis::Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }
}

#[async_trait]
impl TokenBucketStore for RedisTokenBucketStore {
    async fn take(&self, key: &str, request: BucketRequest) -> Result<bool, RateLimitError> {
        let mut conn = self.conn.clone();
        let allowed: i64 = self
            .script
            .key(key)
            .arg(request.capacity)
            .arg(request.refill_rate)
            .arg(request.now_ms)
            .arg(request.requested)
            .arg(request.ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(allowed == 1)
    }
}

#[derive(Debug)]
pub enum RateLimitDecision {
    Allowed,
    Denied,
    /// Limiting is switched off.
    Bypassed,
    /// The store failed; the request goes through.
    FailedOpen(RateLimitError),
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RateLimitDecision::Denied)
    }

    fn label(&self) -> &'static str {
        match self {
            RateLimitDecision::Allowed => "allowed",
            RateLimitDecision::Denied => "denied",
            RateLimitDecision::Bypassed => "bypassed",
            RateLimitDecision::FailedOpen(_) => "failed_open",
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn TokenBucketStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn TokenBucketStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Take one token for `identity` (the client IP).
    pub async fn allow(&self, identity: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Bypassed;
        }

        let key = keys::rate_limit(identity);
        let request = BucketRequest {
            capacity: self.config.capacity,
            refill_rate: self.config.refill_rate,
            now_ms: self.clock.now_millis(),
            requested: 1,
            ttl_secs: self.config.bucket_ttl_secs,
        };

        let budget = Duration::from_millis(self.config.redis_timeout_ms);
        let decision = match timeout(budget, self.store.take(&key, request)).await {
            Ok(Ok(true)) => RateLimitDecision::Allowed,
            Ok(Ok(false)) => {
                debug!(identity, "Rate limit exceeded");
                RateLimitDecision::Denied
            }
            Ok(Err(e)) => fail_open(e),
            Err(_) => fail_open(RateLimitError::Timeout(self.config.redis_timeout_ms)),
        };

        metrics::record_rate_limit(decision.label());
        decision
    }
}

/// Store failures always let the request through.
fn fail_open(err: RateLimitError) -> RateLimitDecision {
    let reported = AppError::RateLimiterStore(err.to_string());
    if let Err(fatal) = degraded_continue("rate_limiter", "take", reported) {
        error!(error = %fatal, "Rate limiter store failure");
    }
    RateLimitDecision::FailedOpen(err)
}
