//! Redis key layout
//!
//! - `log:{id}` → JSON snapshot of a stored entry
//! - `stats:log_count` → aggregate ingestion counter
//! - `ratelimit:{identity}` → token bucket hash (`tokens`, `last_time`)

pub const LOG_COUNT_KEY: &str = "stats:log_count";

pub fn log_entry(id: i64) -> String {
    format!("log:{}", id)
}

pub fn rate_limit(identity: &str) -> String {
    format!("ratelimit:{}", identity)
}
