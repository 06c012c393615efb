//! logpulse service
//!
//! Log ingestion over HTTP, buffered through Kafka, persisted to Postgres
//! and indexed into Elasticsearch by a consumer group. Redis holds entry
//! snapshots, the ingestion counter and the rate limiter's token buckets.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod kafka;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
