//! Prometheus metrics for the ingestion pipeline

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static METRICS: Lazy<PipelineMetrics> = Lazy::new(|| {
    let metrics = PipelineMetrics::new();
    if let Err(e) = metrics.register(&REGISTRY) {
        tracing::warn!("Failed to register pipeline metrics: {}", e);
    }
    metrics
});

struct PipelineMetrics {
    ingested: IntCounter,
    ingest_failures: IntCounter,
    rate_limit_decisions: IntCounterVec,
    cache_lookups: IntCounterVec,
    consumer_messages: IntCounterVec,
    batch_flushes: IntCounterVec,
    degraded: IntCounterVec,
}

impl PipelineMetrics {
    fn new() -> Self {
        Self {
            ingested: IntCounter::new(
                "logpulse_ingested_total",
                "Log entries accepted by the ingestion endpoint",
            )
            .expect("valid metric definition"),
            ingest_failures: IntCounter::new(
                "logpulse_ingest_failures_total",
                "Log entries that failed to publish",
            )
            .expect("valid metric definition"),
            rate_limit_decisions: IntCounterVec::new(
                Opts::new(
                    "logpulse_rate_limit_decisions_total",
                    "Rate limiter decisions",
                ),
                &["decision"],
            )
            .expect("valid metric definition"),
            cache_lookups: IntCounterVec::new(
                Opts::new("logpulse_cache_lookups_total", "Cache-aside lookups"),
                &["outcome"],
            )
            .expect("valid metric definition"),
            consumer_messages: IntCounterVec::new(
                Opts::new(
                    "logpulse_consumer_messages_total",
                    "Messages handled by partition workers",
                ),
                &["outcome"],
            )
            .expect("valid metric definition"),
            batch_flushes: IntCounterVec::new(
                Opts::new(
                    "logpulse_batch_flushes_total",
                    "Search index bulk flushes",
                ),
                &["trigger", "outcome"],
            )
            .expect("valid metric definition"),
            degraded: IntCounterVec::new(
                Opts::new(
                    "logpulse_degraded_total",
                    "Dependency failures handled by continuing in degraded mode",
                ),
                &["component"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.ingested.clone()))?;
        registry.register(Box::new(self.ingest_failures.clone()))?;
        registry.register(Box::new(self.rate_limit_decisions.clone()))?;
        registry.register(Box::new(self.cache_lookups.clone()))?;
        registry.register(Box::new(self.consumer_messages.clone()))?;
        registry.register(Box::new(self.batch_flushes.clone()))?;
        registry.register(Box::new(self.degraded.clone()))?;
        Ok(())
    }
}

pub fn record_ingested() {
    METRICS.ingested.inc();
}

pub fn record_ingest_failure() {
    METRICS.ingest_failures.inc();
}

pub fn record_rate_limit(decision: &str) {
    METRICS
        .rate_limit_decisions
        .with_label_values(&[decision])
        .inc();
}

pub fn record_cache_lookup(outcome: &str) {
    METRICS.cache_lookups.with_label_values(&[outcome]).inc();
}

pub fn record_consumer_message(outcome: &str) {
    METRICS.consumer_messages.with_label_values(&[outcome]).inc();
}

pub fn record_batch_flush(trigger: &str, outcome: &str) {
    METRICS
        .batch_flushes
        .with_label_values(&[trigger, outcome])
        .inc();
}

pub fn record_degraded(component: &str) {
    METRICS.degraded.with_label_values(&[component]).inc();
}

/// `GET /metrics`
pub async fn metrics_handler() -> HttpResponse {
    Lazy::force(&METRICS);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_exported() {
        record_degraded("cache");
        record_batch_flush("size", "ok");

        let families = REGISTRY.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"logpulse_degraded_total"));
        assert!(names.contains(&"logpulse_batch_flushes_total"));
    }
}
