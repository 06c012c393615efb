use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use logpulse_service::cache::RedisLogCache;
use logpulse_service::db::PgLogRepository;
use logpulse_service::handlers;
use logpulse_service::kafka::{KafkaConsumerGroup, KafkaLogProducer, LogIndexConsumer};
use logpulse_service::services::{
    ElasticsearchLogIndex, LogService, RateLimiter, RedisTokenBucketStore, SystemClock,
};
use logpulse_service::Config;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,actix_web=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Starting logpulse-service v{}", env!("CARGO_PKG_VERSION"));

    // Durable store
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    let repository = Arc::new(PgLogRepository::new(pool));
    repository.ping().await.context("Postgres ping failed")?;
    info!("Postgres connection established");

    // Cache, counter and rate limiter buckets share one Redis connection
    let redis_client =
        redis::Client::open(config.redis.url.as_str()).context("Invalid Redis URL")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to Redis")?;
    let cache = Arc::new(RedisLogCache::new(
        redis_conn.clone(),
        Duration::from_secs(config.redis.entry_ttl_secs),
    ));
    cache.ping().await.context("Redis ping failed")?;
    info!("Redis connection established");

    let search_index = Arc::new(
        ElasticsearchLogIndex::connect(&config.elasticsearch.url, &config.elasticsearch.index)
            .await
            .context("Failed to connect to Elasticsearch")?,
    );

    let producer = Arc::new(
        KafkaLogProducer::new(&config.kafka).context("Failed to create Kafka producer")?,
    );
    producer
        .health_check()
        .await
        .context("Kafka brokers unreachable")?;
    info!("Kafka producer ready");

    let consumer_group =
        KafkaConsumerGroup::new(&config.kafka).context("Failed to create Kafka consumer")?;
    let index_consumer = Arc::new(LogIndexConsumer::new(
        repository.clone(),
        search_index.clone(),
        config.batch.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_task = tokio::spawn(consumer_group.run(index_consumer, shutdown_rx));

    let limiter = Arc::new(RateLimiter::new(
        Arc::new(RedisTokenBucketStore::new(redis_conn)),
        Arc::new(SystemClock),
        config.rate_limit.clone(),
    ));
    info!(
        enabled = config.rate_limit.enabled,
        capacity = config.rate_limit.capacity,
        rate = config.rate_limit.refill_rate,
        "Rate limiter configured"
    );

    let service = web::Data::new(LogService::new(
        producer.clone(),
        repository,
        cache,
        search_index,
    ));

    let bind_addr = (config.app.host.clone(), config.app.port);
    info!("HTTP server listening on {}:{}", bind_addr.0, bind_addr.1);

    // SIGINT/SIGTERM stop accepting connections and drain in-flight requests
    HttpServer::new(move || {
        let limiter = limiter.clone();
        App::new()
            .app_data(service.clone())
            .wrap(Logger::default())
            .configure(move |cfg| handlers::configure(cfg, limiter))
    })
    .shutdown_timeout(config.app.shutdown_grace_secs)
    .bind(bind_addr)?
    .run()
    .await?;

    info!("HTTP server stopped, stopping consumer group");
    let _ = shutdown_tx.send(true);
    if let Err(e) = consumer_task.await {
        error!("Consumer group task failed: {}", e);
    }

    if let Err(e) = producer.flush(Duration::from_secs(5)).await {
        error!("Kafka producer flush failed: {}", e);
    }

    info!("logpulse-service shut down");
    Ok(())
}
