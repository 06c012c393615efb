/// HTTP handlers and route table
pub mod health;
pub mod logs;

use actix_web::{error::JsonPayloadError, web, HttpRequest};
use std::sync::Arc;

use crate::error::AppError;
use crate::metrics::metrics_handler;
use crate::middleware::RateLimitMiddleware;
use crate::services::RateLimiter;

/// Malformed request bodies render through `AppError` like every other 400.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        AppError::Validation(format!("Invalid JSON format: {err}")).into()
    })
}

/// Register all routes. Only ingestion is rate limited.
pub fn configure(cfg: &mut web::ServiceConfig, limiter: Arc<RateLimiter>) {
    cfg.app_data(json_config())
        .route("/ping", web::get().to(health::ping))
        .route("/health/live", web::get().to(health::liveness))
        .route("/health/ready", web::get().to(health::readiness))
        .route("/metrics", web::get().to(metrics_handler))
        .service(
            web::scope("/api/v1")
                .service(
                    web::resource("/logs")
                        .wrap(RateLimitMiddleware::new(limiter))
                        .route(web::post().to(logs::create_log)),
                )
                .route("/logs/search", web::get().to(logs::search_logs))
                .route("/logs/{id}", web::get().to(logs::get_log))
                .route("/stats", web::get().to(logs::get_stats)),
        );
}
