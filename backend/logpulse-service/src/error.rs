/// Error types for logpulse-service
///
/// Backend-specific errors live next to their backends (`CacheError`,
/// `ProducerError`, ...) and convert into `AppError` at the service layer.
/// `AppError` renders as `{"error": ..., "code": ...}` over HTTP.
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::cache::CacheError;
use crate::db::RepositoryError;
use crate::kafka::ProducerError;
use crate::metrics;
use crate::services::search_index::SearchIndexError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Try again later.")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Search index error: {0}")]
    SearchIndex(String),

    #[error("Rate limiter store error: {0}")]
    RateLimiterStore(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// How a failing dependency call is handled by its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log, count, and carry on without the failed dependency.
    DegradedContinue,
    /// Surface to the caller (HTTP error, or process exit at startup).
    Fatal,
}

impl AppError {
    /// Cache, search-index and limiter-store outages never block the primary
    /// write or read path; everything else is surfaced.
    pub fn failure_policy(&self) -> FailurePolicy {
        match self {
            AppError::Cache(_) | AppError::SearchIndex(_) | AppError::RateLimiterStore(_) => {
                FailurePolicy::DegradedContinue
            }
            _ => FailurePolicy::Fatal,
        }
    }
}

/// The single place where a dependency failure may be swallowed.
///
/// A degraded-continue failure is logged at warn with
/// `policy = "degraded-continue"`, counted per component, and `Ok(())` is
/// returned. A fatal failure is handed back unchanged.
pub fn degraded_continue(
    component: &'static str,
    operation: &'static str,
    err: impl Into<AppError>,
) -> Result<()> {
    let err = err.into();
    match err.failure_policy() {
        FailurePolicy::DegradedContinue => {
            metrics::record_degraded(component);
            warn!(
                component,
                operation,
                policy = "degraded-continue",
                error = %err,
                "Dependency failure ignored"
            );
            Ok(())
        }
        FailurePolicy::Fatal => Err(err),
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = self.status_code();
        // Internal details stay in the logs.
        let message = match self {
            AppError::Validation(_) | AppError::NotFound(_) | AppError::RateLimited => {
                self.to_string()
            }
            _ => "Failed to process request".to_string(),
        };

        HttpResponse::build(code).json(ErrorResponse {
            error: message,
            code: code.as_u16(),
        })
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err.to_string())
    }
}

impl From<ProducerError> for AppError {
    fn from(err: ProducerError) -> Self {
        AppError::Kafka(err.to_string())
    }
}

impl From<SearchIndexError> for AppError {
    fn from(err: SearchIndexError) -> Self {
        AppError::SearchIndex(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("log 1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Kafka("broker down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn only_cache_and_index_failures_degrade() {
        assert_eq!(
            AppError::Cache("timeout".into()).failure_policy(),
            FailurePolicy::DegradedContinue
        );
        assert_eq!(
            AppError::SearchIndex("503".into()).failure_policy(),
            FailurePolicy::DegradedContinue
        );
        assert_eq!(
            AppError::Database("gone".into()).failure_policy(),
            FailurePolicy::Fatal
        );
        assert_eq!(
            AppError::Kafka("gone".into()).failure_policy(),
            FailurePolicy::Fatal
        );
        assert_eq!(
            AppError::RateLimiterStore("timeout".into()).failure_policy(),
            FailurePolicy::DegradedContinue
        );
    }

    #[test]
    fn degraded_failures_are_swallowed_and_fatal_ones_returned() {
        assert!(degraded_continue("cache", "get_log", AppError::Cache("timeout".into())).is_ok());
        assert!(degraded_continue(
            "rate_limiter",
            "take",
            AppError::RateLimiterStore("refused".into())
        )
        .is_ok());

        let fatal = degraded_continue("db", "get_by_id", AppError::Database("gone".into()));
        assert!(matches!(fatal, Err(AppError::Database(_))));
    }

    #[test]
    fn internal_errors_hide_details() {
        let resp = AppError::Database("password authentication failed".into()).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
