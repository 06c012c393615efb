/// Log handlers - ingestion, lookup, search and stats
use actix_web::{web, HttpResponse};
use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{
    CreateLogRequest, CreateLogResponse, SearchQuery, SearchResponse, StatsResponse,
};
use crate::services::LogService;

/// Accept a log entry for asynchronous persistence.
///
/// The response carries no id: the entry is only on the broker at this point.
pub async fn create_log(
    service: web::Data<LogService>,
    req: web::Json<CreateLogRequest>,
) -> Result<HttpResponse> {
    let entry = req.into_inner().into_entry(Utc::now())?;
    let total_logged = service.create_log(entry).await?;

    Ok(HttpResponse::Created().json(CreateLogResponse {
        message: "Log saved".to_string(),
        id: None,
        total_logged,
    }))
}

pub async fn get_log(
    service: web::Data<LogService>,
    log_id: web::Path<String>,
) -> Result<HttpResponse> {
    let id: i64 = log_id
        .parse()
        .map_err(|_| AppError::Validation("Invalid ID format".to_string()))?;

    let entry = service
        .get_log(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Log {id} not found")))?;

    Ok(HttpResponse::Ok().json(entry))
}

pub async fn search_logs(
    service: web::Data<LogService>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let q = query.q.as_deref().unwrap_or_default();
    let data = service.search_logs(q).await?;

    Ok(HttpResponse::Ok().json(SearchResponse {
        count: data.len(),
        data,
    }))
}

pub async fn get_stats(service: web::Data<LogService>) -> Result<HttpResponse> {
    let total_logged = service.total_logged().await?;
    Ok(HttpResponse::Ok().json(StatsResponse { total_logged }))
}
