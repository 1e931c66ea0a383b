//! Operator views: source health, coverage matrix, run history, registry,
//! and confidence reads/recomputes.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use ip_store::{SourceRegistryRow, SourceRunRow};
use source_health::{
    ConfidenceOut, ConfidenceService, CoverageMatrixRow, HealthService, SourceHealthSummary,
};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct MatrixQuery {
    pub limit: Option<i64>,
    pub only_issues: Option<bool>,
}

#[derive(Deserialize)]
pub struct RunsQuery {
    pub source_key: Option<String>,
    pub limit: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/data-health/sources", get(source_health))
        .route("/api/admin/data-health/matrix", get(coverage_matrix))
        .route("/api/admin/data-health/runs", get(recent_runs))
        .route("/api/admin/data-health/registry", get(registry))
        .route("/api/admin/confidence/:id", get(get_confidence))
        .route("/api/admin/confidence/:id/recalculate", post(recalculate_confidence))
}

async fn ensure_ip(state: &AppState, ip_id: &str) -> Result<(), AppError> {
    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM ip WHERE id = ?")
        .bind(ip_id)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("IP not found".to_string()));
    }
    Ok(())
}

async fn source_health(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<SourceHealthSummary>>>, AppError> {
    let list = HealthService::new(state.pool.clone(), state.settings.clone())
        .source_health_list()
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

async fn coverage_matrix(
    State(state): State<AppState>,
    Query(query): Query<MatrixQuery>,
) -> Result<Json<ApiResponse<Vec<CoverageMatrixRow>>>, AppError> {
    let matrix = HealthService::new(state.pool.clone(), state.settings.clone())
        .coverage_matrix(query.limit.unwrap_or(50), query.only_issues.unwrap_or(false))
        .await?;
    Ok(Json(ApiResponse::success(matrix)))
}

async fn recent_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<SourceRunRow>>>, AppError> {
    let runs = HealthService::new(state.pool.clone(), state.settings.clone())
        .recent_runs(query.source_key.as_deref(), query.limit.unwrap_or(50))
        .await?;
    Ok(Json(ApiResponse::success(runs)))
}

async fn registry(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<SourceRegistryRow>>>, AppError> {
    let rows = HealthService::new(state.pool.clone(), state.settings.clone())
        .registry()
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

async fn get_confidence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ConfidenceOut>>, AppError> {
    ensure_ip(&state, &id).await?;
    let confidence = ConfidenceService::new(state.pool.clone(), state.settings.clone())
        .get_ip_confidence(&id)
        .await?;
    Ok(Json(ApiResponse::success(confidence)))
}

async fn recalculate_confidence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ConfidenceOut>>, AppError> {
    ensure_ip(&state, &id).await?;
    let confidence = ConfidenceService::new(state.pool.clone(), state.settings.clone())
        .compute_ip_confidence(&id)
        .await?;
    Ok(Json(ApiResponse::success(confidence)))
}
