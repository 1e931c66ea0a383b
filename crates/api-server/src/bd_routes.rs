//! BD scoring, ranking, and pipeline CRUD.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use bd_allocation::{BdScoreResponse, BdService};
use ip_store::{new_id, IpPipelineRow, PIPELINE_STAGES};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct GeoTfQuery {
    pub geo: Option<String>,
    pub timeframe: Option<String>,
}

#[derive(Deserialize)]
pub struct PipelineCreate {
    #[serde(default = "default_stage")]
    pub stage: String,
    pub target_launch_date: Option<NaiveDate>,
    pub license_start_date: Option<NaiveDate>,
    pub license_end_date: Option<NaiveDate>,
    pub mg_amount_usd: Option<i64>,
    pub notes: Option<String>,
}

fn default_stage() -> String {
    "candidate".to_string()
}

#[derive(Deserialize)]
pub struct PipelineUpdate {
    pub stage: Option<String>,
    pub target_launch_date: Option<NaiveDate>,
    pub bd_start_date: Option<NaiveDate>,
    pub license_start_date: Option<NaiveDate>,
    pub license_end_date: Option<NaiveDate>,
    pub mg_amount_usd: Option<i64>,
    pub notes: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/ip/bd-ranking", get(get_bd_ranking))
        .route("/api/ip/:id/bd-score", get(get_bd_score))
        .route(
            "/api/ip/:id/pipeline",
            get(get_pipeline).post(create_pipeline).put(update_pipeline),
        )
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

async fn get_bd_ranking(
    State(state): State<AppState>,
    Query(query): Query<GeoTfQuery>,
) -> Result<Json<ApiResponse<Vec<BdScoreResponse>>>, AppError> {
    let ranking = BdService::new(state.pool.clone(), state.settings.clone())
        .rank_candidates(
            query.geo.as_deref().unwrap_or("TW"),
            query.timeframe.as_deref().unwrap_or("12m"),
        )
        .await?;
    Ok(Json(ApiResponse::success(ranking)))
}

async fn get_bd_score(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GeoTfQuery>,
) -> Result<Json<ApiResponse<BdScoreResponse>>, AppError> {
    ensure_ip(&state, &id).await?;
    let score = BdService::new(state.pool.clone(), state.settings.clone())
        .compute_bd_score(
            &id,
            query.geo.as_deref().unwrap_or("TW"),
            query.timeframe.as_deref().unwrap_or("12m"),
        )
        .await?;
    Ok(Json(ApiResponse::success(score)))
}

async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<IpPipelineRow>>, AppError> {
    let pipeline: Option<IpPipelineRow> =
        sqlx::query_as("SELECT * FROM ip_pipeline WHERE ip_id = ?")
            .bind(&id)
            .fetch_optional(&state.pool)
            .await?;
    let pipeline =
        pipeline.ok_or_else(|| AppError::NotFound("Pipeline not found for this IP".to_string()))?;
    Ok(Json(ApiResponse::success(pipeline)))
}

async fn create_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PipelineCreate>,
) -> Result<(StatusCode, Json<ApiResponse<IpPipelineRow>>), AppError> {
    ensure_ip(&state, &id).await?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM ip_pipeline WHERE ip_id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "Pipeline already exists for this IP".to_string(),
        ));
    }

    if !PIPELINE_STAGES.contains(&body.stage.as_str()) {
        return Err(AppError::Validation(format!(
            "Invalid stage. Must be one of: {}",
            PIPELINE_STAGES.join(", ")
        )));
    }

    let pipeline_id = new_id();
    sqlx::query(
        "INSERT INTO ip_pipeline \
         (id, ip_id, stage, target_launch_date, license_start_date, license_end_date, mg_amount_usd, notes, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&pipeline_id)
    .bind(&id)
    .bind(&body.stage)
    .bind(body.target_launch_date)
    .bind(body.license_start_date)
    .bind(body.license_end_date)
    .bind(body.mg_amount_usd)
    .bind(&body.notes)
    .bind(Utc::now())
    .execute(&state.pool)
    .await?;

    let pipeline: IpPipelineRow = sqlx::query_as("SELECT * FROM ip_pipeline WHERE id = ?")
        .bind(&pipeline_id)
        .fetch_one(&state.pool)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(pipeline))))
}

async fn update_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PipelineUpdate>,
) -> Result<Json<ApiResponse<IpPipelineRow>>, AppError> {
    let pipeline: Option<IpPipelineRow> =
        sqlx::query_as("SELECT * FROM ip_pipeline WHERE ip_id = ?")
            .bind(&id)
            .fetch_optional(&state.pool)
            .await?;
    let pipeline =
        pipeline.ok_or_else(|| AppError::NotFound("Pipeline not found for this IP".to_string()))?;

    if let Some(stage) = &body.stage {
        if !PIPELINE_STAGES.contains(&stage.as_str()) {
            return Err(AppError::Validation(format!(
                "Invalid stage. Must be one of: {}",
                PIPELINE_STAGES.join(", ")
            )));
        }
    }

    sqlx::query(
        "UPDATE ip_pipeline SET \
         stage = ?, target_launch_date = ?, bd_start_date = ?, \
         license_start_date = ?, license_end_date = ?, mg_amount_usd = ?, notes = ?, updated_at = ? \
         WHERE ip_id = ?",
    )
    .bind(body.stage.as_ref().unwrap_or(&pipeline.stage))
    .bind(body.target_launch_date.or(pipeline.target_launch_date))
    .bind(body.bd_start_date.or(pipeline.bd_start_date))
    .bind(body.license_start_date.or(pipeline.license_start_date))
    .bind(body.license_end_date.or(pipeline.license_end_date))
    .bind(body.mg_amount_usd.or(pipeline.mg_amount_usd))
    .bind(body.notes.as_ref().or(pipeline.notes.as_ref()))
    .bind(Utc::now())
    .bind(&id)
    .execute(&state.pool)
    .await?;

    let updated: IpPipelineRow = sqlx::query_as("SELECT * FROM ip_pipeline WHERE ip_id = ?")
        .bind(&id)
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
