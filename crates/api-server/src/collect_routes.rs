//! Manual collection and per-source syncs.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use sync_services::{
    CatalogueSync, CatalogueSyncResult, MerchSync, MerchSyncResult, VideoSync, VideoSyncResult,
};
use trend_engine::{CollectRunOutcome, TrendService};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct CollectRunRequest {
    pub ip_id: String,
    #[serde(default = "default_geo")]
    pub geo: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

fn default_geo() -> String {
    "TW".to_string()
}

fn default_timeframe() -> String {
    "12m".to_string()
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/collect/run", post(manual_collect))
        .route("/api/collect/catalogue-sync/:id", post(catalogue_sync_single))
        .route("/api/collect/catalogue-sync-all", post(catalogue_sync_all))
        .route("/api/collect/video-sync/:id", post(video_sync_single))
        .route("/api/collect/video-sync-all", post(video_sync_all))
        .route("/api/collect/merch-sync/:id", post(merch_sync_single))
        .route("/api/collect/merch-sync-all", post(merch_sync_all))
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

async fn manual_collect(
    State(state): State<AppState>,
    Json(body): Json<CollectRunRequest>,
) -> Result<Json<ApiResponse<CollectRunOutcome>>, AppError> {
    ensure_ip(&state, &body.ip_id).await?;
    let outcome = TrendService::new(state.pool.clone(), state.settings.clone())
        .run_collection(state.trends.as_ref(), &body.ip_id, &body.geo, &body.timeframe)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn catalogue_sync_single(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<CatalogueSyncResult>>, AppError> {
    ensure_ip(&state, &id).await?;
    let result = CatalogueSync::new(
        state.pool.clone(),
        state.settings.clone(),
        state.catalogue.clone(),
    )
    .sync_ip(&id)
    .await?;
    Ok(Json(ApiResponse::success(result)))
}

async fn catalogue_sync_all(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CatalogueSyncResult>>>, AppError> {
    let results = CatalogueSync::new(
        state.pool.clone(),
        state.settings.clone(),
        state.catalogue.clone(),
    )
    .sync_all()
    .await?;
    Ok(Json(ApiResponse::success(results)))
}

async fn video_sync_single(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<VideoSyncResult>>, AppError> {
    ensure_ip(&state, &id).await?;
    let result = VideoSync::new(state.pool.clone(), state.settings.clone(), state.video.clone())
        .sync_ip(&id)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

async fn video_sync_all(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<VideoSyncResult>>>, AppError> {
    let results = VideoSync::new(state.pool.clone(), state.settings.clone(), state.video.clone())
        .sync_all()
        .await?;
    Ok(Json(ApiResponse::success(results)))
}

async fn merch_sync_single(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MerchSyncResult>>, AppError> {
    ensure_ip(&state, &id).await?;
    let result = MerchSync::new(
        state.pool.clone(),
        state.settings.clone(),
        state.shopee.clone(),
        state.ruten.clone(),
    )
    .sync_ip(&id)
    .await?;
    Ok(Json(ApiResponse::success(result)))
}

async fn merch_sync_all(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<MerchSyncResult>>>, AppError> {
    let results = MerchSync::new(
        state.pool.clone(),
        state.settings.clone(),
        state.shopee.clone(),
        state.ruten.clone(),
    )
    .sync_all()
    .await?;
    Ok(Json(ApiResponse::success(results)))
}
