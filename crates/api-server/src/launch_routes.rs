//! Weekly launch-plan grid.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use launch_timing::{LaunchPlanResponse, LaunchService};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct GeoTfQuery {
    pub geo: Option<String>,
    pub timeframe: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/ip/:id/launch-plan", get(get_launch_plan))
}

async fn get_launch_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GeoTfQuery>,
) -> Result<Json<ApiResponse<LaunchPlanResponse>>, AppError> {
    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM ip WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("IP not found".to_string()));
    }

    let plan = LaunchService::new(state.pool.clone(), state.settings.clone())
        .compute_launch_plan(
            &id,
            query.geo.as_deref().unwrap_or("TW"),
            query.timeframe.as_deref().unwrap_or("12m"),
        )
        .await?;
    Ok(Json(ApiResponse::success(plan)))
}
