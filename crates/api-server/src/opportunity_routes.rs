//! Opportunity score and manual indicator inputs.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use indicator_engine::{is_valid_input_key, OpportunityResponse, OpportunityService};
use ip_store::new_id;

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct GeoTfQuery {
    pub geo: Option<String>,
    pub timeframe: Option<String>,
}

#[derive(Deserialize)]
pub struct OpportunityInputUpdate {
    pub inputs: HashMap<String, f64>,
}

#[derive(Serialize)]
pub struct OpportunityInputOut {
    pub indicator_key: String,
    pub value: f64,
    pub updated_at: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/api/ip/:id/opportunity",
        get(get_opportunity).put(update_inputs),
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

async fn get_opportunity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GeoTfQuery>,
) -> Result<Json<ApiResponse<OpportunityResponse>>, AppError> {
    ensure_ip(&state, &id).await?;
    let response = OpportunityService::new(state.pool.clone(), state.settings.clone())
        .get_opportunity(
            &id,
            query.geo.as_deref().unwrap_or("TW"),
            query.timeframe.as_deref().unwrap_or("12m"),
        )
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

async fn update_inputs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<OpportunityInputUpdate>,
) -> Result<Json<ApiResponse<Vec<OpportunityInputOut>>>, AppError> {
    ensure_ip(&state, &id).await?;

    for (key, value) in &body.inputs {
        if !is_valid_input_key(key) {
            return Err(AppError::Validation(format!("Invalid indicator key: {}", key)));
        }
        if !(0.0..=1.0).contains(value) {
            return Err(AppError::Validation(format!(
                "Value for {} must be between 0.0 and 1.0",
                key
            )));
        }
    }

    let mut results = Vec::with_capacity(body.inputs.len());
    for (key, value) in &body.inputs {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO opportunity_input (id, ip_id, indicator_key, value, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(ip_id, indicator_key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(new_id())
        .bind(&id)
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&state.pool)
        .await?;

        results.push(OpportunityInputOut {
            indicator_key: key.clone(),
            value: *value,
            updated_at: now,
        });
    }

    Ok(Json(ApiResponse::success(results)))
}
