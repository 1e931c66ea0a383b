//! Trend series, latest signals, and collector health per IP.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ip_store::CompositeDailyRow;
use trend_engine::{compute_alerts, get_collector_health, Alert, CollectorHealth};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct TrendQuery {
    pub geo: Option<String>,
    pub timeframe: Option<String>,
    pub mode: Option<String>,
}

impl TrendQuery {
    fn geo(&self) -> &str {
        self.geo.as_deref().unwrap_or("TW")
    }

    fn timeframe(&self) -> &str {
        self.timeframe.as_deref().unwrap_or("12m")
    }
}

#[derive(Serialize)]
pub struct AliasPoint {
    pub date: NaiveDate,
    pub value: i64,
    pub alias: String,
    pub source: String,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum TrendPoints {
    ByAlias(Vec<AliasPoint>),
    Composite(Vec<CompositeDailyRow>),
}

#[derive(Serialize)]
pub struct TrendResponse {
    pub ip_id: String,
    pub geo: String,
    pub timeframe: String,
    pub mode: String,
    pub points: TrendPoints,
}

#[derive(Serialize)]
pub struct SignalsResponse {
    pub ip_id: String,
    pub geo: String,
    pub timeframe: String,
    pub wow_growth: Option<f64>,
    pub acceleration: Option<bool>,
    pub breakout_percentile: Option<f64>,
    pub signal_light: Option<String>,
    pub alerts: Vec<Alert>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/ip/:id/trend", get(get_trend))
        .route("/api/ip/:id/signals", get(get_signals))
        .route("/api/ip/:id/health", get(get_health))
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

async fn get_trend(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<ApiResponse<TrendResponse>>, AppError> {
    ensure_ip(&state, &id).await?;
    let geo = query.geo();
    let timeframe = query.timeframe();
    let mode = query.mode.as_deref().unwrap_or("composite");

    let points = if mode == "by_alias" {
        let rows: Vec<(NaiveDate, i64, String, String)> = sqlx::query_as(
            "SELECT ts.date, ts.value, a.alias, ts.source \
             FROM trend_sample ts JOIN ip_alias a ON ts.alias_id = a.id \
             WHERE ts.ip_id = ? AND ts.geo = ? AND ts.timeframe = ? AND a.enabled = 1 \
             ORDER BY ts.date",
        )
        .bind(&id)
        .bind(geo)
        .bind(timeframe)
        .fetch_all(&state.pool)
        .await?;

        TrendPoints::ByAlias(
            rows.into_iter()
                .map(|(date, value, alias, source)| AliasPoint {
                    date,
                    value,
                    alias,
                    source,
                })
                .collect(),
        )
    } else {
        let rows: Vec<CompositeDailyRow> = sqlx::query_as(
            "SELECT * FROM composite_daily \
             WHERE ip_id = ? AND geo = ? AND timeframe = ? ORDER BY date",
        )
        .bind(&id)
        .bind(geo)
        .bind(timeframe)
        .fetch_all(&state.pool)
        .await?;
        TrendPoints::Composite(rows)
    };

    Ok(Json(ApiResponse::success(TrendResponse {
        ip_id: id,
        geo: geo.to_string(),
        timeframe: timeframe.to_string(),
        mode: mode.to_string(),
        points,
    })))
}

async fn get_signals(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<ApiResponse<SignalsResponse>>, AppError> {
    ensure_ip(&state, &id).await?;
    let geo = query.geo();
    let timeframe = query.timeframe();

    let mut recent: Vec<CompositeDailyRow> = sqlx::query_as(
        "SELECT * FROM composite_daily \
         WHERE ip_id = ? AND geo = ? AND timeframe = ? \
         ORDER BY date DESC LIMIT 90",
    )
    .bind(&id)
    .bind(geo)
    .bind(timeframe)
    .fetch_all(&state.pool)
    .await?;
    recent.reverse();

    let alerts = compute_alerts(&recent, state.settings.signal_breakout_percentile);
    let latest = recent.last();

    Ok(Json(ApiResponse::success(SignalsResponse {
        ip_id: id,
        geo: geo.to_string(),
        timeframe: timeframe.to_string(),
        wow_growth: latest.and_then(|l| l.wow_growth),
        acceleration: latest.and_then(|l| l.acceleration),
        breakout_percentile: latest.and_then(|l| l.breakout_percentile),
        signal_light: latest.and_then(|l| l.signal_light.clone()),
        alerts,
    })))
}

async fn get_health(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<ApiResponse<CollectorHealth>>, AppError> {
    ensure_ip(&state, &id).await?;
    let health =
        get_collector_health(&state.pool, &id, query.geo(), query.timeframe()).await?;
    Ok(Json(ApiResponse::success(health)))
}
