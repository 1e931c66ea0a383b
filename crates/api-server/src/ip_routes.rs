//! IP, alias, and event CRUD.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ip_store::{new_id, AliasRow, IpEventRow, IpRow, EVENT_TYPES};
use trend_engine::TrendService;

use crate::{ApiResponse, AppError, AppState};

const GEOS: &[&str] = &["TW", "JP", "US", "WW"];
const TIMEFRAMES: &[&str] = &["90d", "12m", "5y"];

#[derive(Deserialize)]
pub struct AliasCreate {
    pub alias: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

#[derive(Deserialize)]
pub struct IpCreate {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<AliasCreate>,
}

#[derive(Deserialize)]
pub struct IpUpdate {
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct AliasUpdate {
    pub alias: Option<String>,
    pub locale: Option<String>,
    pub weight: Option<f64>,
    pub enabled: Option<bool>,
}

#[derive(Deserialize)]
pub struct EventCreate {
    pub event_type: String,
    pub title: String,
    pub event_date: NaiveDate,
    pub source: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Serialize)]
pub struct IpOut {
    #[serde(flatten)]
    pub ip: IpRow,
    pub aliases: Vec<AliasRow>,
}

#[derive(Serialize)]
pub struct IpListItem {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub aliases: Vec<AliasRow>,
    pub last_updated: Option<NaiveDate>,
    pub signal_light: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/ip", get(list_ips).post(create_ip))
        .route("/api/ip/:id", get(get_ip).put(update_ip).delete(delete_ip))
        .route("/api/ip/:id/aliases", post(add_alias))
        .route("/api/ip/alias/:alias_id", put(update_alias).delete(delete_alias))
        .route("/api/ip/alias/:alias_id/reset-weight", post(reset_alias_weight))
        .route("/api/ip/:id/events", get(list_events).post(create_event))
        .route("/api/ip/event/:event_id", delete(delete_event))
}

async fn load_ip(state: &AppState, ip_id: &str) -> Result<IpRow, AppError> {
    let ip: Option<IpRow> = sqlx::query_as("SELECT * FROM ip WHERE id = ?")
        .bind(ip_id)
        .fetch_optional(&state.pool)
        .await?;
    ip.ok_or_else(|| AppError::NotFound("IP not found".to_string()))
}

async fn load_aliases(state: &AppState, ip_id: &str) -> Result<Vec<AliasRow>, AppError> {
    Ok(sqlx::query_as("SELECT * FROM ip_alias WHERE ip_id = ?")
        .bind(ip_id)
        .fetch_all(&state.pool)
        .await?)
}

/// Rebuild composites for every (geo, timeframe) slice of an IP, used after
/// alias weight or enablement changes.
async fn reaggregate_all(state: &AppState, ip_id: &str) -> Result<(), AppError> {
    let service = TrendService::new(state.pool.clone(), state.settings.clone());
    for geo in GEOS {
        for tf in TIMEFRAMES {
            service.recompute_daily(ip_id, geo, tf).await?;
        }
    }
    Ok(())
}

async fn create_ip(
    State(state): State<AppState>,
    Json(body): Json<IpCreate>,
) -> Result<(StatusCode, Json<ApiResponse<IpOut>>), AppError> {
    let ip_id = new_id();
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    sqlx::query("INSERT INTO ip (id, name, created_at) VALUES (?, ?, ?)")
        .bind(&ip_id)
        .bind(&body.name)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    for alias in &body.aliases {
        sqlx::query(
            "INSERT INTO ip_alias (id, ip_id, alias, locale, weight, original_weight, enabled) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(&ip_id)
        .bind(&alias.alias)
        .bind(&alias.locale)
        .bind(alias.weight)
        .bind(alias.weight)
        .bind(alias.enabled)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let ip = load_ip(&state, &ip_id).await?;
    let aliases = load_aliases(&state, &ip_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(IpOut { ip, aliases })),
    ))
}

async fn list_ips(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<IpListItem>>>, AppError> {
    let ips: Vec<IpRow> = sqlx::query_as("SELECT * FROM ip ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await?;

    let mut items = Vec::with_capacity(ips.len());
    for ip in ips {
        let aliases = load_aliases(&state, &ip.id).await?;
        let latest: Option<(NaiveDate, Option<String>)> = sqlx::query_as(
            "SELECT date, signal_light FROM composite_daily \
             WHERE ip_id = ? ORDER BY date DESC LIMIT 1",
        )
        .bind(&ip.id)
        .fetch_optional(&state.pool)
        .await?;

        items.push(IpListItem {
            id: ip.id,
            name: ip.name,
            created_at: ip.created_at,
            aliases,
            last_updated: latest.as_ref().map(|(d, _)| *d),
            signal_light: latest.and_then(|(_, l)| l),
        });
    }
    Ok(Json(ApiResponse::success(items)))
}

async fn get_ip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<IpOut>>, AppError> {
    let ip = load_ip(&state, &id).await?;
    let aliases = load_aliases(&state, &id).await?;
    Ok(Json(ApiResponse::success(IpOut { ip, aliases })))
}

async fn update_ip(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<IpUpdate>,
) -> Result<Json<ApiResponse<IpOut>>, AppError> {
    load_ip(&state, &id).await?;
    if let Some(name) = &body.name {
        sqlx::query("UPDATE ip SET name = ? WHERE id = ?")
            .bind(name)
            .bind(&id)
            .execute(&state.pool)
            .await?;
    }
    let ip = load_ip(&state, &id).await?;
    let aliases = load_aliases(&state, &id).await?;
    Ok(Json(ApiResponse::success(IpOut { ip, aliases })))
}

async fn delete_ip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    load_ip(&state, &id).await?;
    sqlx::query("DELETE FROM ip WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_alias(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AliasCreate>,
) -> Result<(StatusCode, Json<ApiResponse<AliasRow>>), AppError> {
    load_ip(&state, &id).await?;

    let alias_id = new_id();
    sqlx::query(
        "INSERT INTO ip_alias (id, ip_id, alias, locale, weight, original_weight, enabled) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&alias_id)
    .bind(&id)
    .bind(&body.alias)
    .bind(&body.locale)
    .bind(body.weight)
    .bind(body.weight)
    .bind(body.enabled)
    .execute(&state.pool)
    .await?;

    let alias: AliasRow = sqlx::query_as("SELECT * FROM ip_alias WHERE id = ?")
        .bind(&alias_id)
        .fetch_one(&state.pool)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(alias))))
}

async fn update_alias(
    State(state): State<AppState>,
    Path(alias_id): Path<String>,
    Json(body): Json<AliasUpdate>,
) -> Result<Json<ApiResponse<AliasRow>>, AppError> {
    let alias: Option<AliasRow> = sqlx::query_as("SELECT * FROM ip_alias WHERE id = ?")
        .bind(&alias_id)
        .fetch_optional(&state.pool)
        .await?;
    let alias = alias.ok_or_else(|| AppError::NotFound("Alias not found".to_string()))?;

    let needs_reaggregate = body.weight.is_some() || body.enabled.is_some();

    sqlx::query(
        "UPDATE ip_alias SET alias = ?, locale = ?, weight = ?, enabled = ? WHERE id = ?",
    )
    .bind(body.alias.as_ref().unwrap_or(&alias.alias))
    .bind(body.locale.as_ref().unwrap_or(&alias.locale))
    .bind(body.weight.unwrap_or(alias.weight))
    .bind(body.enabled.unwrap_or(alias.enabled))
    .bind(&alias_id)
    .execute(&state.pool)
    .await?;

    // Composites must reflect weight and enablement changes.
    if needs_reaggregate {
        reaggregate_all(&state, &alias.ip_id).await?;
    }

    let updated: AliasRow = sqlx::query_as("SELECT * FROM ip_alias WHERE id = ?")
        .bind(&alias_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn reset_alias_weight(
    State(state): State<AppState>,
    Path(alias_id): Path<String>,
) -> Result<Json<ApiResponse<AliasRow>>, AppError> {
    let alias: Option<AliasRow> = sqlx::query_as("SELECT * FROM ip_alias WHERE id = ?")
        .bind(&alias_id)
        .fetch_optional(&state.pool)
        .await?;
    let alias = alias.ok_or_else(|| AppError::NotFound("Alias not found".to_string()))?;

    let Some(original) = alias.original_weight else {
        return Err(AppError::Validation(
            "No original weight stored for this alias".to_string(),
        ));
    };

    sqlx::query("UPDATE ip_alias SET weight = ? WHERE id = ?")
        .bind(original)
        .bind(&alias_id)
        .execute(&state.pool)
        .await?;

    reaggregate_all(&state, &alias.ip_id).await?;

    let updated: AliasRow = sqlx::query_as("SELECT * FROM ip_alias WHERE id = ?")
        .bind(&alias_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn delete_alias(
    State(state): State<AppState>,
    Path(alias_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let alias: Option<AliasRow> = sqlx::query_as("SELECT * FROM ip_alias WHERE id = ?")
        .bind(&alias_id)
        .fetch_optional(&state.pool)
        .await?;
    let alias = alias.ok_or_else(|| AppError::NotFound("Alias not found".to_string()))?;

    sqlx::query("DELETE FROM ip_alias WHERE id = ?")
        .bind(&alias_id)
        .execute(&state.pool)
        .await?;

    // The alias's samples cascade away; composites must follow.
    reaggregate_all(&state, &alias.ip_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<IpEventRow>>>, AppError> {
    load_ip(&state, &id).await?;
    let events: Vec<IpEventRow> =
        sqlx::query_as("SELECT * FROM ip_event WHERE ip_id = ? ORDER BY event_date")
            .bind(&id)
            .fetch_all(&state.pool)
            .await?;
    Ok(Json(ApiResponse::success(events)))
}

async fn create_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EventCreate>,
) -> Result<(StatusCode, Json<ApiResponse<IpEventRow>>), AppError> {
    load_ip(&state, &id).await?;

    if !EVENT_TYPES.contains(&body.event_type.as_str()) {
        return Err(AppError::Validation(format!(
            "Invalid event_type. Must be one of: {}",
            EVENT_TYPES.join(", ")
        )));
    }

    let event_id = new_id();
    sqlx::query(
        "INSERT INTO ip_event (id, ip_id, event_type, title, event_date, source, source_url, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event_id)
    .bind(&id)
    .bind(&body.event_type)
    .bind(&body.title)
    .bind(body.event_date)
    .bind(&body.source)
    .bind(&body.source_url)
    .bind(Utc::now())
    .execute(&state.pool)
    .await?;

    let event: IpEventRow = sqlx::query_as("SELECT * FROM ip_event WHERE id = ?")
        .bind(&event_id)
        .fetch_one(&state.pool)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(event))))
}

async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM ip_event WHERE id = ?")
        .bind(&event_id)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_none() {
        return Err(AppError::NotFound("Event not found".to_string()));
    }

    sqlx::query("DELETE FROM ip_event WHERE id = ?")
        .bind(&event_id)
        .execute(&state.pool)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
