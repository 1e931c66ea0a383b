//! HTTP surface: axum routes over the engine crates, one module per
//! resource group, all sharing `AppState`.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use catalogue_client::CatalogueClient;
use ip_store::RadarDb;
use merch_client::{RutenClient, ShopeeClient};
use signal_core::{CircuitBreaker, RateLimiter, RetryingCollector, Settings};
use trends_client::TrendsClient;
use video_client::VideoClient;

mod admin_routes;
mod bd_routes;
mod collect_routes;
mod ip_routes;
mod launch_routes;
mod opportunity_routes;
mod trend_routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub settings: Settings,
    /// Paced, retried, circuit-broken search-trends collector. The limiter
    /// and breaker behind it are the process-wide singletons for the source.
    pub trends: Arc<RetryingCollector<TrendsClient>>,
    pub catalogue: Arc<CatalogueClient>,
    pub video: Arc<VideoClient>,
    pub shopee: Arc<ShopeeClient>,
    pub ruten: Arc<RutenClient>,
}

impl AppState {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs_f64(
            settings.collector_min_interval_sec,
        )));
        let breaker = Arc::new(CircuitBreaker::new(
            settings.breaker_threshold,
            Duration::from_secs(settings.breaker_cooldown_sec),
        ));
        let trends = Arc::new(RetryingCollector::new(
            TrendsClient::new(settings.trends_api_key.clone()),
            limiter,
            breaker,
            settings.collector_max_retries,
        ));

        Self {
            pool,
            trends,
            catalogue: Arc::new(CatalogueClient::new()),
            video: Arc::new(VideoClient::new(settings.video_api_key.clone())),
            shopee: Arc::new(ShopeeClient::new()),
            ruten: Arc::new(RutenClient::new()),
            settings,
        }
    }
}

/// Uniform JSON envelope.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Validation(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, m),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m),
            AppError::Internal(e) => {
                tracing::error!("internal error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let body = ApiResponse::<serde_json::Value> {
            success: false,
            data: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.into())
    }
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .merge(ip_routes::routes())
        .merge(trend_routes::routes())
        .merge(opportunity_routes::routes())
        .merge(bd_routes::routes())
        .merge(launch_routes::routes())
        .merge(collect_routes::routes())
        .merge(admin_routes::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let db = RadarDb::new(&settings.database_url).await?;
    let state = AppState::new(db.pool().clone(), settings.clone());

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on {}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
