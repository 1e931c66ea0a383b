//! Row models for every persisted table. Ids are text UUIDs; data dates are
//! `NaiveDate`, persisted timestamps are UTC wall-clock.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tracked intellectual property.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IpRow {
    pub id: String,
    pub name: String,
    pub catalogue_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// One searchable surface form of an IP in a given locale.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AliasRow {
    pub id: String,
    pub ip_id: String,
    pub alias: String,
    pub locale: String,
    pub weight: f64,
    pub original_weight: Option<f64>,
    pub enabled: bool,
}

/// Raw sample keyed by (ip, alias, geo, timeframe, date).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrendSampleRow {
    pub id: String,
    pub ip_id: String,
    pub alias_id: String,
    pub geo: String,
    pub timeframe: String,
    pub date: NaiveDate,
    pub value: i64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// Daily weighted aggregate with derived statistics. Missing statistics are
/// NULL, never zero.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CompositeDailyRow {
    pub id: String,
    pub ip_id: String,
    pub geo: String,
    pub timeframe: String,
    pub date: NaiveDate,
    pub composite_value: f64,
    pub ma7: Option<f64>,
    pub ma28: Option<f64>,
    pub wow_growth: Option<f64>,
    pub acceleration: Option<bool>,
    pub breakout_percentile: Option<f64>,
    pub signal_light: Option<String>,
}

/// Dated external milestone attached to an IP.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IpEventRow {
    pub id: String,
    pub ip_id: String,
    pub event_type: String,
    pub title: String,
    pub event_date: NaiveDate,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Human-supplied indicator value in [0, 1].
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OpportunityInputRow {
    pub id: String,
    pub ip_id: String,
    pub indicator_key: String,
    pub value: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SourceRegistryRow {
    pub source_key: String,
    pub availability_level: String,
    pub risk_type: String,
    pub is_key_source: bool,
    pub priority_weight: f64,
    pub notes: Option<String>,
}

/// One end-to-end collection attempt against a source.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SourceRunRow {
    pub id: String,
    pub source_key: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub duration_ms: Option<i64>,
    pub items_processed: i64,
    pub items_succeeded: i64,
    pub items_failed: i64,
    pub error_sample: Option<String>,
}

/// Per-(ip, source) freshness record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IpSourceHealthRow {
    pub id: String,
    pub ip_id: String,
    pub source_key: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub status: String,
    pub staleness_hours: Option<i64>,
    pub last_error: Option<String>,
    pub updated_items: Option<i64>,
}

/// Per-IP evidence-coverage summary.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IpConfidenceRow {
    pub ip_id: String,
    pub confidence_score: i64,
    pub confidence_band: String,
    pub active_indicators: i64,
    pub total_indicators: i64,
    pub active_sources: i64,
    pub expected_sources: i64,
    pub missing_sources_json: Option<String>,
    pub missing_indicators_json: Option<String>,
    pub last_calculated_at: Option<DateTime<Utc>>,
}

/// One alias fetch attempt within a collection run.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CollectorRunLogRow {
    pub id: String,
    pub source: String,
    pub ip_id: String,
    pub geo: String,
    pub timeframe: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub http_code: Option<i64>,
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub duration_ms: Option<i64>,
}

/// BD-stage state per IP; `bd_score`/`bd_decision` are cached by the scorer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IpPipelineRow {
    pub id: String,
    pub ip_id: String,
    pub stage: String,
    pub target_launch_date: Option<NaiveDate>,
    pub bd_start_date: Option<NaiveDate>,
    pub license_start_date: Option<NaiveDate>,
    pub license_end_date: Option<NaiveDate>,
    pub mg_amount_usd: Option<i64>,
    pub notes: Option<String>,
    pub bd_score: Option<f64>,
    pub bd_decision: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VideoMetricRow {
    pub id: String,
    pub ip_id: String,
    pub video_id: String,
    pub title: String,
    pub channel_title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MerchProductCountRow {
    pub id: String,
    pub ip_id: String,
    pub platform: String,
    pub query_term: String,
    pub product_count: i64,
    pub recorded_at: DateTime<Utc>,
}

pub const EVENT_TYPES: &[&str] = &[
    "anime_air",
    "movie_release",
    "game_release",
    "anniversary",
    "other",
];

pub const PIPELINE_STAGES: &[&str] = &[
    "candidate",
    "negotiating",
    "secured",
    "launched",
    "archived",
];
