//! Per-(ip, geo, timeframe) collector reliability summary over the last
//! 14 days of run-log rows.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use ip_store::{CollectorRunLogRow, CompositeDailyRow};

#[derive(Debug, Clone, Serialize)]
pub struct CollectorHealth {
    pub ip_id: String,
    pub geo: String,
    pub timeframe: String,
    pub source: String,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_run_status: Option<String>,
    pub success_rate_14d: Option<f64>,
    pub total_runs_14d: i64,
    pub error_breakdown: HashMap<String, i64>,
    pub anomaly_flags: Vec<String>,
}

pub async fn get_collector_health(
    pool: &SqlitePool,
    ip_id: &str,
    geo: &str,
    timeframe: &str,
) -> Result<CollectorHealth> {
    let cutoff = Utc::now() - Duration::days(14);

    let runs: Vec<CollectorRunLogRow> = sqlx::query_as(
        "SELECT * FROM collector_run_log \
         WHERE ip_id = ? AND geo = ? AND timeframe = ? AND started_at >= ? \
         ORDER BY started_at DESC",
    )
    .bind(ip_id)
    .bind(geo)
    .bind(timeframe)
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let total_runs = runs.len() as i64;
    let success_count = runs.iter().filter(|r| r.status == "success").count();
    let success_rate = if total_runs > 0 {
        Some((success_count as f64 / total_runs as f64 * 1000.0).round() / 10.0)
    } else {
        None
    };

    let last_run_status = runs.first().map(|r| r.status.clone());
    let last_success_time = runs
        .iter()
        .find(|r| r.status == "success")
        .map(|r| r.finished_at.unwrap_or(r.started_at));

    let mut error_breakdown: HashMap<String, i64> = HashMap::new();
    for r in &runs {
        if r.status == "fail" {
            if let Some(code) = &r.error_code {
                *error_breakdown.entry(code.clone()).or_insert(0) += 1;
            }
        }
    }

    let recent_trends: Vec<CompositeDailyRow> = sqlx::query_as(
        "SELECT * FROM composite_daily \
         WHERE ip_id = ? AND geo = ? AND timeframe = ? \
         ORDER BY date DESC LIMIT 14",
    )
    .bind(ip_id)
    .bind(geo)
    .bind(timeframe)
    .fetch_all(pool)
    .await?;

    let mut anomaly_flags = Vec::new();
    if !recent_trends.is_empty() && recent_trends.iter().all(|t| t.composite_value == 0.0) {
        anomaly_flags.push("all_zeros".to_string());
    }
    if total_runs > 0 && recent_trends.is_empty() {
        anomaly_flags.push("missing_points".to_string());
    }

    Ok(CollectorHealth {
        ip_id: ip_id.to_string(),
        geo: geo.to_string(),
        timeframe: timeframe.to_string(),
        source: "search_trends".to_string(),
        last_success_time,
        last_run_status,
        success_rate_14d: success_rate,
        total_runs_14d: total_runs,
        error_breakdown,
        anomaly_flags,
    })
}
