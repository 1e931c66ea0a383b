//! Per-IP evidence-coverage confidence.
//!
//! Confidence reflects how much of the expected evidence base is present and
//! fresh: indicator coverage and source coverage are blended, key gaps are
//! penalised, and the result is attenuated by how reliable the configured
//! sources are in the first place. Sources that have never been attempted
//! lower coverage but are not penalised.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use ip_store::{IpConfidenceRow, IpSourceHealthRow, SourceRegistryRow};
use signal_core::{clamp, Settings};

/// Indicators whose absence is penalised beyond plain coverage.
pub const KEY_INDICATORS: &[&str] = &["search_momentum", "video_momentum", "timing_window"];

pub const TOTAL_INDICATORS: i64 = 13;

fn availability_factor(level: &str) -> f64 {
    match level {
        "high" => 1.0,
        "medium" => 0.8,
        "low" => 0.5,
        _ => 0.8,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceOut {
    pub confidence_score: i64,
    pub confidence_band: String,
    pub active_indicators: i64,
    pub total_indicators: i64,
    pub active_sources: i64,
    pub expected_sources: i64,
    pub missing_sources: Vec<String>,
    pub missing_indicators: Vec<String>,
    pub last_calculated_at: Option<DateTime<Utc>>,
}

fn band_for(score: i64) -> &'static str {
    if score >= 80 {
        "high"
    } else if score >= 60 {
        "medium"
    } else if score >= 40 {
        "low"
    } else {
        "insufficient"
    }
}

#[derive(Clone)]
pub struct ConfidenceService {
    pool: SqlitePool,
    settings: Settings,
}

impl ConfidenceService {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self { pool, settings }
    }

    async fn exists(&self, sql: &str, ip_id: &str) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as(sql)
            .bind(ip_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Compute and store confidence for an IP.
    pub async fn compute_ip_confidence(&self, ip_id: &str) -> Result<ConfidenceOut> {
        let registries: Vec<SourceRegistryRow> = sqlx::query_as("SELECT * FROM source_registry")
            .fetch_all(&self.pool)
            .await?;
        let expected_sources = registries.len() as i64;

        let health: Vec<IpSourceHealthRow> =
            sqlx::query_as("SELECT * FROM ip_source_health WHERE ip_id = ?")
                .bind(ip_id)
                .fetch_all(&self.pool)
                .await?;

        let active_sources = health.iter().filter(|h| h.status == "ok").count() as i64;
        let attempted_sources = health.len() as i64;
        let missing_sources: Vec<String> = registries
            .iter()
            .map(|r| r.source_key.clone())
            .filter(|sk| {
                health
                    .iter()
                    .find(|h| &h.source_key == sk)
                    .map(|h| h.status == "down")
                    .unwrap_or(true)
            })
            .collect();

        let stored_inputs: Vec<(String,)> =
            sqlx::query_as("SELECT indicator_key FROM opportunity_input WHERE ip_id = ?")
                .bind(ip_id)
                .fetch_all(&self.pool)
                .await?;
        let stored_keys: Vec<&str> = stored_inputs.iter().map(|(k,)| k.as_str()).collect();

        let has_trends = self
            .exists("SELECT id FROM composite_daily WHERE ip_id = ? LIMIT 1", ip_id)
            .await?;
        let has_events = self
            .exists("SELECT id FROM ip_event WHERE ip_id = ? LIMIT 1", ip_id)
            .await?;
        let has_video = self
            .exists("SELECT id FROM video_metric WHERE ip_id = ? LIMIT 1", ip_id)
            .await?;
        let has_merch = self
            .exists("SELECT id FROM merch_product_count WHERE ip_id = ? LIMIT 1", ip_id)
            .await?;

        // Active = stored manual inputs plus LIVE indicators with data behind them.
        let mut active_indicators = stored_keys.len() as i64;
        if has_trends {
            active_indicators += 2; // search_momentum + cross_alias_consistency
        }
        if has_events {
            active_indicators += 1; // timing_window
        }
        if has_video {
            active_indicators += 1; // video_momentum
        }
        if has_merch && !stored_keys.contains(&"merch_pressure") {
            active_indicators += 1; // merch_pressure
        }

        let mut missing_indicators: Vec<String> = Vec::new();
        for key in KEY_INDICATORS {
            let covered = match *key {
                "search_momentum" => has_trends,
                "timing_window" => has_events,
                "video_momentum" => has_video,
                _ => false,
            };
            if !covered && !stored_keys.contains(key) {
                missing_indicators.push(key.to_string());
            }
        }

        let indicator_coverage = active_indicators as f64 / TOTAL_INDICATORS as f64;
        let source_coverage = if attempted_sources > 0 {
            let attempted_ok_ratio = active_sources as f64 / attempted_sources as f64;
            let configured_ratio = if expected_sources > 0 {
                attempted_sources as f64 / expected_sources as f64
            } else {
                0.0
            };
            attempted_ok_ratio * configured_ratio
        } else {
            0.0
        };

        let base = 100.0
            * (self.settings.confidence_indicator_weight * indicator_coverage
                + self.settings.confidence_source_weight * source_coverage);

        // Penalties apply only to key sources that were actually attempted.
        let mut penalty = 0.0;
        for reg in &registries {
            if !reg.is_key_source {
                continue;
            }
            let Some(h) = health.iter().find(|h| h.source_key == reg.source_key) else {
                continue;
            };
            match h.status.as_str() {
                "down" => penalty += self.settings.confidence_key_source_down_penalty,
                "warn" => penalty += self.settings.confidence_key_source_warn_penalty,
                _ => {}
            }
        }
        let key_ind_penalty = missing_indicators.len() as f64
            * self.settings.confidence_key_indicator_missing_penalty;
        penalty += key_ind_penalty.min(self.settings.confidence_key_indicator_penalty_cap);

        // Risk adjustment from source availability levels.
        let mut risk_sum = 0.0;
        let mut risk_weight = 0.0;
        for reg in &registries {
            risk_sum += reg.priority_weight * availability_factor(&reg.availability_level);
            risk_weight += reg.priority_weight;
        }
        let risk_adjustment = if risk_weight > 0.0 {
            risk_sum / risk_weight
        } else {
            1.0
        };

        // Penalties reduce confidence multiplicatively, capped at 80%.
        let penalty_fraction = (penalty / 100.0).min(0.8);
        let confidence_score =
            clamp(0.0, 100.0, base * risk_adjustment * (1.0 - penalty_fraction)) as i64;
        let band = band_for(confidence_score);

        tracing::debug!(
            ip_id,
            confidence_score,
            band,
            "confidence recomputed: {}/{} indicators, {}/{} sources",
            active_indicators,
            TOTAL_INDICATORS,
            active_sources,
            expected_sources
        );

        let now = Utc::now();
        let missing_sources_top: Vec<String> = missing_sources.into_iter().take(3).collect();
        let missing_indicators_top: Vec<String> = missing_indicators.into_iter().take(3).collect();

        sqlx::query(
            r#"
            INSERT INTO ip_confidence
                (ip_id, confidence_score, confidence_band, active_indicators, total_indicators,
                 active_sources, expected_sources, missing_sources_json, missing_indicators_json, last_calculated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ip_id) DO UPDATE SET
                confidence_score = excluded.confidence_score,
                confidence_band = excluded.confidence_band,
                active_indicators = excluded.active_indicators,
                total_indicators = excluded.total_indicators,
                active_sources = excluded.active_sources,
                expected_sources = excluded.expected_sources,
                missing_sources_json = excluded.missing_sources_json,
                missing_indicators_json = excluded.missing_indicators_json,
                last_calculated_at = excluded.last_calculated_at
            "#,
        )
        .bind(ip_id)
        .bind(confidence_score)
        .bind(band)
        .bind(active_indicators)
        .bind(TOTAL_INDICATORS)
        .bind(active_sources)
        .bind(expected_sources)
        .bind(serde_json::to_string(&missing_sources_top)?)
        .bind(serde_json::to_string(&missing_indicators_top)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ConfidenceOut {
            confidence_score,
            confidence_band: band.to_string(),
            active_indicators,
            total_indicators: TOTAL_INDICATORS,
            active_sources,
            expected_sources,
            missing_sources: missing_sources_top,
            missing_indicators: missing_indicators_top,
            last_calculated_at: Some(now),
        })
    }

    /// Stored confidence, computing fresh when absent.
    pub async fn get_ip_confidence(&self, ip_id: &str) -> Result<ConfidenceOut> {
        let row: Option<IpConfidenceRow> =
            sqlx::query_as("SELECT * FROM ip_confidence WHERE ip_id = ?")
                .bind(ip_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(ConfidenceOut {
                confidence_score: row.confidence_score,
                confidence_band: row.confidence_band,
                active_indicators: row.active_indicators,
                total_indicators: row.total_indicators,
                active_sources: row.active_sources,
                expected_sources: row.expected_sources,
                missing_sources: row
                    .missing_sources_json
                    .as_deref()
                    .and_then(|j| serde_json::from_str(j).ok())
                    .unwrap_or_default(),
                missing_indicators: row
                    .missing_indicators_json
                    .as_deref()
                    .and_then(|j| serde_json::from_str(j).ok())
                    .unwrap_or_default(),
                last_calculated_at: row.last_calculated_at,
            }),
            None => self.compute_ip_confidence(ip_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ip_store::{new_id, RadarDb};
    use signal_core::HealthStatus;

    use crate::service::HealthService;

    async fn seed_ip(pool: &SqlitePool) -> String {
        let ip_id = new_id();
        sqlx::query("INSERT INTO ip (id, name, created_at) VALUES (?, 'Test', ?)")
            .bind(&ip_id)
            .bind(Utc::now())
            .execute(pool)
            .await
            .unwrap();
        ip_id
    }

    #[test]
    fn key_indicator_penalty_is_capped() {
        // 3 missing key indicators at 10 each would be 30; the cap holds it there.
        let settings = Settings::default();
        let raw = 3.0 * settings.confidence_key_indicator_missing_penalty;
        assert_eq!(
            raw.min(settings.confidence_key_indicator_penalty_cap),
            30.0
        );
    }

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(band_for(80), "high");
        assert_eq!(band_for(79), "medium");
        assert_eq!(band_for(60), "medium");
        assert_eq!(band_for(59), "low");
        assert_eq!(band_for(40), "low");
        assert_eq!(band_for(39), "insufficient");
    }

    #[tokio::test]
    async fn adding_ok_source_never_decreases_confidence() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let health = HealthService::new(db.pool().clone(), Settings::default());
        let confidence = ConfidenceService::new(db.pool().clone(), Settings::default());
        let ip_id = seed_ip(db.pool()).await;

        health
            .upsert_ip_source_health(&ip_id, "search_trends", true, HealthStatus::Ok, None, 10)
            .await
            .unwrap();
        let before = confidence.compute_ip_confidence(&ip_id).await.unwrap();

        health
            .upsert_ip_source_health(&ip_id, "video", true, HealthStatus::Ok, None, 5)
            .await
            .unwrap();
        let after = confidence.compute_ip_confidence(&ip_id).await.unwrap();

        assert!(after.confidence_score >= before.confidence_score);
        assert_eq!(after.active_sources, before.active_sources + 1);
    }

    #[tokio::test]
    async fn unattempted_sources_are_not_penalised() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let confidence = ConfidenceService::new(db.pool().clone(), Settings::default());
        let ip_id = seed_ip(db.pool()).await;

        // No health rows at all: coverage is zero but no key-source penalty
        // applies, so the score reflects only the missing key indicators.
        let out = confidence.compute_ip_confidence(&ip_id).await.unwrap();
        assert_eq!(out.active_sources, 0);
        assert_eq!(out.expected_sources, 6);
        assert_eq!(out.confidence_band, "insufficient");
        assert_eq!(out.missing_indicators.len(), 3);
    }

    #[tokio::test]
    async fn confidence_row_is_upserted() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let confidence = ConfidenceService::new(db.pool().clone(), Settings::default());
        let ip_id = seed_ip(db.pool()).await;

        confidence.compute_ip_confidence(&ip_id).await.unwrap();
        confidence.compute_ip_confidence(&ip_id).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ip_confidence WHERE ip_id = ?")
            .bind(&ip_id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
