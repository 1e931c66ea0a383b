//! Indicator assembly and the opportunity response.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use ip_store::{AliasRow, CompositeDailyRow, IpEventRow};
use signal_core::Settings;
use source_health::{ConfidenceOut, ConfidenceService};

use crate::indicators::{
    compute_search_momentum, compute_timing_window, manual_score, IndicatorResult,
    IndicatorStatus, INDICATOR_DEFS,
};
use crate::scorer::{
    compute_coverage, compute_opportunity_score, generate_explanations,
};

#[derive(Debug, Clone, Serialize)]
pub struct OpportunityResponse {
    pub ip_id: String,
    pub geo: String,
    pub timeframe: String,
    pub opportunity_score: f64,
    pub opportunity_light: String,
    pub base_score: f64,
    pub risk_multiplier: f64,
    pub timing_multiplier: f64,
    pub demand_score: f64,
    pub diffusion_score: f64,
    pub fit_score: f64,
    pub supply_risk: f64,
    pub gatekeeper_risk: f64,
    pub timing_score: f64,
    pub coverage_ratio: f64,
    pub explanations: Vec<String>,
    pub indicators: Vec<IndicatorResult>,
    pub confidence: Option<ConfidenceOut>,
}

#[derive(Clone)]
pub struct OpportunityService {
    pool: SqlitePool,
    settings: Settings,
}

impl OpportunityService {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self { pool, settings }
    }

    /// Rising-alias fraction over the last 14 days: of enabled aliases with
    /// at least 10 samples and a mean value of at least 5, the share whose
    /// recent-7-day mean strictly exceeds their prior-7-day mean.
    async fn compute_cross_alias_consistency(
        &self,
        ip_id: &str,
        geo: &str,
        timeframe: &str,
        today: NaiveDate,
    ) -> Result<IndicatorResult> {
        let aliases: Vec<AliasRow> =
            sqlx::query_as("SELECT * FROM ip_alias WHERE ip_id = ? AND enabled = 1")
                .bind(ip_id)
                .fetch_all(&self.pool)
                .await?;

        let missing = |reason: &str| IndicatorResult {
            key: "cross_alias_consistency".to_string(),
            label: "Cross-alias Consistency".to_string(),
            dimension: "diffusion".to_string(),
            status: IndicatorStatus::Missing,
            score: 50.0,
            raw: None,
            debug: vec![reason.to_string()],
        };

        if aliases.is_empty() {
            return Ok(missing("No enabled aliases"));
        }

        let cutoff = today - Duration::days(14);
        let midpoint = today - Duration::days(7);
        let mut rising = 0usize;
        let mut total = 0usize;

        for alias in &aliases {
            let points: Vec<(NaiveDate, i64)> = sqlx::query_as(
                "SELECT date, value FROM trend_sample \
                 WHERE ip_id = ? AND alias_id = ? AND geo = ? AND timeframe = ? AND date >= ? \
                 ORDER BY date",
            )
            .bind(ip_id)
            .bind(&alias.id)
            .bind(geo)
            .bind(timeframe)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

            if points.len() < 10 {
                continue;
            }

            let prior: Vec<f64> = points
                .iter()
                .filter(|(d, _)| *d < midpoint)
                .map(|(_, v)| *v as f64)
                .collect();
            let recent: Vec<f64> = points
                .iter()
                .filter(|(d, _)| *d >= midpoint)
                .map(|(_, v)| *v as f64)
                .collect();
            if prior.is_empty() || recent.is_empty() {
                continue;
            }

            let overall_avg =
                points.iter().map(|(_, v)| *v as f64).sum::<f64>() / points.len() as f64;
            if overall_avg < 5.0 {
                continue;
            }

            total += 1;
            let prior_avg = prior.iter().sum::<f64>() / prior.len() as f64;
            let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
            if recent_avg > prior_avg {
                rising += 1;
            }
        }

        if total == 0 {
            return Ok(missing("No alias data qualifies (min 10 points, avg >= 5)"));
        }

        let score = rising as f64 / total as f64 * 100.0;
        Ok(IndicatorResult {
            key: "cross_alias_consistency".to_string(),
            label: "Cross-alias Consistency".to_string(),
            dimension: "diffusion".to_string(),
            status: IndicatorStatus::Live,
            score: (score * 10.0).round() / 10.0,
            raw: Some(serde_json::json!({"rising": rising, "total": total})),
            debug: vec![format!("{}/{} aliases rising in last 14d", rising, total)],
        })
    }

    /// Assemble all 13 indicators and fuse them into the opportunity score.
    pub async fn get_opportunity(
        &self,
        ip_id: &str,
        geo: &str,
        timeframe: &str,
    ) -> Result<OpportunityResponse> {
        let today = Utc::now().date_naive();

        let latest: Option<CompositeDailyRow> = sqlx::query_as(
            "SELECT * FROM composite_daily \
             WHERE ip_id = ? AND geo = ? AND timeframe = ? \
             ORDER BY date DESC LIMIT 1",
        )
        .bind(ip_id)
        .bind(geo)
        .bind(timeframe)
        .fetch_optional(&self.pool)
        .await?;

        let stored: Vec<(String, f64)> =
            sqlx::query_as("SELECT indicator_key, value FROM opportunity_input WHERE ip_id = ?")
                .bind(ip_id)
                .fetch_all(&self.pool)
                .await?;
        let inputs: HashMap<String, f64> = stored.into_iter().collect();

        let events: Vec<IpEventRow> =
            sqlx::query_as("SELECT * FROM ip_event WHERE ip_id = ? ORDER BY event_date")
                .bind(ip_id)
                .fetch_all(&self.pool)
                .await?;

        let mut indicators: Vec<IndicatorResult> = Vec::with_capacity(INDICATOR_DEFS.len());
        for (key, label, dimension, live) in INDICATOR_DEFS {
            let indicator = match (*key, *live) {
                ("search_momentum", _) => compute_search_momentum(latest.as_ref()),
                ("cross_alias_consistency", _) => {
                    self.compute_cross_alias_consistency(ip_id, geo, timeframe, today)
                        .await?
                }
                ("timing_window", _) => compute_timing_window(
                    &events,
                    latest.as_ref(),
                    inputs.get("timing_window_override").copied(),
                    self.settings.signal_lead_time_weeks,
                    today,
                ),
                _ => manual_score(key, label, dimension, &inputs),
            };
            indicators.push(indicator);
        }

        let breakdown = compute_opportunity_score(&indicators, &self.settings);
        let coverage = compute_coverage(&indicators);
        let explanations =
            generate_explanations(&indicators, &breakdown.dimensions, &self.settings);

        let confidence = ConfidenceService::new(self.pool.clone(), self.settings.clone())
            .get_ip_confidence(ip_id)
            .await
            .ok();

        Ok(OpportunityResponse {
            ip_id: ip_id.to_string(),
            geo: geo.to_string(),
            timeframe: timeframe.to_string(),
            opportunity_score: breakdown.score,
            opportunity_light: breakdown.light,
            base_score: breakdown.base,
            risk_multiplier: breakdown.risk_multiplier,
            timing_multiplier: breakdown.timing_multiplier,
            demand_score: breakdown.dimensions.demand,
            diffusion_score: breakdown.dimensions.diffusion,
            fit_score: breakdown.dimensions.fit,
            supply_risk: breakdown.dimensions.supply,
            gatekeeper_risk: breakdown.dimensions.gatekeeper,
            timing_score: breakdown.dimensions.timing,
            coverage_ratio: coverage,
            explanations,
            indicators,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ip_store::{new_id, RadarDb};

    async fn seed_ip_with_alias(pool: &SqlitePool) -> (String, String) {
        let ip_id = new_id();
        sqlx::query("INSERT INTO ip (id, name, created_at) VALUES (?, 'Test', ?)")
            .bind(&ip_id)
            .bind(Utc::now())
            .execute(pool)
            .await
            .unwrap();
        let alias_id = new_id();
        sqlx::query(
            "INSERT INTO ip_alias (id, ip_id, alias, locale, weight, enabled) VALUES (?, ?, 'test', 'en', 1.0, 1)",
        )
        .bind(&alias_id)
        .bind(&ip_id)
        .execute(pool)
        .await
        .unwrap();
        (ip_id, alias_id)
    }

    async fn insert_samples(pool: &SqlitePool, ip_id: &str, alias_id: &str, values: &[i64]) {
        let today = Utc::now().date_naive();
        for (i, value) in values.iter().enumerate() {
            let date = today - Duration::days(values.len() as i64 - 1 - i as i64);
            sqlx::query(
                "INSERT INTO trend_sample (id, ip_id, alias_id, geo, timeframe, date, value, source, fetched_at) \
                 VALUES (?, ?, ?, 'TW', '12m', ?, ?, 'search_trends', ?)",
            )
            .bind(new_id())
            .bind(ip_id)
            .bind(alias_id)
            .bind(date)
            .bind(value)
            .bind(Utc::now())
            .execute(pool)
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn all_thirteen_indicators_are_present() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = OpportunityService::new(db.pool().clone(), Settings::default());
        let (ip_id, _) = seed_ip_with_alias(db.pool()).await;

        let response = service.get_opportunity(&ip_id, "TW", "12m").await.unwrap();
        assert_eq!(response.indicators.len(), 13);
        // With no data everything is MISSING and the score stays neutral-ish.
        assert!(response
            .indicators
            .iter()
            .all(|i| i.status == IndicatorStatus::Missing));
        assert_eq!(response.coverage_ratio, 0.0);
    }

    #[tokio::test]
    async fn rising_alias_counts_in_consistency() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = OpportunityService::new(db.pool().clone(), Settings::default());
        let (ip_id, alias_id) = seed_ip_with_alias(db.pool()).await;

        // 14 days: first week flat at 20, second week rising to 40.
        let values: Vec<i64> = (0..14).map(|i| if i < 7 { 20 } else { 40 }).collect();
        insert_samples(db.pool(), &ip_id, &alias_id, &values).await;

        let today = Utc::now().date_naive();
        let result = service
            .compute_cross_alias_consistency(&ip_id, "TW", "12m", today)
            .await
            .unwrap();
        assert_eq!(result.status, IndicatorStatus::Live);
        assert_eq!(result.score, 100.0);
    }

    #[tokio::test]
    async fn quiet_aliases_do_not_qualify() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = OpportunityService::new(db.pool().clone(), Settings::default());
        let (ip_id, alias_id) = seed_ip_with_alias(db.pool()).await;

        // Near-zero noise: mean < 5 disqualifies the alias.
        let values: Vec<i64> = (0..14).map(|i| i % 2).collect();
        insert_samples(db.pool(), &ip_id, &alias_id, &values).await;

        let today = Utc::now().date_naive();
        let result = service
            .compute_cross_alias_consistency(&ip_id, "TW", "12m", today)
            .await
            .unwrap();
        assert_eq!(result.status, IndicatorStatus::Missing);
    }

    #[tokio::test]
    async fn manual_inputs_flow_into_indicators() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = OpportunityService::new(db.pool().clone(), Settings::default());
        let (ip_id, _) = seed_ip_with_alias(db.pool()).await;

        sqlx::query(
            "INSERT INTO opportunity_input (id, ip_id, indicator_key, value, updated_at) VALUES (?, ?, 'giftability', 0.9, ?)",
        )
        .bind(new_id())
        .bind(&ip_id)
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let response = service.get_opportunity(&ip_id, "TW", "12m").await.unwrap();
        let gift = response
            .indicators
            .iter()
            .find(|i| i.key == "giftability")
            .unwrap();
        assert_eq!(gift.status, IndicatorStatus::Manual);
        assert_eq!(gift.score, 90.0);
    }
}
