//! Collection orchestration and composite persistence.
//!
//! `run_collection` walks the enabled aliases of one IP sequentially, so the
//! aggregation that follows sees a consistent snapshot. The sample upserts
//! and the run-log row of each alias commit in one transaction.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use ip_store::{new_id, AliasRow};
use signal_core::{Settings, TrendCollector};

use crate::aggregation::{compute_aggregation, SignalThresholds};

/// End state of one `run_collection` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CollectRunOutcome {
    pub status: String,
    pub message: String,
    pub duration_ms: i64,
}

impl CollectRunOutcome {
    fn fail(message: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            status: "fail".to_string(),
            message: message.into(),
            duration_ms,
        }
    }
}

#[derive(Clone)]
pub struct TrendService {
    pool: SqlitePool,
    settings: Settings,
}

impl TrendService {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self { pool, settings }
    }

    fn thresholds(&self) -> SignalThresholds {
        SignalThresholds {
            wow_growth: self.settings.signal_wow_growth_threshold,
            breakout_percentile: self.settings.signal_breakout_percentile,
        }
    }

    /// Fetch all enabled aliases of an IP, upsert their samples, and rebuild
    /// the composite series for this (geo, timeframe).
    pub async fn run_collection(
        &self,
        collector: &dyn TrendCollector,
        ip_id: &str,
        geo: &str,
        timeframe: &str,
    ) -> Result<CollectRunOutcome> {
        let started = std::time::Instant::now();
        let source = collector.source_key();

        let ip_exists: Option<(String,)> = sqlx::query_as("SELECT id FROM ip WHERE id = ?")
            .bind(ip_id)
            .fetch_optional(&self.pool)
            .await?;
        if ip_exists.is_none() {
            return Ok(CollectRunOutcome::fail("IP not found", 0));
        }

        let aliases: Vec<AliasRow> =
            sqlx::query_as("SELECT * FROM ip_alias WHERE ip_id = ? AND enabled = 1")
                .bind(ip_id)
                .fetch_all(&self.pool)
                .await?;
        if aliases.is_empty() {
            return Ok(CollectRunOutcome::fail("No enabled aliases", 0));
        }

        let mut all_success = true;
        let mut total_points = 0usize;
        let mut last_error: Option<String> = None;

        for alias in &aliases {
            let run_started_at = Utc::now();
            let fetch_start = std::time::Instant::now();
            let result = collector.fetch(&alias.alias, geo, timeframe).await;
            let fetch_ms = fetch_start.elapsed().as_millis() as i64;
            let now = Utc::now();

            // Samples and the run-log row land together or not at all.
            let mut tx = self.pool.begin().await?;

            if result.success {
                for pt in &result.points {
                    sqlx::query(
                        r#"
                        INSERT INTO trend_sample (id, ip_id, alias_id, geo, timeframe, date, value, source, fetched_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                        ON CONFLICT(ip_id, alias_id, geo, timeframe, date) DO UPDATE SET
                            value = excluded.value,
                            fetched_at = excluded.fetched_at
                        "#,
                    )
                    .bind(new_id())
                    .bind(ip_id)
                    .bind(&alias.id)
                    .bind(geo)
                    .bind(timeframe)
                    .bind(pt.date)
                    .bind(pt.value)
                    .bind(source)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                total_points += result.points.len();
                tracing::info!(alias = %alias.alias, "collected {} points", result.points.len());
            } else {
                all_success = false;
                last_error = result.message.clone();
                tracing::warn!(
                    alias = %alias.alias,
                    "failed to collect: {} - {}",
                    result.error_code.map(|k| k.as_str()).unwrap_or("unknown"),
                    result.message.as_deref().unwrap_or(""),
                );
            }

            sqlx::query(
                r#"
                INSERT INTO collector_run_log
                    (id, source, ip_id, geo, timeframe, started_at, finished_at, status, http_code, error_code, message, duration_ms)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(new_id())
            .bind(source)
            .bind(ip_id)
            .bind(geo)
            .bind(timeframe)
            .bind(run_started_at)
            .bind(now)
            .bind(if result.success { "success" } else { "fail" })
            .bind(result.http_code.map(|c| c as i64))
            .bind(result.error_code.map(|k| k.as_str()))
            .bind(&result.message)
            .bind(fetch_ms)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }

        self.recompute_daily(ip_id, geo, timeframe).await?;

        let elapsed_ms = started.elapsed().as_millis() as i64;
        let outcome = if all_success {
            CollectRunOutcome {
                status: "success".to_string(),
                message: format!(
                    "Collected {} points across {} aliases",
                    total_points,
                    aliases.len()
                ),
                duration_ms: elapsed_ms,
            }
        } else if total_points > 0 {
            CollectRunOutcome {
                status: "success-partial".to_string(),
                message: format!(
                    "Partial: {} points collected, some aliases failed: {}",
                    total_points,
                    last_error.as_deref().unwrap_or("unknown")
                ),
                duration_ms: elapsed_ms,
            }
        } else {
            CollectRunOutcome::fail(
                format!(
                    "All aliases failed: {}",
                    last_error.as_deref().unwrap_or("unknown")
                ),
                elapsed_ms,
            )
        };

        Ok(outcome)
    }

    /// Rebuild the composite slice for one (ip, geo, timeframe) from the
    /// samples of its enabled aliases. Deterministic and idempotent; must be
    /// re-run whenever alias weights, enablement, or sample values change.
    pub async fn recompute_daily(&self, ip_id: &str, geo: &str, timeframe: &str) -> Result<()> {
        let aliases: Vec<AliasRow> =
            sqlx::query_as("SELECT * FROM ip_alias WHERE ip_id = ? AND enabled = 1")
                .bind(ip_id)
                .fetch_all(&self.pool)
                .await?;

        if aliases.is_empty() {
            // Nothing can contribute: clear the whole composite slice.
            sqlx::query(
                "DELETE FROM composite_daily WHERE ip_id = ? AND geo = ? AND timeframe = ?",
            )
            .bind(ip_id)
            .bind(geo)
            .bind(timeframe)
            .execute(&self.pool)
            .await?;
            return Ok(());
        }

        let weight_map: std::collections::HashMap<&str, f64> = aliases
            .iter()
            .map(|a| (a.id.as_str(), a.weight))
            .collect();

        let placeholders = vec!["?"; aliases.len()].join(", ");
        let sample_sql = format!(
            "SELECT alias_id, date, value FROM trend_sample \
             WHERE ip_id = ? AND geo = ? AND timeframe = ? AND alias_id IN ({}) \
             ORDER BY date",
            placeholders
        );
        let mut query = sqlx::query_as::<_, (String, NaiveDate, i64)>(&sample_sql)
            .bind(ip_id)
            .bind(geo)
            .bind(timeframe);
        for alias in &aliases {
            query = query.bind(&alias.id);
        }
        let samples = query.fetch_all(&self.pool).await?;

        if samples.is_empty() {
            return Ok(());
        }

        // Weighted composite per date.
        let mut by_date: BTreeMap<NaiveDate, Vec<(f64, f64)>> = BTreeMap::new();
        for (alias_id, date, value) in &samples {
            let w = weight_map.get(alias_id.as_str()).copied().unwrap_or(0.0);
            if w > 0.0 {
                by_date.entry(*date).or_default().push((*value as f64, w));
            }
        }

        let composite_series: Vec<(NaiveDate, f64)> = by_date
            .into_iter()
            .map(|(date, vals)| {
                let weighted_sum: f64 = vals.iter().map(|(v, w)| v * w).sum();
                let weight_sum: f64 = vals.iter().map(|(_, w)| w).sum();
                let composite = if weight_sum > 0.0 {
                    weighted_sum / weight_sum
                } else {
                    0.0
                };
                (date, composite)
            })
            .collect();

        let all_values: Vec<f64> = composite_series.iter().map(|(_, v)| *v).collect();

        // Breakout distribution: trailing window of up to 180 values.
        let trailing_start = all_values.len().saturating_sub(180);
        let trailing_window = &all_values[trailing_start..];

        // Walk at most the last 365 dates, carrying the previous WoW reading.
        let process_start = composite_series.len().saturating_sub(365);
        let thresholds = self.thresholds();
        let mut prev_wow: Option<f64> = None;

        let mut tx = self.pool.begin().await?;
        for (i, (date, comp_val)) in composite_series[process_start..].iter().enumerate() {
            let idx_in_full = process_start + i;
            let historical = &all_values[..idx_in_full + 1];

            let agg = compute_aggregation(historical, trailing_window, prev_wow, &thresholds);
            if agg.wow_growth.is_some() {
                prev_wow = agg.wow_growth;
            }

            sqlx::query(
                r#"
                INSERT INTO composite_daily
                    (id, ip_id, geo, timeframe, date, composite_value, ma7, ma28, wow_growth, acceleration, breakout_percentile, signal_light)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(ip_id, geo, timeframe, date) DO UPDATE SET
                    composite_value = excluded.composite_value,
                    ma7 = excluded.ma7,
                    ma28 = excluded.ma28,
                    wow_growth = excluded.wow_growth,
                    acceleration = excluded.acceleration,
                    breakout_percentile = excluded.breakout_percentile,
                    signal_light = excluded.signal_light
                "#,
            )
            .bind(new_id())
            .bind(ip_id)
            .bind(geo)
            .bind(timeframe)
            .bind(date)
            .bind((comp_val * 100.0).round() / 100.0)
            .bind(agg.ma7)
            .bind(agg.ma28)
            .bind(agg.wow_growth)
            .bind(agg.acceleration)
            .bind(agg.breakout_percentile)
            .bind(agg.signal_light.map(|l| l.as_str()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            ip_id,
            geo,
            timeframe,
            "daily aggregation complete: {} rows",
            composite_series.len() - process_start
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use ip_store::{CompositeDailyRow, RadarDb};
    use signal_core::{CollectResult, SamplePoint};

    struct FixedCollector {
        points: Vec<SamplePoint>,
    }

    #[async_trait]
    impl TrendCollector for FixedCollector {
        async fn fetch(&self, _keyword: &str, _geo: &str, _timeframe: &str) -> CollectResult {
            CollectResult::ok(self.points.clone(), Some(200))
        }

        fn source_key(&self) -> &'static str {
            "search_trends"
        }
    }

    async fn seed_ip(pool: &SqlitePool, weights: &[(&str, f64, bool)]) -> (String, Vec<String>) {
        let ip_id = new_id();
        sqlx::query("INSERT INTO ip (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&ip_id)
            .bind("Test IP")
            .bind(Utc::now())
            .execute(pool)
            .await
            .unwrap();

        let mut alias_ids = Vec::new();
        for (alias, weight, enabled) in weights {
            let alias_id = new_id();
            sqlx::query(
                "INSERT INTO ip_alias (id, ip_id, alias, locale, weight, enabled) VALUES (?, ?, ?, 'en', ?, ?)",
            )
            .bind(&alias_id)
            .bind(&ip_id)
            .bind(alias)
            .bind(weight)
            .bind(enabled)
            .execute(pool)
            .await
            .unwrap();
            alias_ids.push(alias_id);
        }
        (ip_id, alias_ids)
    }

    fn points(n: i64, start_value: i64) -> Vec<SamplePoint> {
        let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        (0..n)
            .map(|i| SamplePoint {
                date: base + Duration::days(i),
                value: (start_value + i).min(100),
            })
            .collect()
    }

    async fn composite_rows(pool: &SqlitePool, ip_id: &str) -> Vec<CompositeDailyRow> {
        sqlx::query_as(
            "SELECT * FROM composite_daily WHERE ip_id = ? AND geo = 'TW' AND timeframe = '12m' ORDER BY date",
        )
        .bind(ip_id)
        .fetch_all(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn collection_is_idempotent() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = TrendService::new(db.pool().clone(), Settings::default());
        let (ip_id, _) = seed_ip(db.pool(), &[("alpha", 1.0, true)]).await;

        let collector = FixedCollector { points: points(30, 40) };

        let first = service
            .run_collection(&collector, &ip_id, "TW", "12m")
            .await
            .unwrap();
        assert_eq!(first.status, "success");
        let rows_first = composite_rows(db.pool(), &ip_id).await;

        let second = service
            .run_collection(&collector, &ip_id, "TW", "12m")
            .await
            .unwrap();
        assert_eq!(second.status, "success");
        let rows_second = composite_rows(db.pool(), &ip_id).await;

        assert_eq!(rows_first.len(), rows_second.len());
        for (a, b) in rows_first.iter().zip(rows_second.iter()) {
            assert_eq!(a.composite_value, b.composite_value);
            assert_eq!(a.ma7, b.ma7);
            assert_eq!(a.wow_growth, b.wow_growth);
            assert_eq!(a.signal_light, b.signal_light);
        }

        // Re-running must not create new sample rows.
        let (sample_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trend_sample WHERE ip_id = ?")
                .bind(&ip_id)
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(sample_count, 30);
    }

    #[tokio::test]
    async fn composite_is_weighted_mean_of_enabled_aliases() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = TrendService::new(db.pool().clone(), Settings::default());
        let (ip_id, alias_ids) =
            seed_ip(db.pool(), &[("a", 1.0, true), ("b", 3.0, true)]).await;

        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        for (alias_id, value) in alias_ids.iter().zip([40i64, 80i64]) {
            sqlx::query(
                "INSERT INTO trend_sample (id, ip_id, alias_id, geo, timeframe, date, value, source, fetched_at) \
                 VALUES (?, ?, ?, 'TW', '12m', ?, ?, 'search_trends', ?)",
            )
            .bind(new_id())
            .bind(&ip_id)
            .bind(alias_id)
            .bind(date)
            .bind(value)
            .bind(Utc::now())
            .execute(db.pool())
            .await
            .unwrap();
        }

        service.recompute_daily(&ip_id, "TW", "12m").await.unwrap();
        let rows = composite_rows(db.pool(), &ip_id).await;
        assert_eq!(rows.len(), 1);
        // (40*1 + 80*3) / 4 = 70
        assert_eq!(rows[0].composite_value, 70.0);
    }

    #[tokio::test]
    async fn disabling_all_aliases_removes_rows_and_reenabling_reproduces_them() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = TrendService::new(db.pool().clone(), Settings::default());
        let (ip_id, _) = seed_ip(db.pool(), &[("alpha", 1.0, true)]).await;

        let collector = FixedCollector { points: points(20, 50) };
        service
            .run_collection(&collector, &ip_id, "TW", "12m")
            .await
            .unwrap();
        let before = composite_rows(db.pool(), &ip_id).await;
        assert!(!before.is_empty());

        sqlx::query("UPDATE ip_alias SET enabled = 0 WHERE ip_id = ?")
            .bind(&ip_id)
            .execute(db.pool())
            .await
            .unwrap();
        service.recompute_daily(&ip_id, "TW", "12m").await.unwrap();
        assert!(composite_rows(db.pool(), &ip_id).await.is_empty());

        sqlx::query("UPDATE ip_alias SET enabled = 1 WHERE ip_id = ?")
            .bind(&ip_id)
            .execute(db.pool())
            .await
            .unwrap();
        service.recompute_daily(&ip_id, "TW", "12m").await.unwrap();
        let after = composite_rows(db.pool(), &ip_id).await;
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.composite_value, b.composite_value);
            assert_eq!(a.signal_light, b.signal_light);
        }
    }

    #[tokio::test]
    async fn run_against_unknown_ip_fails_cleanly() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = TrendService::new(db.pool().clone(), Settings::default());
        let collector = FixedCollector { points: points(5, 10) };

        let outcome = service
            .run_collection(&collector, "nope", "TW", "12m")
            .await
            .unwrap();
        assert_eq!(outcome.status, "fail");
    }
}
