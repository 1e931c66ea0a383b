//! Source-health rollups for the operator views, plus the upsert helpers
//! every sync uses to record attempts.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use ip_store::{new_id, IpSourceHealthRow, SourceRegistryRow, SourceRunRow};
use signal_core::{HealthStatus, Settings};

use crate::status::compute_source_status;

/// Per-source rollup across all IPs.
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealthSummary {
    pub source_key: String,
    pub status: HealthStatus,
    pub availability_level: String,
    pub risk_type: String,
    pub is_key_source: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub success_rate_24h: Option<f64>,
    pub success_rate_7d: Option<f64>,
    pub coverage: i64,
    pub total_ips: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageCell {
    pub source_key: String,
    pub status: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub staleness_hours: Option<i64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageMatrixRow {
    pub ip_id: String,
    pub ip_name: String,
    pub sources: Vec<CoverageCell>,
}

#[derive(Clone)]
pub struct HealthService {
    pool: SqlitePool,
    settings: Settings,
}

impl HealthService {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self { pool, settings }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn success_rate_since(
        &self,
        source_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let (total, ok): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'ok' THEN 1 ELSE 0 END), 0) \
             FROM source_run WHERE source_key = ? AND started_at >= ?",
        )
        .bind(source_key)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(if total > 0 {
            Some(ok as f64 / total as f64)
        } else {
            None
        })
    }

    /// Health summary for every registered source.
    pub async fn source_health_list(&self) -> Result<Vec<SourceHealthSummary>> {
        let registries: Vec<SourceRegistryRow> = sqlx::query_as("SELECT * FROM source_registry")
            .fetch_all(&self.pool)
            .await?;

        let (total_ips,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ip")
            .fetch_one(&self.pool)
            .await?;

        let now = Utc::now();
        let mut results = Vec::with_capacity(registries.len());

        for reg in registries {
            let (last_success,): (Option<DateTime<Utc>>,) = sqlx::query_as(
                "SELECT MAX(last_success_at) FROM ip_source_health WHERE source_key = ?",
            )
            .bind(&reg.source_key)
            .fetch_one(&self.pool)
            .await?;

            let rate_24h = self
                .success_rate_since(&reg.source_key, now - Duration::hours(24))
                .await?;
            let rate_7d = self
                .success_rate_since(&reg.source_key, now - Duration::days(7))
                .await?;

            let (coverage,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM ip_source_health WHERE source_key = ? AND status = 'ok'",
            )
            .bind(&reg.source_key)
            .fetch_one(&self.pool)
            .await?;

            let last_error: Option<(String,)> = sqlx::query_as(
                "SELECT error_sample FROM source_run \
                 WHERE source_key = ? AND error_sample IS NOT NULL \
                 ORDER BY started_at DESC LIMIT 1",
            )
            .bind(&reg.source_key)
            .fetch_optional(&self.pool)
            .await?;

            let status = compute_source_status(
                last_success,
                self.settings.staleness_for(&reg.source_key),
                now,
            );

            results.push(SourceHealthSummary {
                source_key: reg.source_key,
                status,
                availability_level: reg.availability_level,
                risk_type: reg.risk_type,
                is_key_source: reg.is_key_source,
                last_success_at: last_success,
                success_rate_24h: rate_24h,
                success_rate_7d: rate_7d,
                coverage,
                total_ips,
                last_error: last_error.map(|(e,)| e),
            });
        }

        Ok(results)
    }

    /// IP x source coverage matrix for the operator dashboard.
    pub async fn coverage_matrix(
        &self,
        limit: i64,
        only_issues: bool,
    ) -> Result<Vec<CoverageMatrixRow>> {
        let source_keys: Vec<(String,)> =
            sqlx::query_as("SELECT source_key FROM source_registry")
                .fetch_all(&self.pool)
                .await?;

        let ips: Vec<(String, String)> =
            sqlx::query_as("SELECT id, name FROM ip ORDER BY created_at DESC LIMIT ?")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        let mut rows = Vec::new();
        for (ip_id, ip_name) in ips {
            let health: Vec<IpSourceHealthRow> =
                sqlx::query_as("SELECT * FROM ip_source_health WHERE ip_id = ?")
                    .bind(&ip_id)
                    .fetch_all(&self.pool)
                    .await?;

            let mut cells = Vec::with_capacity(source_keys.len());
            let mut has_issue = false;
            for (sk,) in &source_keys {
                let h = health.iter().find(|h| &h.source_key == sk);
                let status = h.map(|h| h.status.clone()).unwrap_or_else(|| "down".to_string());
                if status != "ok" {
                    has_issue = true;
                }
                cells.push(CoverageCell {
                    source_key: sk.clone(),
                    status,
                    last_success_at: h.and_then(|h| h.last_success_at),
                    staleness_hours: h.and_then(|h| h.staleness_hours),
                    last_error: h.and_then(|h| h.last_error.clone()),
                });
            }

            if only_issues && !has_issue {
                continue;
            }
            rows.push(CoverageMatrixRow {
                ip_id,
                ip_name,
                sources: cells,
            });
        }

        Ok(rows)
    }

    /// Recent source runs, optionally filtered by source key.
    pub async fn recent_runs(
        &self,
        source_key: Option<&str>,
        limit: i64,
    ) -> Result<Vec<SourceRunRow>> {
        let runs = match source_key {
            Some(key) => {
                sqlx::query_as(
                    "SELECT * FROM source_run WHERE source_key = ? ORDER BY started_at DESC LIMIT ?",
                )
                .bind(key)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM source_run ORDER BY started_at DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(runs)
    }

    pub async fn registry(&self) -> Result<Vec<SourceRegistryRow>> {
        Ok(sqlx::query_as("SELECT * FROM source_registry")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Record one end-to-end run against a source.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_source_run(
        &self,
        source_key: &str,
        started_at: DateTime<Utc>,
        status: HealthStatus,
        items_processed: i64,
        items_succeeded: i64,
        items_failed: i64,
        error_sample: Option<&str>,
    ) -> Result<()> {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds();

        sqlx::query(
            r#"
            INSERT INTO source_run
                (id, source_key, started_at, finished_at, status, duration_ms, items_processed, items_succeeded, items_failed, error_sample)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_id())
        .bind(source_key)
        .bind(started_at)
        .bind(finished_at)
        .bind(status.as_str())
        .bind(duration_ms)
        .bind(items_processed)
        .bind(items_succeeded)
        .bind(items_failed)
        .bind(error_sample)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert the per-(ip, source) health row after an attempt. On failure
    /// the previous `last_success_at` is preserved.
    pub async fn upsert_ip_source_health(
        &self,
        ip_id: &str,
        source_key: &str,
        success: bool,
        status: HealthStatus,
        last_error: Option<&str>,
        updated_items: i64,
    ) -> Result<()> {
        let now = Utc::now();
        let success_at = if success { Some(now) } else { None };
        let staleness: Option<i64> = if success { Some(0) } else { None };

        sqlx::query(
            r#"
            INSERT INTO ip_source_health
                (id, ip_id, source_key, last_success_at, last_attempt_at, status, staleness_hours, last_error, updated_items)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ip_id, source_key) DO UPDATE SET
                last_success_at = COALESCE(excluded.last_success_at, ip_source_health.last_success_at),
                last_attempt_at = excluded.last_attempt_at,
                status = excluded.status,
                staleness_hours = excluded.staleness_hours,
                last_error = excluded.last_error,
                updated_items = excluded.updated_items
            "#,
        )
        .bind(new_id())
        .bind(ip_id)
        .bind(source_key)
        .bind(success_at)
        .bind(now)
        .bind(status.as_str())
        .bind(staleness)
        .bind(last_error)
        .bind(updated_items)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ip_store::RadarDb;

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

    #[tokio::test]
    async fn health_upsert_preserves_last_success_on_failure() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = HealthService::new(db.pool().clone(), Settings::default());
        let ip_id = seed_ip(db.pool()).await;

        service
            .upsert_ip_source_health(&ip_id, "catalogue", true, HealthStatus::Ok, None, 3)
            .await
            .unwrap();
        let row: IpSourceHealthRow =
            sqlx::query_as("SELECT * FROM ip_source_health WHERE ip_id = ? AND source_key = 'catalogue'")
                .bind(&ip_id)
                .fetch_one(db.pool())
                .await
                .unwrap();
        let first_success = row.last_success_at.unwrap();

        service
            .upsert_ip_source_health(
                &ip_id,
                "catalogue",
                false,
                HealthStatus::Down,
                Some("blocked"),
                0,
            )
            .await
            .unwrap();
        let row: IpSourceHealthRow =
            sqlx::query_as("SELECT * FROM ip_source_health WHERE ip_id = ? AND source_key = 'catalogue'")
                .bind(&ip_id)
                .fetch_one(db.pool())
                .await
                .unwrap();

        assert_eq!(row.status, "down");
        assert_eq!(row.last_error.as_deref(), Some("blocked"));
        assert_eq!(row.last_success_at, Some(first_success));
    }

    #[tokio::test]
    async fn matrix_marks_unattempted_sources_down() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = HealthService::new(db.pool().clone(), Settings::default());
        let ip_id = seed_ip(db.pool()).await;

        service
            .upsert_ip_source_health(&ip_id, "search_trends", true, HealthStatus::Ok, None, 10)
            .await
            .unwrap();

        let matrix = service.coverage_matrix(50, false).await.unwrap();
        assert_eq!(matrix.len(), 1);
        let row = &matrix[0];
        assert_eq!(row.sources.len(), 6);
        let ok_cells = row.sources.iter().filter(|c| c.status == "ok").count();
        assert_eq!(ok_cells, 1);
    }

    #[tokio::test]
    async fn recent_runs_filters_by_source() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = HealthService::new(db.pool().clone(), Settings::default());

        service
            .record_source_run("video", Utc::now(), HealthStatus::Ok, 5, 5, 0, None)
            .await
            .unwrap();
        service
            .record_source_run("catalogue", Utc::now(), HealthStatus::Warn, 1, 0, 1, Some("no match"))
            .await
            .unwrap();

        let all = service.recent_runs(None, 50).await.unwrap();
        assert_eq!(all.len(), 2);
        let video_only = service.recent_runs(Some("video"), 50).await.unwrap();
        assert_eq!(video_only.len(), 1);
        assert_eq!(video_only[0].source_key, "video");
    }
}
