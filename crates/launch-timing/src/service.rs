//! Launch plan assembly over the licence window.

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use ip_store::{IpEventRow, IpPipelineRow};
use signal_core::{clamp, Settings};
use source_health::{ConfidenceOut, ConfidenceService};

use crate::grid::{
    compute_demand_at_week, compute_event_boost, compute_operational_risk, compute_saturation,
    weeks_between,
};

#[derive(Debug, Clone, Serialize)]
pub struct LaunchWeekScore {
    pub week_start: NaiveDate,
    pub launch_value: f64,
    pub demand_score: f64,
    pub event_boost: f64,
    pub saturation_score: f64,
    pub operational_risk: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Milestone {
    pub label: String,
    pub target_date: NaiveDate,
    pub weeks_before_launch: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchPlanResponse {
    pub ip_id: String,
    pub ip_name: String,
    pub recommended_launch_week: Option<NaiveDate>,
    pub backup_weeks: Vec<NaiveDate>,
    pub launch_value_grid: Vec<LaunchWeekScore>,
    pub milestones: Vec<Milestone>,
    pub explanations: Vec<String>,
    pub confidence: Option<ConfidenceOut>,
    pub license_start_date: NaiveDate,
    pub license_end_date: NaiveDate,
    pub events_in_window: Vec<IpEventRow>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn generate_milestones(launch_date: NaiveDate, settings: &Settings) -> Vec<Milestone> {
    let lead = |label: &str, weeks: i64| Milestone {
        label: label.to_string(),
        target_date: launch_date - Duration::weeks(weeks),
        weeks_before_launch: weeks,
    };
    vec![
        lead("Launch", 0),
        lead("Production Start", settings.launch_lead_production),
        lead("Sample Review", settings.launch_lead_sample_review),
        lead("Artwork Submission", settings.launch_lead_artwork),
        lead("Design Start", settings.launch_lead_design_start),
    ]
}

fn generate_explanations(
    grid: &[LaunchWeekScore],
    recommended: Option<NaiveDate>,
    events_in_window: &[IpEventRow],
    saturation: f64,
    confidence_score: Option<i64>,
) -> Vec<String> {
    let mut lines = Vec::new();
    let (Some(recommended), false) = (recommended, grid.is_empty()) else {
        lines.push("Insufficient data to generate a launch plan".to_string());
        return lines;
    };
    let Some(rec) = grid.iter().find(|w| w.week_start == recommended) else {
        return vec!["Could not find scores for recommended week".to_string()];
    };

    if rec.event_boost > 30.0 {
        let near: Vec<&str> = events_in_window
            .iter()
            .filter(|e| (e.event_date - recommended).num_days().abs() < 56)
            .take(2)
            .map(|e| e.title.as_str())
            .collect();
        let names = if near.is_empty() {
            "upcoming event".to_string()
        } else {
            near.join(", ")
        };
        lines.push(format!(
            "Recommended week aligns with {}: event boost {:.0}/100",
            names, rec.event_boost
        ));
    } else if rec.demand_score > 60.0 {
        lines.push(format!(
            "Recommended week captures projected demand peak ({:.0}/100)",
            rec.demand_score
        ));
    } else {
        lines.push(format!(
            "Recommended week balances demand ({:.0}) vs. risk ({:.0})",
            rec.demand_score, rec.operational_risk
        ));
    }

    if saturation > 50.0 {
        lines.push(format!(
            "High market saturation ({:.0}/100): consider differentiating launch positioning",
            saturation
        ));
    } else if saturation > 20.0 {
        lines.push(format!(
            "Moderate market saturation ({:.0}/100): reasonable competitive landscape",
            saturation
        ));
    } else {
        lines.push(format!(
            "Low market saturation ({:.0}/100): open market opportunity",
            saturation
        ));
    }

    if rec.operational_risk > 50.0 {
        lines.push(format!(
            "Tight operational timeline (risk {:.0}/100): start production planning immediately",
            rec.operational_risk
        ));
    } else {
        lines.push(format!(
            "Comfortable operational buffer (risk {:.0}/100)",
            rec.operational_risk
        ));
    }

    if let Some(score) = confidence_score {
        if score < 50 {
            lines.push(format!(
                "Low data confidence ({}%): timing recommendation has wide uncertainty",
                score
            ));
        }
    }

    lines.truncate(4);
    lines
}

#[derive(Clone)]
pub struct LaunchService {
    pool: SqlitePool,
    settings: Settings,
}

impl LaunchService {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self { pool, settings }
    }

    pub async fn compute_launch_plan(
        &self,
        ip_id: &str,
        geo: &str,
        timeframe: &str,
    ) -> Result<LaunchPlanResponse> {
        let today = Utc::now().date_naive();

        let ip_name: Option<(String,)> = sqlx::query_as("SELECT name FROM ip WHERE id = ?")
            .bind(ip_id)
            .fetch_optional(&self.pool)
            .await?;
        let ip_name = ip_name.map(|(n,)| n).unwrap_or_else(|| "Unknown".to_string());

        let pipeline: Option<IpPipelineRow> =
            sqlx::query_as("SELECT * FROM ip_pipeline WHERE ip_id = ?")
                .bind(ip_id)
                .fetch_optional(&self.pool)
                .await?;

        // Licence window, or the fallback planning window.
        let (mut window_start, window_end) = match pipeline.as_ref().and_then(|p| {
            p.license_start_date.zip(p.license_end_date)
        }) {
            Some((start, end)) => (start, end),
            None => (
                today + Duration::weeks(12),
                today + Duration::days(30 * self.settings.launch_fallback_window_months),
            ),
        };
        if window_start < today {
            window_start = today + Duration::weeks(4);
        }

        // Demand slope from the most recent 60 days of ma28.
        let trend_rows: Vec<(NaiveDate, Option<f64>)> = sqlx::query_as(
            "SELECT date, ma28 FROM composite_daily \
             WHERE ip_id = ? AND geo = ? AND timeframe = ? \
             ORDER BY date DESC LIMIT 60",
        )
        .bind(ip_id)
        .bind(geo)
        .bind(timeframe)
        .fetch_all(&self.pool)
        .await?;

        let mut ma28_values: Vec<(NaiveDate, f64)> = trend_rows
            .into_iter()
            .filter_map(|(d, ma)| ma.map(|m| (d, m)))
            .collect();
        ma28_values.sort_by_key(|(d, _)| *d);

        let mut base_demand = 50.0;
        let mut slope_per_week = 0.0;
        if ma28_values.len() >= 2 {
            let (older_date, older) = ma28_values[0];
            let (recent_date, recent) = ma28_values[ma28_values.len() - 1];
            let weeks_span = weeks_between(older_date, recent_date).max(1.0);
            base_demand = clamp(0.0, 100.0, recent);
            slope_per_week = (recent - older) / weeks_span;
        } else if let Some((_, only)) = ma28_values.first() {
            base_demand = clamp(0.0, 100.0, *only);
        }

        // Events inside the window plus an 8-week margin on both sides.
        let margin = Duration::weeks(8);
        let events: Vec<IpEventRow> = sqlx::query_as(
            "SELECT * FROM ip_event \
             WHERE ip_id = ? AND event_date >= ? AND event_date <= ? \
             ORDER BY event_date",
        )
        .bind(ip_id)
        .bind(window_start - margin)
        .bind(window_end + margin)
        .fetch_all(&self.pool)
        .await?;

        let (total_merch,): (Option<i64>,) =
            sqlx::query_as("SELECT SUM(product_count) FROM merch_product_count WHERE ip_id = ?")
                .bind(ip_id)
                .fetch_one(&self.pool)
                .await?;
        let saturation = compute_saturation(total_merch.unwrap_or(0));

        let confidence = ConfidenceService::new(self.pool.clone(), self.settings.clone())
            .get_ip_confidence(ip_id)
            .await
            .ok();

        // Weekly grid, Monday-aligned.
        let mut grid: Vec<LaunchWeekScore> = Vec::new();
        let mut week = window_start
            - Duration::days(window_start.weekday().num_days_from_monday() as i64);
        while week <= window_end {
            let weeks_from_now = weeks_between(today, week);

            let demand = compute_demand_at_week(base_demand, slope_per_week, weeks_from_now);
            let event_boost = compute_event_boost(
                week,
                &events,
                self.settings.launch_event_peak_weeks_before,
                self.settings.launch_event_sigma_weeks,
            );
            let ops_risk = compute_operational_risk(weeks_from_now);

            let launch_value = self.settings.launch_weight_demand * demand
                + self.settings.launch_weight_event * event_boost
                - self.settings.launch_weight_saturation * saturation
                - self.settings.launch_weight_ops_risk * ops_risk;

            grid.push(LaunchWeekScore {
                week_start: week,
                launch_value: round2(launch_value),
                demand_score: round2(demand),
                event_boost: round2(event_boost),
                saturation_score: round2(saturation),
                operational_risk: round2(ops_risk),
            });

            week = week + Duration::weeks(1);
        }

        let mut ranked: Vec<&LaunchWeekScore> = grid.iter().collect();
        ranked.sort_by(|a, b| {
            b.launch_value
                .partial_cmp(&a.launch_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let recommended = ranked.first().map(|w| w.week_start);
        let backup_weeks: Vec<NaiveDate> =
            ranked.iter().skip(1).take(2).map(|w| w.week_start).collect();

        let milestones = recommended
            .map(|r| generate_milestones(r, &self.settings))
            .unwrap_or_default();

        let explanations = generate_explanations(
            &grid,
            recommended,
            &events,
            saturation,
            confidence.as_ref().map(|c| c.confidence_score),
        );

        Ok(LaunchPlanResponse {
            ip_id: ip_id.to_string(),
            ip_name,
            recommended_launch_week: recommended,
            backup_weeks,
            launch_value_grid: grid,
            milestones,
            explanations,
            confidence,
            license_start_date: window_start,
            license_end_date: window_end,
            events_in_window: events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ip_store::{new_id, RadarDb};

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
    fn milestones_work_backwards_from_launch() {
        let launch = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap();
        let milestones = generate_milestones(launch, &Settings::default());

        assert_eq!(milestones.len(), 5);
        assert_eq!(milestones[0].target_date, launch);
        let production = milestones.iter().find(|m| m.label == "Production Start").unwrap();
        assert_eq!(production.target_date, launch - Duration::weeks(8));
        let design = milestones.iter().find(|m| m.label == "Design Start").unwrap();
        assert_eq!(design.target_date, launch - Duration::weeks(14));
    }

    #[tokio::test]
    async fn fallback_window_produces_monday_aligned_grid() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = LaunchService::new(db.pool().clone(), Settings::default());
        let ip_id = seed_ip(db.pool()).await;

        let plan = service.compute_launch_plan(&ip_id, "TW", "12m").await.unwrap();

        // No licence window: fallback spans roughly 12 weeks to 6 months out.
        assert!(!plan.launch_value_grid.is_empty());
        for w in &plan.launch_value_grid {
            assert_eq!(w.week_start.weekday().num_days_from_monday(), 0);
        }
        assert!(plan.recommended_launch_week.is_some());
        assert_eq!(plan.milestones.len(), 5);
        assert!(plan.backup_weeks.len() <= 2);
        let rec = plan.recommended_launch_week.unwrap();
        assert!(!plan.backup_weeks.contains(&rec));
    }

    #[tokio::test]
    async fn event_in_window_lifts_nearby_weeks() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = LaunchService::new(db.pool().clone(), Settings::default());
        let ip_id = seed_ip(db.pool()).await;

        let today = Utc::now().date_naive();
        sqlx::query(
            "INSERT INTO ip_event (id, ip_id, event_type, title, event_date, source, created_at) \
             VALUES (?, ?, 'movie_release', 'The Movie', ?, 'manual', ?)",
        )
        .bind(new_id())
        .bind(&ip_id)
        .bind(today + Duration::weeks(20))
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let plan = service.compute_launch_plan(&ip_id, "TW", "12m").await.unwrap();
        let max_boost = plan
            .launch_value_grid
            .iter()
            .map(|w| w.event_boost)
            .fold(0.0f64, f64::max);
        assert!(max_boost > 90.0, "max boost = {}", max_boost);
        assert_eq!(plan.events_in_window.len(), 1);
    }

    #[tokio::test]
    async fn expired_license_window_start_is_pushed_forward() {
        let db = RadarDb::new("sqlite::memory:").await.unwrap();
        let service = LaunchService::new(db.pool().clone(), Settings::default());
        let ip_id = seed_ip(db.pool()).await;

        let today = Utc::now().date_naive();
        sqlx::query(
            "INSERT INTO ip_pipeline (id, ip_id, stage, license_start_date, license_end_date) \
             VALUES (?, ?, 'negotiating', ?, ?)",
        )
        .bind(new_id())
        .bind(&ip_id)
        .bind(today - Duration::weeks(10))
        .bind(today + Duration::weeks(26))
        .execute(db.pool())
        .await
        .unwrap();

        let plan = service.compute_launch_plan(&ip_id, "TW", "12m").await.unwrap();
        assert_eq!(plan.license_start_date, today + Duration::weeks(4));
        assert_eq!(plan.license_end_date, today + Duration::weeks(26));
    }
}
