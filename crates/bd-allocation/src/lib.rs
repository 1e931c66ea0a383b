//! Business-development allocation: fuses the shared indicators into a
//! START / MONITOR / REJECT decision, gated by minimum brand fit and
//! discounted by evidence confidence.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use indicator_engine::{IndicatorResult, OpportunityResponse, OpportunityService};
use ip_store::{new_id, IpPipelineRow};
use signal_core::{clamp, Settings};
use source_health::ConfidenceOut;

#[derive(Debug, Clone, Serialize)]
pub struct BdScoreResponse {
    pub ip_id: String,
    pub ip_name: String,
    pub geo: String,
    pub timeframe: String,
    pub bd_score: f64,
    pub bd_decision: String,
    pub fit_gate_score: f64,
    pub fit_gate_passed: bool,
    pub timing_urgency: f64,
    pub demand_trajectory: f64,
    pub market_gap: f64,
    pub feasibility: f64,
    pub raw_score: f64,
    pub confidence_multiplier: f64,
    pub explanations: Vec<String>,
    pub pipeline_stage: String,
    pub indicators: Vec<IndicatorResult>,
    pub confidence: Option<ConfidenceOut>,
}

/// Everything derivable from the opportunity response alone.
#[derive(Debug, Clone)]
pub struct BdBreakdown {
    pub fit_gate_score: f64,
    pub fit_gate_passed: bool,
    pub timing_urgency: f64,
    pub demand_trajectory: f64,
    pub market_gap: f64,
    pub feasibility: f64,
    pub raw_score: f64,
    pub bd_score: f64,
    pub bd_decision: String,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn indicator_score(indicators: &[IndicatorResult], key: &str) -> f64 {
    indicators
        .iter()
        .find(|i| i.key == key)
        .map(|i| i.score)
        .unwrap_or(50.0)
}

fn has_acceleration(indicators: &[IndicatorResult]) -> bool {
    indicators
        .iter()
        .find(|i| i.key == "search_momentum")
        .and_then(|i| i.raw.as_ref())
        .and_then(|raw| raw.get("acceleration"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Pure BD composition over an already-computed opportunity response.
pub fn compute_breakdown(
    opp: &OpportunityResponse,
    confidence_multiplier: f64,
    settings: &Settings,
) -> BdBreakdown {
    // Hard gate: the weakest of the three fit indicators must clear the bar.
    let adult_fit = indicator_score(&opp.indicators, "adult_fit");
    let giftability = indicator_score(&opp.indicators, "giftability");
    let brand_aesthetic = indicator_score(&opp.indicators, "brand_aesthetic");
    let fit_gate_score = adult_fit.min(giftability).min(brand_aesthetic);
    let fit_gate_passed = fit_gate_score >= settings.bd_fit_gate_threshold;

    // Harder licensors need an earlier start, so gatekeeper pressure raises urgency.
    let rightsholder = opp.gatekeeper_risk;
    let timing_urgency = clamp(
        0.0,
        100.0,
        opp.timing_score * (1.0 + settings.bd_gatekeeper_urgency_factor * rightsholder / 100.0),
    );

    let accel_bonus = if has_acceleration(&opp.indicators) { 10.0 } else { 0.0 };
    let demand_trajectory = clamp(0.0, 100.0, opp.demand_score + accel_bonus);

    let market_gap = 100.0 - opp.supply_risk;

    let feasibility = clamp(
        0.0,
        100.0,
        0.5 * opp.diffusion_score + 0.5 * (100.0 - rightsholder),
    );

    let raw_score = settings.bd_weight_timing * timing_urgency
        + settings.bd_weight_demand * demand_trajectory
        + settings.bd_weight_market_gap * market_gap
        + settings.bd_weight_feasibility * feasibility;

    let bd_score = clamp(0.0, 100.0, raw_score * confidence_multiplier);

    let bd_decision = if !fit_gate_passed {
        "REJECT"
    } else if bd_score >= settings.bd_start_threshold {
        "START"
    } else if bd_score >= settings.bd_monitor_threshold {
        "MONITOR"
    } else {
        "REJECT"
    };

    BdBreakdown {
        fit_gate_score: round1(fit_gate_score),
        fit_gate_passed,
        timing_urgency: round1(timing_urgency),
        demand_trajectory: round1(demand_trajectory),
        market_gap: round1(market_gap),
        feasibility: round1(feasibility),
        raw_score: round1(raw_score),
        bd_score: round1(bd_score),
        bd_decision: bd_decision.to_string(),
    }
}

/// Three lines: decision driver, demand/market signal, confidence or
/// feasibility note.
pub fn generate_bd_explanations(b: &BdBreakdown, confidence_multiplier: f64) -> Vec<String> {
    let mut lines = Vec::with_capacity(3);

    if !b.fit_gate_passed {
        lines.push(format!(
            "Fit gate failed ({:.0}): IP does not meet minimum brand fit criteria",
            b.fit_gate_score
        ));
    } else if b.timing_urgency >= 70.0 {
        lines.push(format!(
            "High timing urgency ({:.0}): start BD now or risk missing the launch window",
            b.timing_urgency
        ));
    } else if b.timing_urgency >= 50.0 {
        lines.push(format!(
            "Moderate timing urgency ({:.0}): window is approaching, monitor closely",
            b.timing_urgency
        ));
    } else {
        lines.push(format!(
            "Low timing urgency ({:.0}): no immediate pressure to start BD",
            b.timing_urgency
        ));
    }

    if b.demand_trajectory >= 65.0 && b.market_gap >= 60.0 {
        lines.push(format!(
            "Strong demand trajectory ({:.0}) with open market gap ({:.0})",
            b.demand_trajectory, b.market_gap
        ));
    } else if b.demand_trajectory >= 50.0 {
        lines.push(format!(
            "Moderate demand ({:.0}), market gap at {:.0}",
            b.demand_trajectory, b.market_gap
        ));
    } else {
        lines.push(format!(
            "Weak demand trajectory ({:.0}), market gap at {:.0}",
            b.demand_trajectory, b.market_gap
        ));
    }

    if confidence_multiplier < 0.5 {
        lines.push(format!(
            "Low data confidence ({:.0}%): score significantly discounted",
            confidence_multiplier * 100.0
        ));
    } else if b.feasibility < 40.0 {
        lines.push(format!(
            "Feasibility concern ({:.0}): difficult rightsholder or limited platform presence",
            b.feasibility
        ));
    } else {
        lines.push(format!(
            "Feasibility OK ({:.0}), confidence {:.0}%",
            b.feasibility,
            confidence_multiplier * 100.0
        ));
    }

    lines
}

#[derive(Clone)]
pub struct BdService {
    pool: SqlitePool,
    settings: Settings,
}

impl BdService {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self { pool, settings }
    }

    /// Score one IP and cache the result onto its pipeline row. The pipeline
    /// stage is never modified by scoring.
    pub async fn compute_bd_score(
        &self,
        ip_id: &str,
        geo: &str,
        timeframe: &str,
    ) -> Result<BdScoreResponse> {
        let opp = OpportunityService::new(self.pool.clone(), self.settings.clone())
            .get_opportunity(ip_id, geo, timeframe)
            .await?;

        let confidence_multiplier = opp
            .confidence
            .as_ref()
            .map(|c| c.confidence_score as f64 / 100.0)
            .unwrap_or(0.5);

        let breakdown = compute_breakdown(&opp, confidence_multiplier, &self.settings);
        let explanations = generate_bd_explanations(&breakdown, confidence_multiplier);

        sqlx::query(
            r#"
            INSERT INTO ip_pipeline (id, ip_id, stage, bd_score, bd_decision, updated_at)
            VALUES (?, ?, 'candidate', ?, ?, ?)
            ON CONFLICT(ip_id) DO UPDATE SET
                bd_score = excluded.bd_score,
                bd_decision = excluded.bd_decision,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(new_id())
        .bind(ip_id)
        .bind(breakdown.bd_score)
        .bind(&breakdown.bd_decision)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let pipeline: Option<IpPipelineRow> =
            sqlx::query_as("SELECT * FROM ip_pipeline WHERE ip_id = ?")
                .bind(ip_id)
                .fetch_optional(&self.pool)
                .await?;
        let pipeline_stage = pipeline
            .map(|p| p.stage)
            .unwrap_or_else(|| "candidate".to_string());

        let ip_name: Option<(String,)> = sqlx::query_as("SELECT name FROM ip WHERE id = ?")
            .bind(ip_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(BdScoreResponse {
            ip_id: ip_id.to_string(),
            ip_name: ip_name.map(|(n,)| n).unwrap_or_else(|| "Unknown".to_string()),
            geo: geo.to_string(),
            timeframe: timeframe.to_string(),
            bd_score: breakdown.bd_score,
            bd_decision: breakdown.bd_decision.clone(),
            fit_gate_score: breakdown.fit_gate_score,
            fit_gate_passed: breakdown.fit_gate_passed,
            timing_urgency: breakdown.timing_urgency,
            demand_trajectory: breakdown.demand_trajectory,
            market_gap: breakdown.market_gap,
            feasibility: breakdown.feasibility,
            raw_score: breakdown.raw_score,
            confidence_multiplier: (confidence_multiplier * 100.0).round() / 100.0,
            explanations,
            pipeline_stage,
            indicators: opp.indicators,
            confidence: opp.confidence,
        })
    }

    /// Score every IP and rank by BD score, best first.
    pub async fn rank_candidates(&self, geo: &str, timeframe: &str) -> Result<Vec<BdScoreResponse>> {
        let ip_ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM ip ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        let mut scores = Vec::with_capacity(ip_ids.len());
        for (ip_id,) in &ip_ids {
            scores.push(self.compute_bd_score(ip_id, geo, timeframe).await?);
        }

        scores.sort_by(|a, b| {
            b.bd_score
                .partial_cmp(&a.bd_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicator_engine::{manual_score, INDICATOR_DEFS};
    use std::collections::HashMap;

    fn opportunity_with(values: &HashMap<String, f64>) -> OpportunityResponse {
        let indicators: Vec<IndicatorResult> = INDICATOR_DEFS
            .iter()
            .map(|(key, label, dimension, _)| manual_score(key, label, dimension, values))
            .collect();
        let dim = |d: &str| {
            let scores: Vec<f64> = indicators
                .iter()
                .filter(|i| i.dimension == d)
                .map(|i| i.score)
                .collect();
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        OpportunityResponse {
            ip_id: "ip".to_string(),
            geo: "TW".to_string(),
            timeframe: "12m".to_string(),
            opportunity_score: 50.0,
            opportunity_light: "yellow".to_string(),
            base_score: 32.5,
            risk_multiplier: 1.0,
            timing_multiplier: 1.0,
            demand_score: dim("demand"),
            diffusion_score: dim("diffusion"),
            fit_score: dim("fit"),
            supply_risk: dim("supply"),
            gatekeeper_risk: indicators
                .iter()
                .find(|i| i.key == "rightsholder_intensity")
                .map(|i| i.score)
                .unwrap(),
            timing_score: indicators
                .iter()
                .find(|i| i.key == "timing_window")
                .map(|i| i.score)
                .unwrap(),
            coverage_ratio: 0.0,
            explanations: vec![],
            indicators,
            confidence: None,
        }
    }

    #[test]
    fn fit_gate_failure_forces_reject() {
        // adult_fit 0.2 fails the 30 gate even though everything else is strong.
        let mut values = HashMap::new();
        for (key, _, _, _) in INDICATOR_DEFS {
            values.insert(key.to_string(), 0.7);
        }
        values.insert("adult_fit".to_string(), 0.2);
        values.insert("giftability".to_string(), 0.9);
        values.insert("brand_aesthetic".to_string(), 0.8);

        let opp = opportunity_with(&values);
        let breakdown = compute_breakdown(&opp, 0.8, &Settings::default());

        assert_eq!(breakdown.fit_gate_score, 20.0);
        assert!(!breakdown.fit_gate_passed);
        assert_eq!(breakdown.bd_decision, "REJECT");
    }

    #[test]
    fn components_follow_documented_formulas() {
        let mut values = HashMap::new();
        for (key, _, _, _) in INDICATOR_DEFS {
            values.insert(key.to_string(), 0.5);
        }
        values.insert("rightsholder_intensity".to_string(), 1.0);
        let opp = opportunity_with(&values);
        let breakdown = compute_breakdown(&opp, 1.0, &Settings::default());

        // timing_urgency = 50 * (1 + 0.3 * 100/100) = 65
        assert_eq!(breakdown.timing_urgency, 65.0);
        // market_gap = 100 - 50
        assert_eq!(breakdown.market_gap, 50.0);
        // feasibility = 0.5*50 + 0.5*(100-100) = 25
        assert_eq!(breakdown.feasibility, 25.0);
    }

    #[test]
    fn confidence_discount_scales_score() {
        let mut values = HashMap::new();
        for (key, _, _, _) in INDICATOR_DEFS {
            values.insert(key.to_string(), 0.8);
        }
        let opp = opportunity_with(&values);

        let full = compute_breakdown(&opp, 1.0, &Settings::default());
        let half = compute_breakdown(&opp, 0.5, &Settings::default());
        assert!((half.bd_score - full.raw_score * 0.5).abs() < 0.11);
        assert!(half.bd_score < full.bd_score);
    }

    #[test]
    fn decision_thresholds() {
        let mut values = HashMap::new();
        for (key, _, _, _) in INDICATOR_DEFS {
            values.insert(key.to_string(), 0.5);
        }
        let opp = opportunity_with(&values);

        // Neutral inputs, full confidence. Gatekeeper pressure at 50 lifts
        // timing urgency to 57.5, so raw = 0.35*57.5 + 0.30*50 + 0.20*50 + 0.15*50.
        let b = compute_breakdown(&opp, 1.0, &Settings::default());
        assert_eq!(b.raw_score, 52.6);
        assert_eq!(b.bd_decision, "MONITOR");

        let b = compute_breakdown(&opp, 0.3, &Settings::default());
        assert_eq!(b.bd_decision, "REJECT");
    }

    #[test]
    fn gate_failure_explanation_leads() {
        let mut values = HashMap::new();
        for (key, _, _, _) in INDICATOR_DEFS {
            values.insert(key.to_string(), 0.5);
        }
        values.insert("adult_fit".to_string(), 0.1);
        let opp = opportunity_with(&values);
        let b = compute_breakdown(&opp, 0.8, &Settings::default());
        let lines = generate_bd_explanations(&b, 0.8);

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Fit gate failed"));
    }

    #[test]
    fn indicators_without_acceleration_get_no_bonus() {
        let mut values = HashMap::new();
        for (key, _, _, _) in INDICATOR_DEFS {
            values.insert(key.to_string(), 0.5);
        }
        let opp = opportunity_with(&values);
        assert!(!has_acceleration(&opp.indicators));
        let b = compute_breakdown(&opp, 1.0, &Settings::default());
        assert_eq!(b.demand_trajectory, 50.0);
    }
}
