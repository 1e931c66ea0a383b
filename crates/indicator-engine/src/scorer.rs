//! Opportunity score composition: positive dimensions form the base, timing
//! accelerates it, supply and gatekeeper pressure dampen it.

use serde::Serialize;

use signal_core::{clamp, Settings};

use crate::indicators::{IndicatorResult, IndicatorStatus};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DimensionScores {
    pub demand: f64,
    pub diffusion: f64,
    pub fit: f64,
    pub supply: f64,
    pub gatekeeper: f64,
    pub timing: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub light: String,
    pub base: f64,
    pub risk_multiplier: f64,
    pub timing_multiplier: f64,
    pub dimensions: DimensionScores,
}

fn round_to(v: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (v * factor).round() / factor
}

fn dimension_mean(indicators: &[IndicatorResult], dimension: &str) -> f64 {
    let scores: Vec<f64> = indicators
        .iter()
        .filter(|i| i.dimension == dimension)
        .map(|i| i.score)
        .collect();
    if scores.is_empty() {
        50.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

fn indicator_score(indicators: &[IndicatorResult], key: &str) -> f64 {
    indicators
        .iter()
        .find(|i| i.key == key)
        .map(|i| i.score)
        .unwrap_or(50.0)
}

pub fn compute_opportunity_score(
    indicators: &[IndicatorResult],
    settings: &Settings,
) -> ScoreBreakdown {
    let demand = dimension_mean(indicators, "demand");
    let diffusion = dimension_mean(indicators, "diffusion");
    let fit = dimension_mean(indicators, "fit");
    let supply = dimension_mean(indicators, "supply");

    // Gatekeeper splits: rightsholder pressure dampens, timing accelerates.
    let rightsholder = indicator_score(indicators, "rightsholder_intensity");
    let timing = indicator_score(indicators, "timing_window");

    let base = settings.opp_weight_demand * demand
        + settings.opp_weight_diffusion * diffusion
        + settings.opp_weight_fit * fit;

    let timing_mult = settings.opp_timing_low + settings.opp_timing_high * (timing / 100.0);

    let risk_mult = 1.0
        / (1.0
            + settings.opp_risk_weight_supply * (supply / 100.0)
            + settings.opp_risk_weight_gatekeeper * (rightsholder / 100.0));

    let score = clamp(
        0.0,
        100.0,
        base * timing_mult * risk_mult * settings.opp_scaling_factor,
    );
    let light = if score >= 70.0 {
        "green"
    } else if score >= 40.0 {
        "yellow"
    } else {
        "red"
    };

    ScoreBreakdown {
        score: round_to(score, 1),
        light: light.to_string(),
        base: round_to(base, 2),
        risk_multiplier: round_to(risk_mult, 4),
        timing_multiplier: round_to(timing_mult, 4),
        dimensions: DimensionScores {
            demand: round_to(demand, 1),
            diffusion: round_to(diffusion, 1),
            fit: round_to(fit, 1),
            supply: round_to(supply, 1),
            gatekeeper: round_to(rightsholder, 1),
            timing: round_to(timing, 1),
        },
    }
}

/// Fraction of indicators that are LIVE.
pub fn compute_coverage(indicators: &[IndicatorResult]) -> f64 {
    if indicators.is_empty() {
        return 0.0;
    }
    let live = indicators
        .iter()
        .filter(|i| i.status == IndicatorStatus::Live)
        .count();
    round_to(live as f64 / indicators.len() as f64, 2)
}

/// Three lines: dominant positive driver, dominant risk, timing advice.
pub fn generate_explanations(
    indicators: &[IndicatorResult],
    dims: &DimensionScores,
    settings: &Settings,
) -> Vec<String> {
    let weighted: Vec<(&str, f64, f64)> = vec![
        ("demand", settings.opp_weight_demand, dims.demand),
        ("diffusion", settings.opp_weight_diffusion, dims.diffusion),
        ("fit", settings.opp_weight_fit, dims.fit),
        ("supply", settings.opp_risk_weight_supply, dims.supply),
        ("gatekeeper", settings.opp_risk_weight_gatekeeper, dims.gatekeeper),
    ];

    let mut deltas: Vec<(&str, f64, f64)> = weighted
        .into_iter()
        .map(|(dim, weight, score)| (dim, weight * (score - 50.0), score))
        .collect();
    deltas.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut explanations = Vec::new();

    if let Some((dim, _, score)) = deltas.iter().find(|d| d.1 > 0.0) {
        let label = indicators
            .iter()
            .filter(|i| i.dimension == *dim)
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
            .map(|i| i.label.clone())
            .unwrap_or_else(|| dim.to_string());
        explanations.push(format!("Strong {}: {} at {:.0}", dim, label, score));
    }

    if let Some((dim, _, score)) = deltas.iter().find(|d| d.1 < 0.0) {
        let label = indicators
            .iter()
            .filter(|i| i.dimension == *dim)
            .min_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
            .map(|i| i.label.clone())
            .unwrap_or_else(|| dim.to_string());
        explanations.push(format!("Risk: {} at {:.0}", label, score));
    } else if let Some((dim, _, score)) = deltas
        .iter()
        .find(|d| (d.0 == "supply" || d.0 == "gatekeeper") && d.2 > 50.0)
    {
        explanations.push(format!("Risk: {} pressure at {:.0}", dim, score));
    }

    if dims.timing >= 70.0 {
        explanations.push("Timing is favorable: consider starting BD now".to_string());
    } else if dims.timing >= 40.0 {
        explanations.push("Timing is neutral: monitor for momentum shift".to_string());
    } else {
        explanations.push("Timing is unfavorable: wait for better signals".to_string());
    }

    explanations.truncate(3);
    explanations
}
