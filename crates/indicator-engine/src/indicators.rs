//! The 13 indicators feeding the opportunity and BD scores.
//!
//! LIVE indicators derive from collected data, MANUAL indicators from
//! human-supplied [0,1] inputs, and anything without evidence degrades to
//! MISSING with a neutral score of 50 so downstream scoring never aborts.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ip_store::{CompositeDailyRow, IpEventRow};
use signal_core::clamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndicatorStatus {
    Live,
    Manual,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub key: String,
    pub label: String,
    pub dimension: String,
    pub status: IndicatorStatus,
    #[serde(rename = "score_0_100")]
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    #[serde(default)]
    pub debug: Vec<String>,
}

impl IndicatorResult {
    fn missing(key: &str, label: &str, dimension: &str, reason: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            dimension: dimension.to_string(),
            status: IndicatorStatus::Missing,
            score: 50.0,
            raw: None,
            debug: vec![reason.to_string()],
        }
    }
}

/// (key, label, dimension, live) for all 13 indicators, in display order.
pub const INDICATOR_DEFS: &[(&str, &str, &str, bool)] = &[
    ("search_momentum", "Search Momentum", "demand", true),
    ("social_buzz", "Social Buzz", "demand", false),
    ("video_momentum", "Video Momentum", "demand", false),
    ("cross_alias_consistency", "Cross-alias Consistency", "diffusion", true),
    ("cross_platform_presence", "Cross-platform Presence", "diffusion", false),
    ("ecommerce_density", "E-commerce Density", "supply", false),
    ("fnb_collab_saturation", "F&B Collab Saturation", "supply", false),
    ("merch_pressure", "Merch Pressure", "supply", false),
    ("rightsholder_intensity", "Rightsholder Intensity", "gatekeeper", false),
    ("timing_window", "Timing Window", "gatekeeper", true),
    ("adult_fit", "Adult Fit", "fit", false),
    ("giftability", "Giftability", "fit", false),
    ("brand_aesthetic", "Brand Aesthetic", "fit", false),
];

/// Accepted keys for manual input upserts: the manual indicators plus the
/// timing override.
pub fn is_valid_input_key(key: &str) -> bool {
    key == "timing_window_override"
        || INDICATOR_DEFS
            .iter()
            .any(|(k, _, _, live)| !live && *k == key)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Demand momentum from the latest composite row: neutral 50 shifted by WoW
/// growth, acceleration, and breakout contributions.
pub fn compute_search_momentum(latest: Option<&CompositeDailyRow>) -> IndicatorResult {
    let Some(latest) = latest else {
        return IndicatorResult::missing(
            "search_momentum",
            "Search Momentum",
            "demand",
            "No daily trend data",
        );
    };
    let Some(wow) = latest.wow_growth else {
        return IndicatorResult::missing(
            "search_momentum",
            "Search Momentum",
            "demand",
            "No daily trend data",
        );
    };

    let mut score = 50.0;
    score += clamp(-20.0, 20.0, wow * 100.0 * 0.5);
    if latest.acceleration == Some(true) {
        score += 15.0;
    }
    if let Some(bp) = latest.breakout_percentile {
        score += clamp(-15.0, 15.0, (bp - 50.0) * 0.3);
    }
    let score = clamp(0.0, 100.0, score);

    IndicatorResult {
        key: "search_momentum".to_string(),
        label: "Search Momentum".to_string(),
        dimension: "demand".to_string(),
        status: IndicatorStatus::Live,
        score: round1(score),
        raw: Some(serde_json::json!({
            "wow_growth": latest.wow_growth,
            "acceleration": latest.acceleration,
            "breakout_percentile": latest.breakout_percentile,
        })),
        debug: vec![
            format!("WoW={:.4}", wow),
            format!("accel={:?}", latest.acceleration),
            format!("bp={:?}", latest.breakout_percentile),
        ],
    }
}

/// Manual indicator from a stored [0,1] input; neutral MISSING otherwise.
pub fn manual_score(
    key: &str,
    label: &str,
    dimension: &str,
    inputs: &HashMap<String, f64>,
) -> IndicatorResult {
    if let Some(value) = inputs.get(key) {
        return IndicatorResult {
            key: key.to_string(),
            label: label.to_string(),
            dimension: dimension.to_string(),
            status: IndicatorStatus::Manual,
            score: round1(clamp(0.0, 100.0, value * 100.0)),
            raw: None,
            debug: vec![format!("User input: {}", value)],
        };
    }
    IndicatorResult::missing(key, label, dimension, "Default neutral (no user input)")
}

/// Launch-window timing. Priority: manual override, then the nearest event,
/// then the latest signal light, then MISSING.
pub fn compute_timing_window(
    events: &[IpEventRow],
    latest: Option<&CompositeDailyRow>,
    manual_override: Option<f64>,
    lead_time_weeks: i64,
    today: NaiveDate,
) -> IndicatorResult {
    if let Some(value) = manual_override {
        if value != 0.5 {
            return IndicatorResult {
                key: "timing_window".to_string(),
                label: "Timing Window".to_string(),
                dimension: "gatekeeper".to_string(),
                status: IndicatorStatus::Manual,
                score: round1(clamp(0.0, 100.0, value * 100.0)),
                raw: None,
                debug: vec![format!("Manual override: {}", value)],
            };
        }
    }

    if !events.is_empty() {
        let mut upcoming: Vec<&IpEventRow> =
            events.iter().filter(|e| e.event_date >= today).collect();
        upcoming.sort_by_key(|e| e.event_date);

        if let Some(nearest) = upcoming.first() {
            let days_until = (nearest.event_date - today).num_days();
            let weeks_until = days_until as f64 / 7.0;

            // Sweet spot sits just inside the BD lead time.
            let center = (lead_time_weeks - 1) as f64;
            let score = if (8.0..=14.0).contains(&weeks_until) {
                let dist = (weeks_until - center).abs() / 3.0;
                95.0 - dist * 15.0
            } else if weeks_until > 14.0 && weeks_until <= 20.0 {
                75.0 - (weeks_until - 14.0) * 2.5
            } else if weeks_until > 20.0 {
                (60.0 - (weeks_until - 20.0)).max(40.0)
            } else if weeks_until >= 4.0 {
                50.0 + (weeks_until - 4.0) * 5.0
            } else {
                25.0 + weeks_until * 6.0
            };

            return IndicatorResult {
                key: "timing_window".to_string(),
                label: "Timing Window".to_string(),
                dimension: "gatekeeper".to_string(),
                status: IndicatorStatus::Live,
                score: round1(clamp(0.0, 100.0, score)),
                raw: Some(serde_json::json!({
                    "event": nearest.title,
                    "event_date": nearest.event_date.to_string(),
                    "event_type": nearest.event_type,
                    "weeks_until": (weeks_until * 10.0).round() / 10.0,
                })),
                debug: vec![format!(
                    "Next event: {} in {:.1}w ({})",
                    nearest.title, weeks_until, nearest.event_date
                )],
            };
        }

        let recent_past = events
            .iter()
            .filter(|e| e.event_date < today && (today - e.event_date).num_days() <= 28)
            .max_by_key(|e| e.event_date);
        if let Some(latest_past) = recent_past {
            let days_ago = (today - latest_past.event_date).num_days();
            let score = (60.0 - days_ago as f64 * 1.5).max(20.0);
            return IndicatorResult {
                key: "timing_window".to_string(),
                label: "Timing Window".to_string(),
                dimension: "gatekeeper".to_string(),
                status: IndicatorStatus::Live,
                score: round1(clamp(0.0, 100.0, score)),
                raw: Some(serde_json::json!({
                    "event": latest_past.title,
                    "event_date": latest_past.event_date.to_string(),
                    "days_ago": days_ago,
                })),
                debug: vec![format!(
                    "Recent event: {} was {}d ago, momentum fading",
                    latest_past.title, days_ago
                )],
            };
        }
    }

    if let Some(light) = latest.and_then(|l| l.signal_light.as_deref()) {
        let score = match light {
            "green" => 75.0,
            "red" => 25.0,
            _ => 50.0,
        };
        return IndicatorResult {
            key: "timing_window".to_string(),
            label: "Timing Window".to_string(),
            dimension: "gatekeeper".to_string(),
            status: IndicatorStatus::Live,
            score,
            raw: Some(serde_json::json!({"fallback": "trend", "signal_light": light})),
            debug: vec![format!("No events, fallback to trend signal_light={}", light)],
        };
    }

    IndicatorResult::missing(
        "timing_window",
        "Timing Window",
        "gatekeeper",
        "No events and no trend data",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn composite(wow: Option<f64>, accel: Option<bool>, bp: Option<f64>) -> CompositeDailyRow {
        CompositeDailyRow {
            id: "c".to_string(),
            ip_id: "ip".to_string(),
            geo: "TW".to_string(),
            timeframe: "12m".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            composite_value: 50.0,
            ma7: Some(50.0),
            ma28: Some(48.0),
            wow_growth: wow,
            acceleration: accel,
            breakout_percentile: bp,
            signal_light: Some("yellow".to_string()),
        }
    }

    fn event(days_from_today: i64, today: NaiveDate) -> IpEventRow {
        IpEventRow {
            id: "e".to_string(),
            ip_id: "ip".to_string(),
            event_type: "anime_air".to_string(),
            title: "Season 2".to_string(),
            event_date: today + chrono::Duration::days(days_from_today),
            source: Some("catalogue".to_string()),
            source_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn search_momentum_missing_without_data() {
        let result = compute_search_momentum(None);
        assert_eq!(result.status, IndicatorStatus::Missing);
        assert_eq!(result.score, 50.0);
    }

    #[test]
    fn search_momentum_combines_contributions() {
        // wow 0.2 -> +10, acceleration -> +15, bp 90 -> +12
        let row = composite(Some(0.2), Some(true), Some(90.0));
        let result = compute_search_momentum(Some(&row));
        assert_eq!(result.status, IndicatorStatus::Live);
        assert_eq!(result.score, 87.0);
    }

    #[test]
    fn search_momentum_clamps_extremes() {
        let row = composite(Some(5.0), Some(true), Some(100.0));
        let result = compute_search_momentum(Some(&row));
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn manual_score_maps_unit_interval() {
        let mut inputs = HashMap::new();
        inputs.insert("giftability".to_string(), 0.8);
        let result = manual_score("giftability", "Giftability", "fit", &inputs);
        assert_eq!(result.status, IndicatorStatus::Manual);
        assert_eq!(result.score, 80.0);

        let result = manual_score("adult_fit", "Adult Fit", "fit", &inputs);
        assert_eq!(result.status, IndicatorStatus::Missing);
        assert_eq!(result.score, 50.0);
    }

    #[test]
    fn timing_near_event_sweet_spot() {
        // Event in 10 weeks with lead time 12: dist = |10-11|/3, score = 95 - 5 = 90.
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let events = vec![event(70, today)];
        let result = compute_timing_window(&events, None, None, 12, today);
        assert_eq!(result.status, IndicatorStatus::Live);
        assert_eq!(result.score, 90.0);
    }

    #[test]
    fn timing_override_beats_events() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let events = vec![event(70, today)];
        let result = compute_timing_window(&events, None, Some(0.9), 12, today);
        assert_eq!(result.status, IndicatorStatus::Manual);
        assert_eq!(result.score, 90.0);

        // A neutral 0.5 override does not count as an override.
        let result = compute_timing_window(&events, None, Some(0.5), 12, today);
        assert_eq!(result.status, IndicatorStatus::Live);
    }

    #[test]
    fn timing_recent_past_event_fades() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let events = vec![event(-10, today)];
        let result = compute_timing_window(&events, None, None, 12, today);
        assert_eq!(result.status, IndicatorStatus::Live);
        assert_eq!(result.score, 45.0);
    }

    #[test]
    fn timing_falls_back_to_signal_light_then_missing() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let mut row = composite(Some(0.1), Some(false), Some(60.0));
        row.signal_light = Some("green".to_string());
        let result = compute_timing_window(&[], Some(&row), None, 12, today);
        assert_eq!(result.score, 75.0);

        let result = compute_timing_window(&[], None, None, 12, today);
        assert_eq!(result.status, IndicatorStatus::Missing);
        assert_eq!(result.score, 50.0);
    }

    #[test]
    fn input_key_validation() {
        assert!(is_valid_input_key("social_buzz"));
        assert!(is_valid_input_key("timing_window_override"));
        assert!(!is_valid_input_key("search_momentum"));
        assert!(!is_valid_input_key("bogus"));
    }
}
