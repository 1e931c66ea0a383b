//! Derived statistics over a composite series.
//!
//! Everything here is pure: the caller supplies the composite values in date
//! order and the previous week-over-week reading, and gets back the derived
//! row. Missing statistics stay `None`; short series never error.

use signal_core::SignalLight;

/// Thresholds feeding the traffic-light rule.
#[derive(Debug, Clone, Copy)]
pub struct SignalThresholds {
    pub wow_growth: f64,
    pub breakout_percentile: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            wow_growth: 0.30,
            breakout_percentile: 85.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub ma7: Option<f64>,
    pub ma28: Option<f64>,
    pub wow_growth: Option<f64>,
    pub acceleration: Option<bool>,
    pub breakout_percentile: Option<f64>,
    pub signal_light: Option<SignalLight>,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn round_to(v: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (v * factor).round() / factor
}

/// Rule-based traffic light: green / yellow / red.
pub fn compute_signal_light(
    wow_growth: Option<f64>,
    acceleration: Option<bool>,
    breakout_pct: Option<f64>,
    ma7: Option<f64>,
    ma28: Option<f64>,
    thresholds: &SignalThresholds,
) -> SignalLight {
    let green = wow_growth.map(|w| w > thresholds.wow_growth).unwrap_or(false)
        && acceleration == Some(true)
        && breakout_pct
            .map(|b| b >= thresholds.breakout_percentile)
            .unwrap_or(false);
    if green {
        return SignalLight::Green;
    }

    // Red: MA7 below MA28 while WoW is negative.
    if let (Some(ma7), Some(ma28), Some(wow)) = (ma7, ma28, wow_growth) {
        if ma7 < ma28 && wow < 0.0 {
            return SignalLight::Red;
        }
    }

    SignalLight::Yellow
}

/// Compute the derived row for the latest date of `values`.
///
/// `values` is the composite series up to and including the target date;
/// `trailing_window` is the up-to-180-day distribution used for the breakout
/// percentile; `prev_wow` is the last recorded week-over-week growth from
/// the immediately preceding step of the walk.
pub fn compute_aggregation(
    values: &[f64],
    trailing_window: &[f64],
    prev_wow: Option<f64>,
    thresholds: &SignalThresholds,
) -> Aggregation {
    if values.len() < 7 {
        return Aggregation::default();
    }

    let last7 = &values[values.len() - 7..];
    let ma7 = mean(last7);
    let ma28 = if values.len() >= 28 {
        Some(mean(&values[values.len() - 28..]))
    } else {
        None
    };

    let wow_growth = if values.len() >= 14 {
        let avg_this = ma7;
        let avg_prev = mean(&values[values.len() - 14..values.len() - 7]);
        Some(if avg_prev > 0.0 {
            avg_this / avg_prev - 1.0
        } else {
            0.0
        })
    } else {
        None
    };

    // Acceleration: positive WoW that strictly exceeds the previous positive reading.
    let acceleration = match (wow_growth, prev_wow) {
        (Some(wow), Some(prev)) => Some(wow > 0.0 && prev > 0.0 && wow > prev),
        _ => Some(false),
    };

    let breakout_percentile = if trailing_window.len() >= 7 {
        let rank = trailing_window.iter().filter(|&&v| v <= ma7).count();
        Some(rank as f64 / trailing_window.len() as f64 * 100.0)
    } else {
        None
    };

    let signal_light = Some(compute_signal_light(
        wow_growth,
        acceleration,
        breakout_percentile,
        Some(ma7),
        ma28,
        thresholds,
    ));

    Aggregation {
        ma7: Some(round_to(ma7, 2)),
        ma28: ma28.map(|v| round_to(v, 2)),
        wow_growth: wow_growth.map(|v| round_to(v, 4)),
        acceleration,
        breakout_percentile: breakout_percentile.map(|v| round_to(v, 1)),
        signal_light,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(wow: f64, bp: f64) -> SignalThresholds {
        SignalThresholds {
            wow_growth: wow,
            breakout_percentile: bp,
        }
    }

    #[test]
    fn short_series_yields_all_nulls() {
        let agg = compute_aggregation(&[1.0; 6], &[1.0; 6], None, &SignalThresholds::default());
        assert_eq!(agg, Aggregation::default());
    }

    #[test]
    fn ma28_null_below_28_values() {
        let values: Vec<f64> = (0..27).map(|i| i as f64).collect();
        let agg = compute_aggregation(&values, &values, None, &SignalThresholds::default());
        assert!(agg.ma7.is_some());
        assert!(agg.ma28.is_none());
    }

    #[test]
    fn wow_with_zero_prior_week_is_zero_not_error() {
        let mut values = vec![0.0; 7];
        values.extend([10.0; 7]);
        let agg = compute_aggregation(&values, &values, None, &SignalThresholds::default());
        assert_eq!(agg.wow_growth, Some(0.0));
    }

    #[test]
    fn acceleration_requires_strictly_increasing_positive_wow() {
        let mut values = vec![10.0; 7];
        values.extend([15.0; 7]);
        let agg = compute_aggregation(&values, &values, Some(0.2), &SignalThresholds::default());
        // wow = 0.5 > prev 0.2, both positive
        assert_eq!(agg.acceleration, Some(true));

        let agg = compute_aggregation(&values, &values, Some(0.8), &SignalThresholds::default());
        assert_eq!(agg.acceleration, Some(false));

        let agg = compute_aggregation(&values, &values, None, &SignalThresholds::default());
        assert_eq!(agg.acceleration, Some(false));
    }

    #[test]
    fn green_light_scenario() {
        // 28 days of strictly-increasing values 50..=77: last-7 avg 74,
        // prior-7 avg 67, so wow = 74/67 - 1.
        let values: Vec<f64> = (50..78).map(|v| v as f64).collect();
        let agg = compute_aggregation(&values, &values, Some(0.05), &t(0.10, 85.0));

        let wow = agg.wow_growth.unwrap();
        assert!((wow - 0.1045).abs() < 0.001, "wow = {}", wow);
        assert_eq!(agg.acceleration, Some(true));
        // 25 of 28 window values sit at or below the 7-day average.
        let bp = agg.breakout_percentile.unwrap();
        assert!((bp - 89.3).abs() < 0.1, "bp = {}", bp);
        assert_eq!(agg.signal_light, Some(signal_core::SignalLight::Green));
    }

    #[test]
    fn red_light_when_declining_below_ma28() {
        // Long decline: ma7 < ma28 and negative wow.
        let values: Vec<f64> = (0..40).map(|i| 100.0 - i as f64 * 2.0).collect();
        let agg = compute_aggregation(&values, &values, None, &SignalThresholds::default());
        assert_eq!(agg.signal_light, Some(signal_core::SignalLight::Red));
    }

    #[test]
    fn breakout_uses_leq_rank_convention() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        // ma7 = 4.0; four of seven window values are <= 4.0
        let agg = compute_aggregation(&values, &values, None, &SignalThresholds::default());
        let bp = agg.breakout_percentile.unwrap();
        assert!((bp - 4.0 / 7.0 * 100.0).abs() < 0.1);
    }

    #[test]
    fn breakout_null_for_thin_window() {
        let values = vec![1.0; 10];
        let agg = compute_aggregation(&values, &values[..5], None, &SignalThresholds::default());
        assert!(agg.breakout_percentile.is_none());
    }
}
