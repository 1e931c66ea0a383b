//! Alert signals derived from recent composite rows.

use ip_store::CompositeDailyRow;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub alert_date: String,
}

/// Compute alerts from recent rows, oldest first.
pub fn compute_alerts(recent: &[CompositeDailyRow], breakout_threshold: f64) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let Some(latest) = recent.last() else {
        return alerts;
    };

    if let Some(bp) = latest.breakout_percentile {
        if bp >= breakout_threshold {
            alerts.push(Alert {
                alert_type: "breakout".to_string(),
                message: format!("Breakout detected: 7d avg at P{:.0} of 6-month range", bp),
                alert_date: latest.date.to_string(),
            });
        }
    }

    // Peak turn: MA7 crosses below MA28.
    if recent.len() >= 2 {
        let prev = &recent[recent.len() - 2];
        if let (Some(p7), Some(p28), Some(l7), Some(l28)) =
            (prev.ma7, prev.ma28, latest.ma7, latest.ma28)
        {
            if p7 >= p28 && l7 < l28 {
                alerts.push(Alert {
                    alert_type: "peak_turn".to_string(),
                    message: "Peak turn: MA7 crossed below MA28, trend may be declining"
                        .to_string(),
                    alert_date: latest.date.to_string(),
                });
            }
        }
    }

    // Spike: current value beyond mean + 2 sigma.
    if recent.len() >= 30 {
        let vals: Vec<f64> = recent.iter().map(|r| r.composite_value).collect();
        let mean = vals.iter().sum::<f64>() / vals.len() as f64;
        let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (vals.len() - 1) as f64;
        let std = var.sqrt();
        if std > 0.0 && latest.composite_value > mean + 2.0 * std {
            alerts.push(Alert {
                alert_type: "spike".to_string(),
                message: format!(
                    "Spike: current value {:.0} exceeds mean+2 sigma ({:.0})",
                    latest.composite_value,
                    mean + 2.0 * std
                ),
                alert_date: latest.date.to_string(),
            });
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(day: u32, composite: f64, ma7: Option<f64>, ma28: Option<f64>) -> CompositeDailyRow {
        CompositeDailyRow {
            id: format!("row-{day}"),
            ip_id: "ip".to_string(),
            geo: "TW".to_string(),
            timeframe: "12m".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Duration::days(day as i64),
            composite_value: composite,
            ma7,
            ma28,
            wow_growth: None,
            acceleration: None,
            breakout_percentile: None,
            signal_light: None,
        }
    }

    #[test]
    fn empty_input_no_alerts() {
        assert!(compute_alerts(&[], 85.0).is_empty());
    }

    #[test]
    fn breakout_alert_fires_at_threshold() {
        let mut latest = row(0, 50.0, None, None);
        latest.breakout_percentile = Some(92.0);
        let alerts = compute_alerts(&[latest], 85.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "breakout");
    }

    #[test]
    fn peak_turn_detects_ma_cross() {
        let prev = row(0, 50.0, Some(60.0), Some(55.0));
        let latest = row(1, 48.0, Some(54.0), Some(55.0));
        let alerts = compute_alerts(&[prev, latest], 85.0);
        assert!(alerts.iter().any(|a| a.alert_type == "peak_turn"));
    }

    #[test]
    fn spike_needs_thirty_rows() {
        let mut rows: Vec<CompositeDailyRow> = (0..30).map(|i| row(i, 50.0, None, None)).collect();
        rows.last_mut().unwrap().composite_value = 99.0;
        let alerts = compute_alerts(&rows, 85.0);
        assert!(alerts.iter().any(|a| a.alert_type == "spike"));
    }
}
