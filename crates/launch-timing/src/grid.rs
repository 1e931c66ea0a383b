//! Weekly grid components.

use chrono::{Duration, NaiveDate};

use ip_store::IpEventRow;
use signal_core::clamp;

pub fn weeks_between(d1: NaiveDate, d2: NaiveDate) -> f64 {
    (d2 - d1).num_days() as f64 / 7.0
}

/// Linear extrapolation of the recent ma28 trend.
pub fn compute_demand_at_week(base_demand: f64, slope_per_week: f64, weeks_from_now: f64) -> f64 {
    clamp(0.0, 100.0, base_demand + slope_per_week * weeks_from_now)
}

/// Gaussian hype peak centered `peak_weeks_before` each event; the max
/// across events wins.
pub fn compute_event_boost(
    week_start: NaiveDate,
    events: &[IpEventRow],
    peak_weeks_before: i64,
    sigma_weeks: f64,
) -> f64 {
    let mut max_boost: f64 = 0.0;
    for event in events {
        let peak_date = event.event_date - Duration::weeks(peak_weeks_before);
        let dist = weeks_between(peak_date, week_start);
        let boost = 100.0 * (-(dist * dist) / (2.0 * sigma_weeks * sigma_weeks)).exp();
        max_boost = max_boost.max(boost);
    }
    clamp(0.0, 100.0, max_boost)
}

/// Static market saturation from the total recorded product count. More
/// products, more saturated; capped at 95.
pub fn compute_saturation(total_merch_count: i64) -> f64 {
    if total_merch_count <= 0 {
        return 0.0;
    }
    clamp(0.0, 95.0, 100.0 * (1.0 - (-(total_merch_count as f64) / 800.0).exp()))
}

/// Sigmoid in the planning buffer: tight timelines are risky, 15 weeks out
/// is the midpoint.
pub fn compute_operational_risk(weeks_from_now: f64) -> f64 {
    clamp(0.0, 100.0, 100.0 / (1.0 + (0.3 * (weeks_from_now - 15.0)).exp()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event_on(date: NaiveDate) -> IpEventRow {
        IpEventRow {
            id: "e".to_string(),
            ip_id: "ip".to_string(),
            event_type: "movie_release".to_string(),
            title: "The Movie".to_string(),
            event_date: date,
            source: None,
            source_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn demand_extrapolates_and_clamps() {
        assert_eq!(compute_demand_at_week(50.0, 2.0, 10.0), 70.0);
        assert_eq!(compute_demand_at_week(90.0, 5.0, 10.0), 100.0);
        assert_eq!(compute_demand_at_week(10.0, -3.0, 10.0), 0.0);
    }

    #[test]
    fn event_boost_peaks_before_the_event() {
        let event_date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let events = vec![event_on(event_date)];

        // Peak exactly 4 weeks before the event.
        let peak_week = event_date - Duration::weeks(4);
        let boost = compute_event_boost(peak_week, &events, 4, 3.0);
        assert!((boost - 100.0).abs() < 0.01);

        // Three weeks (one sigma) off the peak decays to ~60.7.
        let off_peak = peak_week + Duration::weeks(3);
        let boost = compute_event_boost(off_peak, &events, 4, 3.0);
        assert!((boost - 60.65).abs() < 0.1, "boost = {}", boost);
    }

    #[test]
    fn event_boost_takes_max_over_events() {
        let d1 = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let events = vec![event_on(d1), event_on(d2)];
        let week = d2 - Duration::weeks(4);
        let boost = compute_event_boost(week, &events, 4, 3.0);
        assert!((boost - 100.0).abs() < 0.01);
    }

    #[test]
    fn no_events_means_no_boost() {
        let week = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        assert_eq!(compute_event_boost(week, &[], 4, 3.0), 0.0);
    }

    #[test]
    fn saturation_grows_and_caps() {
        assert_eq!(compute_saturation(0), 0.0);
        assert_eq!(compute_saturation(-5), 0.0);
        let mid = compute_saturation(800);
        assert!((mid - 63.2).abs() < 0.1, "mid = {}", mid);
        assert_eq!(compute_saturation(100_000), 95.0);
    }

    #[test]
    fn operational_risk_sigmoid_midpoint() {
        let mid = compute_operational_risk(15.0);
        assert!((mid - 50.0).abs() < 0.01);
        assert!(compute_operational_risk(2.0) > 90.0);
        assert!(compute_operational_risk(30.0) < 10.0);
    }
}
