//! Freshness-based status derivation.

use chrono::{DateTime, Utc};

use signal_core::config::StalenessThresholds;
use signal_core::HealthStatus;

/// Derive ok/warn/down from the age of the last success. A source that has
/// never succeeded is down.
pub fn compute_source_status(
    last_success_at: Option<DateTime<Utc>>,
    thresholds: StalenessThresholds,
    now: DateTime<Utc>,
) -> HealthStatus {
    let Some(last_success) = last_success_at else {
        return HealthStatus::Down;
    };

    let age_hours = (now - last_success).num_seconds() as f64 / 3600.0;
    if age_hours <= thresholds.fresh_h as f64 {
        HealthStatus::Ok
    } else if age_hours <= thresholds.warn_h as f64 {
        HealthStatus::Warn
    } else {
        HealthStatus::Down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const T: StalenessThresholds = StalenessThresholds {
        fresh_h: 72,
        warn_h: 168,
    };

    #[test]
    fn never_succeeded_is_down() {
        assert_eq!(compute_source_status(None, T, Utc::now()), HealthStatus::Down);
    }

    #[test]
    fn age_at_fresh_limit_is_ok() {
        let now = Utc::now();
        let status = compute_source_status(Some(now - Duration::hours(72)), T, now);
        assert_eq!(status, HealthStatus::Ok);
    }

    #[test]
    fn age_between_fresh_and_warn_is_warn() {
        let now = Utc::now();
        let status = compute_source_status(Some(now - Duration::hours(100)), T, now);
        assert_eq!(status, HealthStatus::Warn);
    }

    #[test]
    fn age_beyond_warn_is_down() {
        let now = Utc::now();
        let status = compute_source_status(Some(now - Duration::hours(169)), T, now);
        assert_eq!(status, HealthStatus::Down);
    }
}
