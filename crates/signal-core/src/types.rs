use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One raw demand measurement for a keyword on one day, normalised to 0-100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplePoint {
    pub date: NaiveDate,
    pub value: i64,
}

/// Collector failure classification. `Auth` is terminal for the attempt;
/// everything else is retryable subject to the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Auth,
    RateLimit,
    Timeout,
    Empty,
    Network,
    Unknown,
}

impl SourceErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceErrorKind::Auth => "auth",
            SourceErrorKind::RateLimit => "rate_limit",
            SourceErrorKind::Timeout => "timeout",
            SourceErrorKind::Empty => "empty",
            SourceErrorKind::Network => "network",
            SourceErrorKind::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, SourceErrorKind::Auth)
    }
}

/// Outcome of one keyword fetch against an external source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectResult {
    pub success: bool,
    #[serde(default)]
    pub points: Vec<SamplePoint>,
    pub http_code: Option<u16>,
    pub error_code: Option<SourceErrorKind>,
    pub message: Option<String>,
}

impl CollectResult {
    pub fn ok(points: Vec<SamplePoint>, http_code: Option<u16>) -> Self {
        Self {
            success: true,
            points,
            http_code,
            error_code: None,
            message: None,
        }
    }

    pub fn err(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            points: Vec::new(),
            http_code: None,
            error_code: Some(kind),
            message: Some(message.into()),
        }
    }

    pub fn err_with_code(kind: SourceErrorKind, http_code: u16, message: impl Into<String>) -> Self {
        Self {
            http_code: Some(http_code),
            ..Self::err(kind, message)
        }
    }
}

/// Momentum traffic light derived from the composite series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalLight {
    Green,
    Yellow,
    Red,
}

impl SignalLight {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalLight::Green => "green",
            SignalLight::Yellow => "yellow",
            SignalLight::Red => "red",
        }
    }
}

/// Per-(ip, source) freshness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warn,
    Down,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warn => "warn",
            HealthStatus::Down => "down",
        }
    }
}

/// Clamp helper shared by the scoring engines.
pub fn clamp(lo: f64, hi: f64, val: f64) -> f64 {
    val.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_is_not_retryable() {
        assert!(!SourceErrorKind::Auth.is_retryable());
        assert!(SourceErrorKind::RateLimit.is_retryable());
        assert!(SourceErrorKind::Empty.is_retryable());
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(0.0, 100.0, 150.0), 100.0);
        assert_eq!(clamp(0.0, 100.0, -3.0), 0.0);
        assert_eq!(clamp(-20.0, 20.0, 7.5), 7.5);
    }
}
