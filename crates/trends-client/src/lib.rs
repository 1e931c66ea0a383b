//! Search-trends collector.
//!
//! Talks to a hosted Google-Trends proxy (SearchApi-style `google_trends`
//! engine) and returns normalised 0-100 interest samples. This client is the
//! raw capability only; pacing, retry, and circuit breaking are applied by
//! `signal_core::RetryingCollector` at construction time.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use signal_core::{CollectResult, SamplePoint, SourceErrorKind, TrendCollector};

const BASE_URL: &str = "https://www.searchapi.io/api/v1/search";

/// Supported timeframe keys → engine time ranges.
fn map_timeframe(timeframe: &str) -> &'static str {
    match timeframe {
        "90d" => "today 3-m",
        "12m" => "today 12-m",
        "5y" => "today 5-y",
        _ => "today 12-m",
    }
}

/// Geo keys; `WW` means worldwide (empty geo param).
fn map_geo(geo: &str) -> &'static str {
    match geo {
        "TW" => "TW",
        "JP" => "JP",
        "US" => "US",
        _ => "",
    }
}

pub struct TrendsClient {
    api_key: String,
    client: Client,
}

impl TrendsClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { api_key, client }
    }
}

#[async_trait]
impl TrendCollector for TrendsClient {
    async fn fetch(&self, keyword: &str, geo: &str, timeframe: &str) -> CollectResult {
        let mut query = vec![
            ("engine", "google_trends".to_string()),
            ("q", keyword.to_string()),
            ("time", map_timeframe(timeframe).to_string()),
            ("api_key", self.api_key.clone()),
        ];
        let mapped_geo = map_geo(geo);
        if !mapped_geo.is_empty() {
            query.push(("geo", mapped_geo.to_string()));
        }

        let response = match self.client.get(BASE_URL).query(&query).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return CollectResult::err(SourceErrorKind::Timeout, e.to_string());
            }
            Err(e) => {
                return CollectResult::err(SourceErrorKind::Network, e.to_string());
            }
        };

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return CollectResult::err_with_code(
                SourceErrorKind::Auth,
                status,
                "trends API rejected credentials",
            );
        }
        if status == 429 {
            return CollectResult::err_with_code(
                SourceErrorKind::RateLimit,
                status,
                "trends API rate limited",
            );
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return CollectResult::err_with_code(
                SourceErrorKind::Unknown,
                status,
                format!("HTTP {}: {}", status, body),
            );
        }

        let body: TrendsResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => return CollectResult::err(SourceErrorKind::Unknown, e.to_string()),
        };

        let points = parse_timeline(&body);
        if points.is_empty() {
            return CollectResult::err_with_code(SourceErrorKind::Empty, status, "No data returned");
        }

        tracing::debug!(keyword, geo, timeframe, "fetched {} trend points", points.len());
        CollectResult::ok(points, Some(status))
    }

    fn source_key(&self) -> &'static str {
        "search_trends"
    }
}

fn parse_timeline(body: &TrendsResponse) -> Vec<SamplePoint> {
    let Some(iot) = &body.interest_over_time else {
        return Vec::new();
    };

    iot.timeline_data
        .iter()
        .filter_map(|entry| {
            let ts: i64 = entry.timestamp.parse().ok()?;
            let date = DateTime::from_timestamp(ts, 0)?.date_naive();
            let value = entry
                .values
                .first()
                .and_then(|v| v.extracted_value)
                .unwrap_or(0)
                .clamp(0, 100);
            Some(SamplePoint { date, value })
        })
        .collect()
}

// Response structures
#[derive(Debug, Deserialize)]
struct TrendsResponse {
    interest_over_time: Option<InterestOverTime>,
}

#[derive(Debug, Deserialize)]
struct InterestOverTime {
    #[serde(default)]
    timeline_data: Vec<TimelineEntry>,
}

#[derive(Debug, Deserialize)]
struct TimelineEntry {
    timestamp: String,
    #[serde(default)]
    values: Vec<TimelineValue>,
}

#[derive(Debug, Deserialize)]
struct TimelineValue {
    extracted_value: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timeline_and_clamps_values() {
        let body: TrendsResponse = serde_json::from_str(
            r#"{
                "interest_over_time": {
                    "timeline_data": [
                        {"timestamp": "1704067200", "values": [{"extracted_value": 42}]},
                        {"timestamp": "1704153600", "values": [{"extracted_value": 250}]},
                        {"timestamp": "not-a-number", "values": [{"extracted_value": 10}]}
                    ]
                }
            }"#,
        )
        .unwrap();

        let points = parse_timeline(&body);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 42);
        assert_eq!(points[1].value, 100);
    }

    #[test]
    fn missing_interest_section_yields_no_points() {
        let body: TrendsResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_timeline(&body).is_empty());
    }

    #[test]
    fn timeframe_and_geo_maps() {
        assert_eq!(map_timeframe("90d"), "today 3-m");
        assert_eq!(map_timeframe("unknown"), "today 12-m");
        assert_eq!(map_geo("WW"), "");
        assert_eq!(map_geo("TW"), "TW");
    }
}
