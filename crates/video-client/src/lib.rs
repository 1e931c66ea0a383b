//! Video-statistics connector (YouTube Data API v3).
//!
//! Quota economics drive the shape: search costs 100 units per call,
//! statistics cost 1 unit per batch of 50 ids, so callers search sparingly
//! and batch the stats fetch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use signal_core::{RateLimiter, SignalError};

const BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const REQUEST_INTERVAL: Duration = Duration::from_secs(1);
const STATS_BATCH: usize = 50;

pub struct VideoClient {
    api_key: String,
    client: Client,
    limiter: RateLimiter,
}

impl VideoClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            limiter: RateLimiter::new(REQUEST_INTERVAL),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value, SignalError> {
        self.limiter.wait().await;

        let url = format!("{}{}", BASE_URL, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| SignalError::Api(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 403 {
            let body = response.text().await.unwrap_or_default();
            if body.contains("quotaExceeded") {
                tracing::error!("video API quota exceeded");
                return Err(SignalError::QuotaExhausted("video API daily quota".to_string()));
            }
            tracing::error!("video API forbidden: {}", body);
            return Err(SignalError::Api(format!("video API forbidden: {}", body)));
        }
        if !response.status().is_success() {
            return Err(SignalError::Api(format!(
                "video HTTP {} for {}",
                status, path
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SignalError::Decode(e.to_string()))
    }

    /// Search recent videos for a query. 100 quota units per call.
    pub async fn search_videos(
        &self,
        query: &str,
        max_results: u32,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoSearchItem>, SignalError> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("q", query.to_string()),
            ("type", "video".to_string()),
            ("maxResults", max_results.to_string()),
            ("order", "relevance".to_string()),
        ];
        if let Some(after) = published_after {
            params.push(("publishedAfter", after.format("%Y-%m-%dT%H:%M:%SZ").to_string()));
        }

        let body = self.get("/search", &params).await?;
        let parsed: SearchListResponse =
            serde_json::from_value(body).map_err(|e| SignalError::Decode(e.to_string()))?;
        Ok(parsed.items)
    }

    /// Statistics for a batch of video ids, chunked at the API limit of 50.
    pub async fn get_video_stats(&self, video_ids: &[String]) -> Result<Vec<VideoDetails>, SignalError> {
        let mut all = Vec::new();

        for chunk in video_ids.chunks(STATS_BATCH) {
            let body = self
                .get(
                    "/videos",
                    &[
                        ("part", "snippet,statistics".to_string()),
                        ("id", chunk.join(",")),
                    ],
                )
                .await?;
            let parsed: VideoListResponse =
                serde_json::from_value(body).map_err(|e| SignalError::Decode(e.to_string()))?;
            all.extend(parsed.items);
        }

        Ok(all)
    }
}

// Response structures

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<VideoSearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoSearchItem {
    pub id: SearchItemId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItemId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoDetails {
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    pub statistics: Option<VideoStatistics>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoSnippet {
    pub title: Option<String>,
    #[serde(rename = "channelTitle")]
    pub channel_title: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
}

/// The API returns counts as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoStatistics {
    #[serde(rename = "viewCount")]
    pub view_count: Option<String>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<String>,
    #[serde(rename = "commentCount")]
    pub comment_count: Option<String>,
}

impl VideoStatistics {
    pub fn views(&self) -> i64 {
        parse_count(&self.view_count)
    }

    pub fn likes(&self) -> i64 {
        parse_count(&self.like_count)
    }

    pub fn comments(&self) -> i64 {
        parse_count(&self.comment_count)
    }
}

fn parse_count(raw: &Option<String>) -> i64 {
    raw.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_counts_parse_from_strings() {
        let stats: VideoStatistics = serde_json::from_str(
            r#"{"viewCount": "123456", "likeCount": "789", "commentCount": "notanumber"}"#,
        )
        .unwrap();
        assert_eq!(stats.views(), 123456);
        assert_eq!(stats.likes(), 789);
        assert_eq!(stats.comments(), 0);
    }

    #[test]
    fn search_items_tolerate_missing_video_id() {
        let parsed: SearchListResponse =
            serde_json::from_str(r#"{"items": [{"id": {}}, {"id": {"videoId": "abc123"}}]}"#)
                .unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert!(parsed.items[0].id.video_id.is_none());
        assert_eq!(parsed.items[1].id.video_id.as_deref(), Some("abc123"));
    }
}
