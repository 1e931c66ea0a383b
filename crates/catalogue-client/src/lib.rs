//! Anime-catalogue metadata connector (Jikan v4).
//!
//! Free API, no authentication; documented limit is 3 req/sec so the client
//! self-paces at one request per second. All failures degrade to errors the
//! sync layer records; nothing here panics.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use signal_core::{RateLimiter, SignalError};

const BASE_URL: &str = "https://api.jikan.moe/v4";
const REQUEST_INTERVAL: Duration = Duration::from_secs(1);

pub struct CatalogueClient {
    client: Client,
    limiter: RateLimiter,
}

impl Default for CatalogueClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogueClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            limiter: RateLimiter::new(REQUEST_INTERVAL),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value, SignalError> {
        self.limiter.wait().await;

        let url = format!("{}{}", BASE_URL, path);
        let mut response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| SignalError::Api(e.to_string()))?;

        // One polite retry on 429.
        if response.status().as_u16() == 429 {
            tracing::warn!("catalogue API rate limited, waiting 2s and retrying");
            tokio::time::sleep(Duration::from_secs(2)).await;
            response = self
                .client
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(|e| SignalError::Api(e.to_string()))?;
        }

        if !response.status().is_success() {
            return Err(SignalError::Api(format!(
                "catalogue HTTP {} for {}",
                response.status(),
                path
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SignalError::Decode(e.to_string()))
    }

    /// Search entries by name.
    pub async fn search(&self, name: &str, limit: u32) -> Result<Vec<CatalogueEntry>, SignalError> {
        let body = self
            .get(
                "/anime",
                &[("q", name.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        let parsed: SearchResponse =
            serde_json::from_value(body).map_err(|e| SignalError::Decode(e.to_string()))?;
        Ok(parsed.data)
    }

    /// Full entry details by catalogue id.
    pub async fn get_entry(&self, catalogue_id: i64) -> Result<Option<CatalogueEntry>, SignalError> {
        let body = self.get(&format!("/anime/{}", catalogue_id), &[]).await?;
        let parsed: EntryResponse =
            serde_json::from_value(body).map_err(|e| SignalError::Decode(e.to_string()))?;
        Ok(parsed.data)
    }

    /// Related entries (sequels, side stories, ...) for a catalogue id.
    pub async fn get_relations(&self, catalogue_id: i64) -> Result<Vec<RelationGroup>, SignalError> {
        let body = self
            .get(&format!("/anime/{}/relations", catalogue_id), &[])
            .await?;
        let parsed: RelationsResponse =
            serde_json::from_value(body).map_err(|e| SignalError::Decode(e.to_string()))?;
        Ok(parsed.data)
    }
}

// Response structures

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<CatalogueEntry>,
}

#[derive(Debug, Deserialize)]
struct EntryResponse {
    data: Option<CatalogueEntry>,
}

#[derive(Debug, Deserialize)]
struct RelationsResponse {
    #[serde(default)]
    data: Vec<RelationGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogueEntry {
    #[serde(rename = "mal_id")]
    pub id: i64,
    pub url: Option<String>,
    pub title: Option<String>,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub titles: Vec<AltTitle>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub status: Option<String>,
    pub aired: Option<AiredSpan>,
}

impl CatalogueEntry {
    /// All known titles of the entry, in preference order.
    pub fn all_titles(&self) -> Vec<&str> {
        let mut titles: Vec<&str> = Vec::new();
        for t in [&self.title, &self.title_english, &self.title_japanese] {
            if let Some(t) = t {
                titles.push(t.as_str());
            }
        }
        for alt in &self.titles {
            if let Some(t) = &alt.title {
                titles.push(t.as_str());
            }
        }
        titles
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AltTitle {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiredSpan {
    pub from: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationGroup {
    pub relation: Option<String>,
    #[serde(default)]
    pub entry: Vec<RelationEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationEntry {
    #[serde(rename = "mal_id")]
    pub id: i64,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_collects_all_titles() {
        let entry: CatalogueEntry = serde_json::from_str(
            r#"{
                "mal_id": 52991,
                "title": "Sousou no Frieren",
                "title_english": "Frieren: Beyond Journey's End",
                "title_japanese": "葬送のフリーレン",
                "titles": [{"type": "Synonym", "title": "Frieren"}]
            }"#,
        )
        .unwrap();

        let titles = entry.all_titles();
        assert_eq!(titles.len(), 4);
        assert!(titles.contains(&"Frieren"));
    }

    #[test]
    fn relations_parse() {
        let groups: RelationsResponse = serde_json::from_str(
            r#"{"data": [{"relation": "Sequel", "entry": [{"mal_id": 1, "type": "anime"}]}]}"#,
        )
        .unwrap();
        assert_eq!(groups.data[0].entry[0].id, 1);
    }
}
