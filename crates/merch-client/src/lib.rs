//! E-commerce supply-count connectors for the two Taiwanese platforms used
//! to estimate merch saturation.
//!
//! Both platforms block automated traffic aggressively, so every failure
//! path returns `Ok(None)` and lets the sync layer record the gap instead
//! of failing the run.

use std::time::Duration;

use reqwest::Client;
use signal_core::RateLimiter;

const REQUEST_INTERVAL: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Shopee TW search API.
pub struct ShopeeClient {
    client: Client,
    limiter: RateLimiter,
}

impl Default for ShopeeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ShopeeClient {
    pub fn new() -> Self {
        Self {
            client: build_client(),
            limiter: RateLimiter::new(REQUEST_INTERVAL),
        }
    }

    /// Total product count for a query, or None when blocked/unavailable.
    pub async fn search_product_count(&self, query: &str) -> Option<i64> {
        self.limiter.wait().await;

        let url = "https://shopee.tw/api/v4/search/search_items";
        let response = self
            .client
            .get(url)
            .query(&[
                ("keyword", query),
                ("limit", "1"),
                ("newest", "0"),
                ("order", "relevancy"),
                ("page_type", "search"),
                ("scenario", "PAGE_GLOBAL_SEARCH"),
                ("version", "2"),
            ])
            .header("User-Agent", BROWSER_UA)
            .header("Referer", "https://shopee.tw/")
            .header("Accept-Language", "zh-TW,zh;q=0.9,en;q=0.8")
            .header("Accept", "application/json")
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("shopee request error for '{}': {}", query, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("shopee returned {} for query '{}'", response.status(), query);
            return None;
        }

        let data: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("shopee bad body for '{}': {}", query, e);
                return None;
            }
        };

        if let Some(total) = data.get("total_count").and_then(|v| v.as_i64()) {
            return Some(total);
        }
        // Some API versions signal a short tail with `nomore`; approximate
        // with the returned item count.
        if data.get("nomore").is_some() {
            let items = data.get("items").and_then(|v| v.as_array());
            return Some(items.map(|a| a.len() as i64).unwrap_or(0));
        }

        tracing::warn!("shopee response missing total_count for '{}'", query);
        None
    }
}

/// Ruten (露天) search API.
pub struct RutenClient {
    client: Client,
    limiter: RateLimiter,
}

impl Default for RutenClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RutenClient {
    pub fn new() -> Self {
        Self {
            client: build_client(),
            limiter: RateLimiter::new(REQUEST_INTERVAL),
        }
    }

    /// Total product count for a query, or None when blocked/unavailable.
    pub async fn search_product_count(&self, query: &str) -> Option<i64> {
        self.limiter.wait().await;

        let url = "https://rtapi.ruten.com.tw/api/search/v3/index.php/core/prod";
        let response = self
            .client
            .get(url)
            .query(&[
                ("q", query),
                ("type", "direct"),
                ("sort", "rnk/dc"),
                ("offset", "1"),
                ("limit", "1"),
            ])
            .header("User-Agent", BROWSER_UA)
            .header("Accept", "application/json")
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("ruten request error for '{}': {}", query, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("ruten returned {} for query '{}'", response.status(), query);
            return None;
        }

        let data: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("ruten bad body for '{}': {}", query, e);
                return None;
            }
        };

        // The total-count key varies across API versions.
        for key in ["TotalCount", "TotalRows", "totalRows", "total_count"] {
            if let Some(val) = data.get(key).and_then(|v| v.as_i64()) {
                return Some(val);
            }
        }

        tracing::warn!("ruten response missing total count for '{}'", query);
        None
    }
}
