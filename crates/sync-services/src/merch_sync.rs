//! Merch sync: product counts from the two e-commerce platforms, best alias
//! wins per platform.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use ip_store::new_id;
use merch_client::{RutenClient, ShopeeClient};
use signal_core::{HealthStatus, Settings};
use source_health::{ConfidenceService, HealthService};

use crate::search_terms;

const MAX_SEARCH_TERMS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct MerchSyncResult {
    pub ip_id: String,
    pub ip_name: String,
    pub shopee_count: Option<i64>,
    pub ruten_count: Option<i64>,
    pub errors: Vec<String>,
}

pub struct MerchSync {
    pool: SqlitePool,
    settings: Settings,
    shopee: Arc<ShopeeClient>,
    ruten: Arc<RutenClient>,
}

impl MerchSync {
    pub fn new(
        pool: SqlitePool,
        settings: Settings,
        shopee: Arc<ShopeeClient>,
        ruten: Arc<RutenClient>,
    ) -> Self {
        Self {
            pool,
            settings,
            shopee,
            ruten,
        }
    }

    async fn upsert_count(
        &self,
        ip_id: &str,
        platform: &str,
        term: &str,
        count: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO merch_product_count (id, ip_id, platform, query_term, product_count, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(ip_id, platform) DO UPDATE SET
                query_term = excluded.query_term,
                product_count = excluded.product_count,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(new_id())
        .bind(ip_id)
        .bind(platform)
        .bind(term)
        .bind(count)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Sync one IP's product counts from both platforms. Chinese-locale
    /// aliases lead because the platforms index Chinese listings.
    pub async fn sync_ip(&self, ip_id: &str) -> Result<MerchSyncResult> {
        let run_started = Utc::now();
        let mut errors: Vec<String> = Vec::new();

        let ip: Option<(String,)> = sqlx::query_as("SELECT name FROM ip WHERE id = ?")
            .bind(ip_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((ip_name,)) = ip else {
            return Ok(MerchSyncResult {
                ip_id: ip_id.to_string(),
                ip_name: "unknown".to_string(),
                shopee_count: None,
                ruten_count: None,
                errors: vec!["IP not found".to_string()],
            });
        };

        let terms = search_terms(&self.pool, ip_id, &ip_name, &["zh"], MAX_SEARCH_TERMS).await?;

        let mut best_shopee: Option<(i64, String)> = None;
        let mut best_ruten: Option<(i64, String)> = None;

        for term in &terms {
            if let Some(count) = self.shopee.search_product_count(term).await {
                if best_shopee.as_ref().map(|(c, _)| count > *c).unwrap_or(true) {
                    best_shopee = Some((count, term.clone()));
                }
            }
            if let Some(count) = self.ruten.search_product_count(term).await {
                if best_ruten.as_ref().map(|(c, _)| count > *c).unwrap_or(true) {
                    best_ruten = Some((count, term.clone()));
                }
            }
        }

        if best_shopee.is_none() {
            errors.push("shopee: all queries failed (likely anti-bot block)".to_string());
        }
        if best_ruten.is_none() {
            errors.push("ruten: all queries failed".to_string());
        }

        if let Some((count, term)) = &best_shopee {
            self.upsert_count(ip_id, "shopee", term, *count).await?;
        }
        if let Some((count, term)) = &best_ruten {
            self.upsert_count(ip_id, "ruten", term, *count).await?;
        }

        // One health/run row keyed "shopee" covers both TW e-commerce platforms.
        let success = best_shopee.is_some() || best_ruten.is_some();
        let total_items = [&best_shopee, &best_ruten]
            .iter()
            .filter(|b| b.is_some())
            .count() as i64;
        let status = if success { HealthStatus::Ok } else { HealthStatus::Down };
        let last_error = errors.first().map(|s| s.as_str());

        let health = HealthService::new(self.pool.clone(), self.settings.clone());
        health
            .upsert_ip_source_health(ip_id, "shopee", success, status, last_error, total_items)
            .await?;
        health
            .record_source_run(
                "shopee",
                run_started,
                status,
                2,
                total_items,
                2 - total_items,
                last_error,
            )
            .await?;

        if let Err(e) = ConfidenceService::new(self.pool.clone(), self.settings.clone())
            .compute_ip_confidence(ip_id)
            .await
        {
            tracing::warn!("Failed to recompute confidence for {}: {}", ip_id, e);
        }

        Ok(MerchSyncResult {
            ip_id: ip_id.to_string(),
            ip_name,
            shopee_count: best_shopee.map(|(c, _)| c),
            ruten_count: best_ruten.map(|(c, _)| c),
            errors,
        })
    }

    pub async fn sync_all(&self) -> Result<Vec<MerchSyncResult>> {
        let ip_ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM ip ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        let mut results = Vec::with_capacity(ip_ids.len());
        for (ip_id,) in ip_ids {
            results.push(self.sync_ip(&ip_id).await?);
        }
        Ok(results)
    }
}
