//! Video sync: search per alias, batch the stats fetch, keep only videos
//! whose title actually mentions the IP.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use ip_store::new_id;
use signal_core::{HealthStatus, Settings};
use source_health::{ConfidenceService, HealthService};
use video_client::VideoClient;

use crate::matching::alias_appears_in;
use crate::search_terms;

const SOURCE_KEY: &str = "video";
const MAX_SEARCH_QUERIES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct VideoSyncResult {
    pub ip_id: String,
    pub ip_name: String,
    pub videos_added: i64,
    pub errors: Vec<String>,
}

pub struct VideoSync {
    pool: SqlitePool,
    settings: Settings,
    client: Arc<VideoClient>,
}

impl VideoSync {
    pub fn new(pool: SqlitePool, settings: Settings, client: Arc<VideoClient>) -> Self {
        Self {
            pool,
            settings,
            client,
        }
    }

    /// Sync one IP's video metrics.
    pub async fn sync_ip(&self, ip_id: &str) -> Result<VideoSyncResult> {
        let run_started = Utc::now();
        let mut errors: Vec<String> = Vec::new();
        let mut videos_added = 0i64;

        if !self.client.has_credentials() {
            return Ok(VideoSyncResult {
                ip_id: ip_id.to_string(),
                ip_name: "unknown".to_string(),
                videos_added: 0,
                errors: vec!["VIDEO_API_KEY not configured".to_string()],
            });
        }

        let ip: Option<(String,)> = sqlx::query_as("SELECT name FROM ip WHERE id = ?")
            .bind(ip_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((ip_name,)) = ip else {
            return Ok(VideoSyncResult {
                ip_id: ip_id.to_string(),
                ip_name: "unknown".to_string(),
                videos_added: 0,
                errors: vec!["IP not found".to_string()],
            });
        };

        let terms =
            search_terms(&self.pool, ip_id, &ip_name, &["en", "jp"], MAX_SEARCH_QUERIES).await?;
        let all_alias_strings: Vec<String> = {
            let mut v: Vec<(String,)> =
                sqlx::query_as("SELECT alias FROM ip_alias WHERE ip_id = ? AND enabled = 1")
                    .bind(ip_id)
                    .fetch_all(&self.pool)
                    .await?;
            let mut strings = vec![ip_name.clone()];
            strings.extend(v.drain(..).map(|(a,)| a));
            strings
        };

        let published_after = Utc::now() - Duration::days(self.settings.video_recency_days);

        let mut video_ids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for term in &terms {
            match self
                .client
                .search_videos(term, self.settings.video_max_results, Some(published_after))
                .await
            {
                Ok(items) => {
                    for item in items {
                        if let Some(id) = item.id.video_id {
                            if seen.insert(id.clone()) {
                                video_ids.push(id);
                            }
                        }
                    }
                }
                Err(e) => errors.push(format!("video search '{}' failed: {}", term, e)),
            }
        }

        if video_ids.is_empty() {
            errors.push(format!(
                "No videos found for '{}' (searched: {:?})",
                ip_name, terms
            ));
        } else {
            let details = match self.client.get_video_stats(&video_ids).await {
                Ok(d) => d,
                Err(e) => {
                    errors.push(format!("video stats fetch failed: {}", e));
                    Vec::new()
                }
            };

            for video in details {
                let Some(snippet) = &video.snippet else { continue };
                let title = snippet.title.clone().unwrap_or_default();

                // The title must actually mention the IP.
                if !alias_appears_in(&all_alias_strings, &title) {
                    continue;
                }

                let stats = video.statistics.as_ref();
                let published_at = snippet
                    .published_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc));

                sqlx::query(
                    r#"
                    INSERT INTO video_metric
                        (id, ip_id, video_id, title, channel_title, published_at, view_count, like_count, comment_count, recorded_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(ip_id, video_id) DO UPDATE SET
                        title = excluded.title,
                        view_count = excluded.view_count,
                        like_count = excluded.like_count,
                        comment_count = excluded.comment_count,
                        recorded_at = excluded.recorded_at
                    "#,
                )
                .bind(new_id())
                .bind(ip_id)
                .bind(&video.id)
                .bind(&title)
                .bind(&snippet.channel_title)
                .bind(published_at)
                .bind(stats.map(|s| s.views()).unwrap_or(0))
                .bind(stats.map(|s| s.likes()).unwrap_or(0))
                .bind(stats.map(|s| s.comments()).unwrap_or(0))
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
                videos_added += 1;
            }
        }

        let success = videos_added > 0;
        let status = if success {
            HealthStatus::Ok
        } else if !video_ids.is_empty() {
            HealthStatus::Warn
        } else {
            HealthStatus::Down
        };

        let health = HealthService::new(self.pool.clone(), self.settings.clone());
        health
            .upsert_ip_source_health(
                ip_id,
                SOURCE_KEY,
                success,
                status,
                errors.first().map(|s| s.as_str()),
                videos_added,
            )
            .await?;
        health
            .record_source_run(
                SOURCE_KEY,
                run_started,
                if success { HealthStatus::Ok } else { HealthStatus::Warn },
                video_ids.len() as i64,
                videos_added,
                errors.len() as i64,
                errors.first().map(|s| s.as_str()),
            )
            .await?;

        if let Err(e) = ConfidenceService::new(self.pool.clone(), self.settings.clone())
            .compute_ip_confidence(ip_id)
            .await
        {
            tracing::warn!("Failed to recompute confidence for {}: {}", ip_id, e);
        }

        Ok(VideoSyncResult {
            ip_id: ip_id.to_string(),
            ip_name,
            videos_added,
            errors,
        })
    }

    pub async fn sync_all(&self) -> Result<Vec<VideoSyncResult>> {
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
