//! Catalogue sync: resolve an IP's catalogue id, walk its relation chains,
//! and turn upcoming entries into events.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use catalogue_client::{CatalogueClient, CatalogueEntry};
use ip_store::{new_id, IpRow};
use signal_core::{HealthStatus, Settings};
use source_health::{ConfidenceService, HealthService};

use crate::matching::is_title_match;
use crate::search_terms;

const SOURCE_KEY: &str = "catalogue";
const MAX_SEARCH_TERMS: usize = 5;
const MAX_RELATED_FETCHES: usize = 15;
const MAX_RELATION_DEPTH: u32 = 2;

/// Relation kinds worth following for event discovery.
const RELEVANT_RELATIONS: &[&str] = &[
    "Sequel",
    "Prequel",
    "Side Story",
    "Alternative Version",
    "Summary",
    "Other",
    "Spin-off",
];

#[derive(Debug, Clone, Serialize)]
pub struct CatalogueSyncResult {
    pub ip_id: String,
    pub ip_name: String,
    pub catalogue_id: Option<i64>,
    pub matched: bool,
    pub events_added: i64,
    pub events_skipped: i64,
    pub errors: Vec<String>,
}

fn parse_air_date(entry: &CatalogueEntry) -> Option<NaiveDate> {
    let from = entry.aired.as_ref()?.from.as_deref()?;
    DateTime::parse_from_rfc3339(from)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Map a catalogue entry's type/status to an event type. Finished entries
/// carry no future event value.
fn map_event_type(entry_type: Option<&str>, status: Option<&str>) -> Option<&'static str> {
    let entry_type = entry_type?;
    let status = status?;
    if status == "Finished Airing" {
        return None;
    }
    match entry_type.to_lowercase().as_str() {
        "movie" => Some("movie_release"),
        "tv" | "ova" | "special" | "ona" => Some("anime_air"),
        _ => None,
    }
}

pub struct CatalogueSync {
    pool: SqlitePool,
    settings: Settings,
    client: Arc<CatalogueClient>,
}

impl CatalogueSync {
    pub fn new(pool: SqlitePool, settings: Settings, client: Arc<CatalogueClient>) -> Self {
        Self {
            pool,
            settings,
            client,
        }
    }

    /// Resolve the catalogue id by searching name and aliases (en/jp first).
    async fn resolve_catalogue_id(
        &self,
        ip: &IpRow,
        errors: &mut Vec<String>,
    ) -> Result<Option<i64>> {
        if let Some(id) = ip.catalogue_id {
            tracing::info!("IP {} already has catalogue_id={}, skipping search", ip.name, id);
            return Ok(Some(id));
        }

        let terms = search_terms(&self.pool, &ip.id, &ip.name, &["en", "jp"], MAX_SEARCH_TERMS)
            .await?;

        for term in &terms {
            let candidates = match self.client.search(term, 5).await {
                Ok(c) => c,
                Err(e) => {
                    errors.push(format!("search '{}' failed: {}", term, e));
                    continue;
                }
            };
            for candidate in candidates {
                if is_title_match(term, &candidate.all_titles()) {
                    tracing::info!(
                        "Matched IP '{}' (search='{}') to catalogue_id={} ({:?})",
                        ip.name,
                        term,
                        candidate.id,
                        candidate.title,
                    );
                    return Ok(Some(candidate.id));
                }
            }
        }

        errors.push(format!(
            "No catalogue match found for '{}': searched {:?} but no result titles matched \
             (add romaji/Japanese aliases for better matching)",
            ip.name,
            &terms[..terms.len().min(3)],
        ));
        Ok(None)
    }

    /// Walk relation chains from the root entry: sequels recursively, other
    /// relevant relations one level, bounded by fetch count and depth.
    async fn collect_related(&self, root_id: i64, errors: &mut Vec<String>) -> Vec<CatalogueEntry> {
        let mut entries = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();
        let mut queue: VecDeque<(i64, u32)> = VecDeque::new();
        queue.push_back((root_id, 0));

        while let Some((id, depth)) = queue.pop_front() {
            if seen.contains(&id) || depth > MAX_RELATION_DEPTH {
                continue;
            }
            seen.insert(id);

            let entry = match self.client.get_entry(id).await {
                Ok(Some(e)) => e,
                Ok(None) => {
                    errors.push(format!("No catalogue entry for id={}", id));
                    continue;
                }
                Err(e) => {
                    errors.push(format!("Failed to fetch catalogue entry id={}: {}", id, e));
                    continue;
                }
            };
            entries.push(entry);

            let relations = match self.client.get_relations(id).await {
                Ok(r) => r,
                Err(e) => {
                    errors.push(format!("Failed to fetch relations for id={}: {}", id, e));
                    continue;
                }
            };

            for group in relations {
                let relation = group.relation.as_deref().unwrap_or("");
                if !RELEVANT_RELATIONS.contains(&relation) {
                    continue;
                }
                for related in group.entry {
                    if related.entry_type.as_deref() != Some("anime") || seen.contains(&related.id)
                    {
                        continue;
                    }
                    if seen.len() + queue.len() >= MAX_RELATED_FETCHES {
                        break;
                    }
                    // Sequel chains are followed to depth; everything else is flat.
                    let next_depth = if relation == "Sequel" {
                        depth + 1
                    } else {
                        MAX_RELATION_DEPTH
                    };
                    queue.push_back((related.id, next_depth));
                }
            }
        }

        entries
    }

    /// Sync one IP from the catalogue.
    pub async fn sync_ip(&self, ip_id: &str) -> Result<CatalogueSyncResult> {
        let run_started = Utc::now();
        let mut errors: Vec<String> = Vec::new();
        let mut events_added = 0i64;
        let mut events_skipped = 0i64;

        let ip: Option<IpRow> = sqlx::query_as("SELECT * FROM ip WHERE id = ?")
            .bind(ip_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(ip) = ip else {
            return Ok(CatalogueSyncResult {
                ip_id: ip_id.to_string(),
                ip_name: "unknown".to_string(),
                catalogue_id: None,
                matched: false,
                events_added: 0,
                events_skipped: 0,
                errors: vec!["IP not found".to_string()],
            });
        };

        let catalogue_id = self.resolve_catalogue_id(&ip, &mut errors).await?;
        let matched = catalogue_id.is_some();

        if let Some(id) = catalogue_id {
            if ip.catalogue_id.is_none() {
                sqlx::query("UPDATE ip SET catalogue_id = ? WHERE id = ?")
                    .bind(id)
                    .bind(ip_id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        let entries = match catalogue_id {
            Some(id) => self.collect_related(id, &mut errors).await,
            None => Vec::new(),
        };

        for entry in &entries {
            let Some(event_type) = map_event_type(entry.entry_type.as_deref(), entry.status.as_deref())
            else {
                continue;
            };
            let Some(event_date) = parse_air_date(entry) else {
                continue;
            };

            let title = entry.title.clone().unwrap_or_else(|| "Unknown".to_string());
            let url = entry
                .url
                .clone()
                .unwrap_or_else(|| format!("https://myanimelist.net/anime/{}", entry.id));

            // Dedup on (ip, title, date, source).
            let existing: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM ip_event \
                 WHERE ip_id = ? AND title = ? AND event_date = ? AND source = ?",
            )
            .bind(ip_id)
            .bind(&title)
            .bind(event_date)
            .bind(SOURCE_KEY)
            .fetch_optional(&self.pool)
            .await?;
            if existing.is_some() {
                events_skipped += 1;
                continue;
            }

            sqlx::query(
                "INSERT INTO ip_event (id, ip_id, event_type, title, event_date, source, source_url, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(new_id())
            .bind(ip_id)
            .bind(event_type)
            .bind(&title)
            .bind(event_date)
            .bind(SOURCE_KEY)
            .bind(&url)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
            events_added += 1;
        }

        let health = HealthService::new(self.pool.clone(), self.settings.clone());
        let status = if matched { HealthStatus::Ok } else { HealthStatus::Down };
        let last_error = if !matched { errors.first().map(|s| s.as_str()) } else { None };
        health
            .upsert_ip_source_health(ip_id, SOURCE_KEY, matched, status, last_error, events_added)
            .await?;
        health
            .record_source_run(
                SOURCE_KEY,
                run_started,
                if matched { HealthStatus::Ok } else { HealthStatus::Warn },
                entries.len() as i64,
                events_added,
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

        Ok(CatalogueSyncResult {
            ip_id: ip_id.to_string(),
            ip_name: ip.name,
            catalogue_id,
            matched,
            events_added,
            events_skipped,
            errors,
        })
    }

    /// Sync every IP sequentially; the shared client pacing keeps the
    /// upstream happy.
    pub async fn sync_all(&self) -> Result<Vec<CatalogueSyncResult>> {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(entry_type: &str, status: &str, from: Option<&str>) -> CatalogueEntry {
        serde_json::from_value(serde_json::json!({
            "mal_id": 1,
            "title": "Test",
            "type": entry_type,
            "status": status,
            "aired": {"from": from},
        }))
        .unwrap()
    }

    #[test]
    fn finished_entries_produce_no_event() {
        assert_eq!(map_event_type(Some("TV"), Some("Finished Airing")), None);
    }

    #[test]
    fn airing_types_map_to_event_types() {
        assert_eq!(map_event_type(Some("Movie"), Some("Not yet aired")), Some("movie_release"));
        assert_eq!(map_event_type(Some("TV"), Some("Currently Airing")), Some("anime_air"));
        assert_eq!(map_event_type(Some("ONA"), Some("Not yet aired")), Some("anime_air"));
        assert_eq!(map_event_type(Some("Music"), Some("Not yet aired")), None);
        assert_eq!(map_event_type(None, Some("Not yet aired")), None);
    }

    #[test]
    fn air_date_parses_rfc3339() {
        let e = entry("TV", "Not yet aired", Some("2026-01-10T00:00:00+00:00"));
        assert_eq!(parse_air_date(&e), NaiveDate::from_ymd_opt(2026, 1, 10));

        let e = entry("TV", "Not yet aired", None);
        assert_eq!(parse_air_date(&e), None);
    }
}
