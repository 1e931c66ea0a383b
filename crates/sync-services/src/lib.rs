//! Per-source sync orchestration. Every sync follows the same pattern:
//! search by the IP's aliases, validate matches, upsert the source's rows,
//! record health and a run log, then recompute confidence.

pub mod catalogue_sync;
pub mod matching;
pub mod merch_sync;
pub mod video_sync;

pub use catalogue_sync::{CatalogueSync, CatalogueSyncResult};
pub use matching::{alias_appears_in, is_title_match};
pub use merch_sync::{MerchSync, MerchSyncResult};
pub use video_sync::{VideoSync, VideoSyncResult};

use sqlx::SqlitePool;

/// Search terms for an IP, preferred locales first, deduplicated, capped.
pub(crate) async fn search_terms(
    pool: &SqlitePool,
    ip_id: &str,
    ip_name: &str,
    preferred_locales: &[&str],
    cap: usize,
) -> anyhow::Result<Vec<String>> {
    let aliases: Vec<(String, String)> =
        sqlx::query_as("SELECT alias, locale FROM ip_alias WHERE ip_id = ? AND enabled = 1")
            .bind(ip_id)
            .fetch_all(pool)
            .await?;

    let mut preferred: Vec<String> = Vec::new();
    let mut rest: Vec<String> = vec![ip_name.to_string()];
    for (alias, locale) in aliases {
        if preferred.contains(&alias) || rest.contains(&alias) {
            continue;
        }
        if preferred_locales.contains(&locale.as_str()) {
            preferred.push(alias);
        } else {
            rest.push(alias);
        }
    }

    preferred.extend(rest);
    preferred.truncate(cap);
    Ok(preferred)
}
