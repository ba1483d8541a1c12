//! Feed resolution: turn due feeds into new corpus items.
//!
//! A feed is due when it has never been resolved or its last resolution is
//! older than the cooldown window. Candidate entries are deduplicated by URL
//! against existing items; only misses are inserted, as inactive items with
//! an unset stage marker awaiting the fetch stage.

use std::time::Duration;

use chrono::Utc;
use feedloom_shared::{Item, Result};
use feedloom_storage::Store;
use tracing::{debug, info, instrument, warn};

/// Outcome counts for one resolution pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveSummary {
    /// Feeds whose documents resolved successfully.
    pub feeds_resolved: usize,
    /// Feeds skipped this pass after a fetch/parse failure.
    pub feeds_failed: usize,
    /// New items inserted after URL dedup.
    pub items_inserted: usize,
}

/// Resolve every due feed once.
///
/// A feed that fails to fetch or parse is skipped and retried on the next
/// eligible tick; it never blocks the rest of the batch. The cooldown is
/// advanced on every successful resolution, whether or not new items were
/// found, so an unchanged feed is not re-fetched every tick.
#[instrument(skip_all)]
pub async fn resolve_feeds(
    store: &Store,
    client: &reqwest::Client,
    cooldown: Duration,
) -> Result<ResolveSummary> {
    let cooldown = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::hours(1));
    let cutoff = Utc::now() - cooldown;

    let due = store.feeds_due_for_resolve(cutoff).await?;
    let mut summary = ResolveSummary::default();

    if due.is_empty() {
        debug!("no feeds due for resolution");
        return Ok(summary);
    }

    for mut feed in due {
        let (doc_meta, entries) = match feedloom_feeds::resolve_entries(client, &feed).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(url = %feed.url, error = %e, "feed resolution failed, retrying next tick");
                summary.feeds_failed += 1;
                continue;
            }
        };

        // Backfill empty feed metadata from the parsed document.
        if let Some(meta) = doc_meta {
            if feed.title.is_empty() && !meta.title.is_empty() {
                feed.title = meta.title;
            }
            if feed.description.is_empty() && !meta.description.is_empty() {
                feed.description = meta.description;
            }
        }

        for entry in &entries {
            if entry.link.is_empty() {
                debug!(feed = %feed.url, "skipping entry without a link");
                continue;
            }

            match store.get_item_by_url(&entry.link).await {
                Ok(Some(_)) => continue, // already in the corpus
                Ok(None) => {}
                Err(e) => {
                    warn!(url = %entry.link, error = %e, "dedup lookup failed, skipping entry");
                    continue;
                }
            }

            let mut item =
                Item::from_feed_entry(&feed.id, &entry.link, &entry.title, entry.published_at);
            // Keep an embedded full-content block when the document carries
            // one; the fetch stage still runs and replaces it.
            if let Some(content) = &entry.content {
                item.content = content.clone();
            }

            match store.insert_item(&item).await {
                Ok(()) => summary.items_inserted += 1,
                Err(e) => {
                    warn!(url = %entry.link, error = %e, "item insert failed, skipping entry");
                }
            }
        }

        feed.last_resolved_at = Some(Utc::now());
        feed.status = "resolved".into();
        feed.updated_at = Utc::now();
        if let Err(e) = store.update_feed(&feed).await {
            warn!(url = %feed.url, error = %e, "failed to bump feed resolution timestamp");
        }
        summary.feeds_resolved += 1;
    }

    info!(
        feeds_resolved = summary.feeds_resolved,
        feeds_failed = summary.feeds_failed,
        items_inserted = summary.items_inserted,
        "feed resolution pass complete"
    );

    Ok(summary)
}
