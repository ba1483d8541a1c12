//! Fetch stage: retrieve raw content for items awaiting it.
//!
//! Selects inactive items (newest first) and runs the fetch capability per
//! item. Failures are isolated: the item's attempt counter is bumped and the
//! loop continues. An item that exhausts its retry budget is dead-lettered
//! with the `failed` stage marker and drops out of every eligibility query.

use feedloom_fetch::ContentFetcher;
use feedloom_shared::{Result, StageMarker};
use feedloom_storage::Store;
use tracing::{debug, info, instrument, warn};

/// Run one fetch pass. Returns the number of items updated with content.
#[instrument(skip_all, fields(batch))]
pub async fn run_fetch<F: ContentFetcher>(
    store: &Store,
    fetcher: &F,
    batch: u32,
    max_attempts: u32,
) -> Result<usize> {
    let items = store.items_awaiting_fetch(batch, max_attempts).await?;
    if items.is_empty() {
        debug!("no items awaiting fetch");
        return Ok(0);
    }

    let mut updated = 0;
    for mut item in items {
        match fetcher.fetch(&item.url).await {
            Ok(content) => {
                item.content = content;
                item.is_active = true;
                item.advance_stage(StageMarker::Fetched);
                item.touch();
                match store.update_item(&item).await {
                    Ok(()) => updated += 1,
                    Err(e) => warn!(url = %item.url, error = %e, "failed to persist fetched item"),
                }
            }
            Err(e) => {
                item.fetch_attempts += 1;
                if item.fetch_attempts >= max_attempts {
                    item.advance_stage(StageMarker::Failed);
                    warn!(
                        url = %item.url,
                        attempts = item.fetch_attempts,
                        error = %e,
                        "fetch retries exhausted, dead-lettering item"
                    );
                } else {
                    warn!(
                        url = %item.url,
                        attempt = item.fetch_attempts,
                        error = %e,
                        "fetch failed, retrying next tick"
                    );
                }
                item.touch();
                if let Err(e) = store.update_item(&item).await {
                    warn!(url = %item.url, error = %e, "failed to persist fetch attempt");
                }
            }
        }
    }

    info!(updated, "fetch pass complete");
    Ok(updated)
}
