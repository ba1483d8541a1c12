//! Aggregation stage: synthesize composite articles from enriched items.
//!
//! Recently enriched items are grouped by shared tag. For each distinct tag
//! the members' enriched content is joined into one text and sent through
//! the gateway with the aggregation instruction; a successful answer becomes
//! a new synthesized item carrying the member ids as its source reference.
//!
//! A tag whose synthesis fails is skipped without aborting its siblings.
//! Items advance to `aggregated` only when at least one tag they contributed
//! to produced an aggregate — items whose every tag failed stay `enriched`
//! and are retried while the recency window still covers them.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use feedloom_shared::{Item, ItemId, ItemKind, Result, StageMarker};
use feedloom_storage::Store;
use feedloom_textgen::{Gateway, TAG_AGGREGATE_PROMPT, parse_enrichment};
use tracing::{debug, info, instrument, warn};

/// Outcome counts for one aggregation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateSummary {
    /// Distinct tags considered.
    pub tags_processed: usize,
    /// Synthesized items created.
    pub aggregates_created: usize,
    /// Source items advanced to `aggregated`.
    pub items_advanced: usize,
}

/// Run one aggregation pass over items enriched within `window`.
#[instrument(skip_all)]
pub async fn run_aggregate(
    store: &Store,
    gateway: &Gateway,
    model: &str,
    window: Duration,
) -> Result<AggregateSummary> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::hours(1));
    let cutoff = Utc::now() - window;

    let items = store.items_for_aggregation(cutoff).await?;
    let mut summary = AggregateSummary::default();

    if items.is_empty() {
        debug!("no items eligible for aggregation");
        return Ok(summary);
    }

    // Union of tags across the batch. Set iteration order is unspecified;
    // each tag's synthesis is independent of the others.
    let tags: HashSet<String> = items
        .iter()
        .flat_map(|item| item.tags.iter().cloned())
        .collect();
    summary.tags_processed = tags.len();

    let mut fed_success: HashSet<ItemId> = HashSet::new();

    for tag in &tags {
        let members: Vec<&Item> = items
            .iter()
            .filter(|item| item.tags.contains(tag))
            .collect();

        let combined = members
            .iter()
            .map(|item| item.ai_content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let source_ids: Vec<String> = members.iter().map(|item| item.id.to_string()).collect();

        let completion = gateway.complete(model, &combined, TAG_AGGREGATE_PROMPT).await;
        if !completion.is_success() {
            warn!(
                tag,
                status = completion.status_code,
                error = completion.error.as_deref().unwrap_or(""),
                "aggregate synthesis failed, skipping tag"
            );
            continue;
        }

        let payload = match parse_enrichment(&completion.answer) {
            Ok(p) => p,
            Err(e) => {
                warn!(tag, error = %e, "unparseable aggregate answer, skipping tag");
                continue;
            }
        };

        // The originating tag must survive even when the model omits it.
        let merged_tags = if payload.tags.contains(tag) {
            payload.tags
        } else {
            let mut merged = vec![tag.clone()];
            merged.extend(payload.tags);
            merged
        };

        let now = Utc::now();
        let aggregate = Item {
            id: ItemId::new(),
            feed_ref: source_ids.join(","),
            url: String::new(),
            title: format!("{tag}-aggregate"),
            content: combined,
            ai_content: payload.content,
            ai_summary: payload.summary,
            tags: merged_tags,
            cover: String::new(),
            audio: String::new(),
            published_at: Some(now),
            kind: ItemKind::AiAggregate,
            is_active: true,
            stage: StageMarker::Unset,
            fetch_attempts: 0,
            narrate_attempts: 0,
            created_at: now,
            updated_at: now,
        };

        match store.insert_item(&aggregate).await {
            Ok(()) => {
                summary.aggregates_created += 1;
                fed_success.extend(members.iter().map(|item| item.id.clone()));
            }
            Err(e) => {
                warn!(tag, error = %e, "failed to persist aggregate, skipping tag");
            }
        }
    }

    // Advance only the items that fed at least one successful aggregate.
    for mut item in items {
        if !fed_success.contains(&item.id) {
            continue;
        }
        item.advance_stage(StageMarker::Aggregated);
        item.touch();
        match store.update_item(&item).await {
            Ok(()) => summary.items_advanced += 1,
            Err(e) => warn!(id = %item.id, error = %e, "failed to advance aggregated item"),
        }
    }

    info!(
        tags_processed = summary.tags_processed,
        aggregates_created = summary.aggregates_created,
        items_advanced = summary.items_advanced,
        "aggregation pass complete"
    );

    Ok(summary)
}
