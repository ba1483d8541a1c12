//! Narration stage: render aggregate articles to audio.
//!
//! Only recently created `ai-aggregate` items without audio are eligible.
//! Failures bump the item's attempt counter and leave it eligible for the
//! next tick; exhausting the budget dead-letters it, mirroring the fetch
//! stage's retry policy.

use std::time::Duration;

use chrono::Utc;
use feedloom_shared::{Result, StageMarker};
use feedloom_speech::{SpeechSynthesizer, Voice};
use feedloom_storage::Store;
use tracing::{debug, info, instrument, warn};

/// Run one narration pass. Returns the number of items rendered.
#[instrument(skip_all, fields(batch))]
pub async fn run_narrate<S: SpeechSynthesizer>(
    store: &Store,
    synth: &S,
    voice: Voice,
    batch: u32,
    max_attempts: u32,
    window: Duration,
) -> Result<usize> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::hours(1));
    let cutoff = Utc::now() - window;

    let items = store
        .items_awaiting_narration(batch, cutoff, max_attempts)
        .await?;
    if items.is_empty() {
        debug!("no items awaiting narration");
        return Ok(0);
    }

    let mut rendered = 0;
    for mut item in items {
        match synth.synthesize(&item.ai_content, voice, 0).await {
            Ok(audio) => {
                item.audio = audio;
                item.advance_stage(StageMarker::Narrated);
                item.touch();
                match store.update_item(&item).await {
                    Ok(()) => rendered += 1,
                    Err(e) => warn!(id = %item.id, error = %e, "failed to persist narrated item"),
                }
            }
            Err(e) => {
                item.narrate_attempts += 1;
                if item.narrate_attempts >= max_attempts {
                    item.advance_stage(StageMarker::Failed);
                    warn!(
                        id = %item.id,
                        attempts = item.narrate_attempts,
                        error = %e,
                        "narration retries exhausted, dead-lettering item"
                    );
                } else {
                    warn!(
                        id = %item.id,
                        attempt = item.narrate_attempts,
                        error = %e,
                        "narration failed, retrying next tick"
                    );
                }
                item.touch();
                if let Err(e) = store.update_item(&item).await {
                    warn!(id = %item.id, error = %e, "failed to persist narration attempt");
                }
            }
        }
    }

    info!(rendered, "narration pass complete");
    Ok(rendered)
}
