//! Structured-response recovery for model output.
//!
//! Completion models frequently wrap the requested JSON object in
//! explanatory prose or code fences. [`extract_json_object`] recovers the
//! substring between the first `{` and the last `}`; [`parse_enrichment`]
//! decodes it into the three-field payload every pipeline prompt requests.

use feedloom_shared::{FeedloomError, Result};
use serde::Deserialize;

/// The structured payload returned by enrichment and aggregation prompts.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichedPayload {
    /// Topic tags, at most five.
    pub tags: Vec<String>,
    /// Short summary of the content.
    #[serde(rename = "abstract")]
    pub summary: String,
    /// Cleaned or synthesized article body.
    pub content: String,
}

/// Extract the first-`{`-to-last-`}` substring from free text.
///
/// Returns `None` when the text contains no braced region.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Decode a model answer into an [`EnrichedPayload`].
///
/// Fails when no braced region exists, the region is not valid JSON, or any
/// of the three required fields is missing.
pub fn parse_enrichment(answer: &str) -> Result<EnrichedPayload> {
    let json = extract_json_object(answer)
        .ok_or_else(|| FeedloomError::parse("no JSON object in completion answer"))?;

    serde_json::from_str(json)
        .map_err(|e| FeedloomError::parse(format!("completion payload: {e}")))
}
