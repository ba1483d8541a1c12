//! Syndication document parser.
//!
//! Thin structured layer over `feed_rs`: RSS 2.0 and Atom documents are
//! normalized into [`ParsedFeed`], carrying the channel metadata used for
//! feed title/description backfill plus one [`FeedEntry`] per item.

use chrono::{DateTime, Utc};
use feedloom_shared::{FeedloomError, Result};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Channel-level metadata from a parsed feed document.
#[derive(Debug, Clone)]
pub struct FeedDocMeta {
    /// Feed title.
    pub title: String,
    /// Feed homepage link (first alternate link, if any).
    pub link: String,
    /// Feed description/subtitle.
    pub description: String,
}

/// A single candidate entry extracted from a feed document.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    /// Entry title.
    pub title: String,
    /// Entry target URL. Empty when the document omits a link.
    pub link: String,
    /// Entry description/summary.
    pub description: String,
    /// Publication timestamp, when the document carries one.
    pub published_at: Option<DateTime<Utc>>,
    /// Embedded full-content block (`content:encoded` or Atom content).
    pub content: Option<String>,
}

/// Parsed representation of a feed document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub meta: FeedDocMeta,
    pub entries: Vec<FeedEntry>,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse an RSS/Atom document into structured entries.
pub fn parse_feed_document(xml: &str) -> Result<ParsedFeed> {
    let parsed = feed_rs::parser::parse(xml.as_bytes())
        .map_err(|e| FeedloomError::parse(format!("feed document: {e}")))?;

    let meta = FeedDocMeta {
        title: parsed.title.map(|t| t.content).unwrap_or_default(),
        link: parsed
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default(),
        description: parsed.description.map(|t| t.content).unwrap_or_default(),
    };

    let entries = parsed
        .entries
        .into_iter()
        .map(|entry| FeedEntry {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            link: entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default(),
            description: entry.summary.map(|t| t.content).unwrap_or_default(),
            published_at: entry.published.or(entry.updated),
            content: entry.content.and_then(|c| c.body),
        })
        .collect();

    Ok(ParsedFeed { meta, entries })
}
