//! Core domain types for the Feedloom content pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// FeedId / ItemId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for feed identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(pub Uuid);

impl FeedId {
    /// Generate a new time-sortable feed identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for FeedId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FeedId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A UUID v7 wrapper for item identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Generate a new time-sortable item identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// FeedKind
// ---------------------------------------------------------------------------

/// How a registered feed is resolved into items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedKind {
    /// An RSS/Atom document; one item per syndication entry.
    Rss,
    /// A plain page URL; resolves to exactly one synthetic entry.
    SingleUrl,
}

impl FeedKind {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::SingleUrl => "single-url",
        }
    }
}

impl std::str::FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "rss" => Ok(Self::Rss),
            "single-url" => Ok(Self::SingleUrl),
            other => Err(format!("unknown feed kind '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// ItemKind
// ---------------------------------------------------------------------------

/// Provenance of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    /// Feed-derived content.
    Original,
    /// Feed-derived content republished from elsewhere.
    Reprint,
    /// Synthesized by the aggregation stage from multiple source items.
    AiAggregate,
}

impl ItemKind {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Reprint => "reprint",
            Self::AiAggregate => "ai-aggregate",
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "original" => Ok(Self::Original),
            "reprint" => Ok(Self::Reprint),
            "ai-aggregate" => Ok(Self::AiAggregate),
            other => Err(format!("unknown item kind '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// StageMarker
// ---------------------------------------------------------------------------

/// The furthest pipeline stage an item has completed.
///
/// Ordered: a marker only ever moves forward (see [`Item::advance_stage`]).
/// `Failed` is the dead-letter terminal state for items that exhausted their
/// retry budget; every stage's eligibility predicate excludes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageMarker {
    Unset,
    Fetched,
    Enriched,
    Aggregated,
    Narrated,
    Failed,
}

impl StageMarker {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Fetched => "fetched",
            Self::Enriched => "enriched",
            Self::Aggregated => "aggregated",
            Self::Narrated => "narrated",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for StageMarker {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unset" => Ok(Self::Unset),
            "fetched" => Ok(Self::Fetched),
            "enriched" => Ok(Self::Enriched),
            "aggregated" => Ok(Self::Aggregated),
            "narrated" => Ok(Self::Narrated),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown stage marker '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// A registered content source, periodically resolved into items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: FeedId,
    /// Source URL. Globally unique across feeds.
    pub url: String,
    pub kind: FeedKind,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Inactive feeds are skipped by the resolver.
    pub is_active: bool,
    /// Free-form processing status, for operator visibility.
    pub status: String,
    /// Last successful resolution; drives the resolve cooldown.
    pub last_resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feed {
    /// Create a new active feed with empty metadata.
    pub fn new(url: impl Into<String>, kind: FeedKind) -> Self {
        let now = Utc::now();
        Self {
            id: FeedId::new(),
            url: url.into(),
            kind,
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            is_active: true,
            status: String::new(),
            last_resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A unit of content moving through the pipeline.
///
/// Feed-derived items carry the owning feed id in `feed_ref` and a non-empty
/// `url`. Aggregates synthesized by the pipeline carry a comma-joined list of
/// source item ids in `feed_ref` and an empty `url` (URL uniqueness is only
/// enforced for feed-derived items).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Owning feed id, or comma-joined source item ids for aggregates.
    pub feed_ref: String,
    pub url: String,
    pub title: String,
    /// Raw fetched content (Markdown).
    pub content: String,
    /// Cleaned, narration-ready content from the enrichment stage.
    pub ai_content: String,
    /// Model-generated summary.
    pub ai_summary: String,
    pub tags: Vec<String>,
    pub cover: String,
    /// Audio reference written by the narration stage.
    pub audio: String,
    pub published_at: Option<DateTime<Utc>>,
    pub kind: ItemKind,
    /// False until content has been fetched; the fetch stage's eligibility key.
    pub is_active: bool,
    pub stage: StageMarker,
    pub fetch_attempts: u32,
    pub narrate_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Create a feed-derived item awaiting fetch.
    pub fn from_feed_entry(
        feed_id: &FeedId,
        url: impl Into<String>,
        title: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            feed_ref: feed_id.to_string(),
            url: url.into(),
            title: title.into(),
            content: String::new(),
            ai_content: String::new(),
            ai_summary: String::new(),
            tags: Vec::new(),
            cover: String::new(),
            audio: String::new(),
            published_at,
            kind: ItemKind::Original,
            is_active: false,
            stage: StageMarker::Unset,
            fetch_attempts: 0,
            narrate_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the stage marker, never regressing it.
    pub fn advance_stage(&mut self, to: StageMarker) {
        if to > self.stage {
            self.stage = to;
        }
    }

    /// Mark the item's payload as changed now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
