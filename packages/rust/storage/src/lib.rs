//! libSQL corpus store.
//!
//! The [`Store`] struct wraps a libSQL database holding the feed registry
//! and the item corpus. It is the pipeline's only shared mutable resource:
//! every stage reads a bounded batch through an eligibility query, mutates
//! items in memory, and persists them back one at a time.
//!
//! The handle is constructed once at process start and passed into each
//! stage explicitly — never re-derived ambiently.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use feedloom_shared::{Feed, FeedId, FeedloomError, Item, ItemId, Result};
use libsql::{Connection, Database, params};

/// Column list shared by every feed query.
const FEED_COLUMNS: &str = "id, url, kind, title, description, tags, is_active, status, \
                            last_resolved_at, created_at, updated_at";

/// Column list shared by every item query.
const ITEM_COLUMNS: &str = "id, feed_ref, url, title, content, ai_content, ai_summary, tags, \
                            cover, audio, published_at, kind, is_active, stage, \
                            fetch_attempts, narrate_attempts, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Store {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Store {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FeedloomError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let store = Self {
            db,
            conn,
            readonly: false,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open a database at `path` in read-only mode (for inspection tooling).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    FeedloomError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(FeedloomError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Feed operations
    // -----------------------------------------------------------------------

    /// Insert a new feed. The URL's UNIQUE constraint backs the
    /// caller-level duplicate check.
    pub async fn insert_feed(&self, feed: &Feed) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO feeds (id, url, kind, title, description, tags, is_active, status,
                                    last_resolved_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                feed_params(feed),
            )
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a feed by id.
    pub async fn get_feed(&self, id: &FeedId) -> Result<Option<Feed>> {
        let sql = format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_feed(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FeedloomError::Storage(e.to_string())),
        }
    }

    /// Look up a feed by URL (the registration dedup check).
    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let sql = format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![url])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_feed(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FeedloomError::Storage(e.to_string())),
        }
    }

    /// List all feeds, newest first.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let sql = format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY created_at DESC");
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_feed(&row)?);
        }
        Ok(results)
    }

    /// Persist every mutable feed column back under the feed's id.
    pub async fn update_feed(&self, feed: &Feed) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE feeds SET url = ?2, kind = ?3, title = ?4, description = ?5, tags = ?6,
                                  is_active = ?7, status = ?8, last_resolved_at = ?9,
                                  updated_at = ?11
                 WHERE id = ?1",
                feed_params(feed),
            )
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Feeds eligible for resolution: active, and never resolved or last
    /// resolved before `cutoff`.
    pub async fn feeds_due_for_resolve(&self, cutoff: DateTime<Utc>) -> Result<Vec<Feed>> {
        let sql = format!(
            "SELECT {FEED_COLUMNS} FROM feeds
             WHERE is_active = 1
               AND (last_resolved_at IS NULL OR last_resolved_at < ?1)
             ORDER BY created_at DESC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![cutoff.to_rfc3339()])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_feed(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Item operations
    // -----------------------------------------------------------------------

    /// Insert a new item.
    pub async fn insert_item(&self, item: &Item) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO items (id, feed_ref, url, title, content, ai_content, ai_summary,
                                    tags, cover, audio, published_at, kind, is_active, stage,
                                    fetch_attempts, narrate_attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                item_params(item),
            )
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get an item by id.
    pub async fn get_item(&self, id: &ItemId) -> Result<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_item(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FeedloomError::Storage(e.to_string())),
        }
    }

    /// Look up an item by URL (the resolver's dedup check).
    pub async fn get_item_by_url(&self, url: &str) -> Result<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE url = ?1 LIMIT 1");
        let mut rows = self
            .conn
            .query(&sql, params![url])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_item(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FeedloomError::Storage(e.to_string())),
        }
    }

    /// List items, newest first.
    pub async fn list_items(&self, limit: u32, offset: u32) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![limit, offset])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_item(&row)?);
        }
        Ok(results)
    }

    /// Persist every mutable item column back under the item's id.
    pub async fn update_item(&self, item: &Item) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE items SET feed_ref = ?2, url = ?3, title = ?4, content = ?5,
                                  ai_content = ?6, ai_summary = ?7, tags = ?8, cover = ?9,
                                  audio = ?10, published_at = ?11, kind = ?12, is_active = ?13,
                                  stage = ?14, fetch_attempts = ?15, narrate_attempts = ?16,
                                  updated_at = ?18
                 WHERE id = ?1",
                item_params(item),
            )
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Eligibility queries (one per pipeline stage)
    // -----------------------------------------------------------------------

    /// Items awaiting content fetch: inactive, not dead-lettered, under the
    /// retry cap. Newest first.
    pub async fn items_awaiting_fetch(&self, limit: u32, max_attempts: u32) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE is_active = 0
               AND stage != 'failed'
               AND fetch_attempts < ?2
             ORDER BY created_at DESC
             LIMIT ?1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![limit, max_attempts])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_item(&row)?);
        }
        Ok(results)
    }

    /// Items awaiting enrichment: active, fetched content present, no
    /// enriched content yet. Newest first.
    pub async fn items_awaiting_enrichment(&self, limit: u32) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE is_active = 1
               AND content != ''
               AND ai_content = ''
               AND stage != 'failed'
             ORDER BY created_at DESC
             LIMIT ?1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![limit])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_item(&row)?);
        }
        Ok(results)
    }

    /// Items eligible for aggregation: enriched, created after `cutoff`.
    pub async fn items_for_aggregation(&self, cutoff: DateTime<Utc>) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE is_active = 1
               AND content != ''
               AND ai_content != ''
               AND stage = 'enriched'
               AND created_at > ?1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![cutoff.to_rfc3339()])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_item(&row)?);
        }
        Ok(results)
    }

    /// Aggregates awaiting narration: enriched aggregate items without audio,
    /// created after `cutoff`, under the retry cap. Newest first.
    pub async fn items_awaiting_narration(
        &self,
        limit: u32,
        cutoff: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE is_active = 1
               AND content != ''
               AND ai_content != ''
               AND audio = ''
               AND kind = 'ai-aggregate'
               AND stage != 'failed'
               AND narrate_attempts < ?3
               AND created_at > ?2
             ORDER BY created_at DESC
             LIMIT ?1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![limit, cutoff.to_rfc3339(), max_attempts])
            .await
            .map_err(|e| FeedloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_item(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn encode_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

fn decode_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FeedloomError::Storage(format!("invalid timestamp: {e}")))
}

fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| FeedloomError::Storage(e.to_string()))
}

/// Convert a database row to a [`Feed`].
fn row_to_feed(row: &libsql::Row) -> Result<Feed> {
    Ok(Feed {
        id: get_string(row, 0)?
            .parse()
            .map_err(|e| FeedloomError::Storage(format!("invalid feed id: {e}")))?,
        url: get_string(row, 1)?,
        kind: get_string(row, 2)?
            .parse()
            .map_err(FeedloomError::Storage)?,
        title: get_string(row, 3)?,
        description: get_string(row, 4)?,
        tags: decode_tags(&get_string(row, 5)?),
        is_active: row.get::<i64>(6).unwrap_or(0) != 0,
        status: get_string(row, 7)?,
        last_resolved_at: match row.get::<String>(8) {
            Ok(s) => Some(parse_timestamp(&s)?),
            Err(_) => None,
        },
        created_at: parse_timestamp(&get_string(row, 9)?)?,
        updated_at: parse_timestamp(&get_string(row, 10)?)?,
    })
}

/// Convert a database row to an [`Item`].
fn row_to_item(row: &libsql::Row) -> Result<Item> {
    Ok(Item {
        id: get_string(row, 0)?
            .parse()
            .map_err(|e| FeedloomError::Storage(format!("invalid item id: {e}")))?,
        feed_ref: get_string(row, 1)?,
        url: get_string(row, 2)?,
        title: get_string(row, 3)?,
        content: get_string(row, 4)?,
        ai_content: get_string(row, 5)?,
        ai_summary: get_string(row, 6)?,
        tags: decode_tags(&get_string(row, 7)?),
        cover: get_string(row, 8)?,
        audio: get_string(row, 9)?,
        published_at: match row.get::<String>(10) {
            Ok(s) => Some(parse_timestamp(&s)?),
            Err(_) => None,
        },
        kind: get_string(row, 11)?
            .parse()
            .map_err(FeedloomError::Storage)?,
        is_active: row.get::<i64>(12).unwrap_or(0) != 0,
        stage: get_string(row, 13)?
            .parse()
            .map_err(FeedloomError::Storage)?,
        fetch_attempts: row.get::<i64>(14).unwrap_or(0) as u32,
        narrate_attempts: row.get::<i64>(15).unwrap_or(0) as u32,
        created_at: parse_timestamp(&get_string(row, 16)?)?,
        updated_at: parse_timestamp(&get_string(row, 17)?)?,
    })
}

/// A nullable text column value.
fn opt_text(value: Option<String>) -> libsql::Value {
    match value {
        Some(s) => libsql::Value::from(s),
        None => libsql::Value::Null,
    }
}

/// Positional parameters shared by feed INSERT and UPDATE statements.
fn feed_params(feed: &Feed) -> Vec<libsql::Value> {
    vec![
        libsql::Value::from(feed.id.to_string()),
        libsql::Value::from(feed.url.clone()),
        libsql::Value::from(feed.kind.as_str()),
        libsql::Value::from(feed.title.clone()),
        libsql::Value::from(feed.description.clone()),
        libsql::Value::from(encode_tags(&feed.tags)),
        libsql::Value::from(feed.is_active as i64),
        libsql::Value::from(feed.status.clone()),
        opt_text(feed.last_resolved_at.map(|t| t.to_rfc3339())),
        libsql::Value::from(feed.created_at.to_rfc3339()),
        libsql::Value::from(feed.updated_at.to_rfc3339()),
    ]
}

/// Positional parameters shared by item INSERT and UPDATE statements.
fn item_params(item: &Item) -> Vec<libsql::Value> {
    vec![
        libsql::Value::from(item.id.to_string()),
        libsql::Value::from(item.feed_ref.clone()),
        libsql::Value::from(item.url.clone()),
        libsql::Value::from(item.title.clone()),
        libsql::Value::from(item.content.clone()),
        libsql::Value::from(item.ai_content.clone()),
        libsql::Value::from(item.ai_summary.clone()),
        libsql::Value::from(encode_tags(&item.tags)),
        libsql::Value::from(item.cover.clone()),
        libsql::Value::from(item.audio.clone()),
        opt_text(item.published_at.map(|t| t.to_rfc3339())),
        libsql::Value::from(item.kind.as_str()),
        libsql::Value::from(item.is_active as i64),
        libsql::Value::from(item.stage.as_str()),
        libsql::Value::from(item.fetch_attempts as i64),
        libsql::Value::from(item.narrate_attempts as i64),
        libsql::Value::from(item.created_at.to_rfc3339()),
        libsql::Value::from(item.updated_at.to_rfc3339()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use feedloom_shared::{FeedKind, ItemKind, StageMarker};
    use uuid::Uuid;

    /// Create a temp file store for testing.
    async fn test_store() -> Store {
        let tmp = std::env::temp_dir().join(format!("fl_test_{}.db", Uuid::now_v7()));
        Store::open(&tmp).await.expect("open test db")
    }

    fn test_item(url: &str) -> Item {
        let feed = Feed::new("https://example.com/feed.xml", FeedKind::Rss);
        Item::from_feed_entry(&feed.id, url, "Title", None)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let store = test_store().await;
        let version = store.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("fl_test_{}.db", Uuid::now_v7()));
        let s1 = Store::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Store::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn feed_crud() {
        let store = test_store().await;
        let mut feed = Feed::new("https://example.com/feed.xml", FeedKind::Rss);

        store.insert_feed(&feed).await.expect("insert feed");

        let found = store
            .get_feed_by_url("https://example.com/feed.xml")
            .await
            .expect("get by url")
            .expect("feed exists");
        assert_eq!(found.id, feed.id);
        assert_eq!(found.kind, FeedKind::Rss);
        assert!(found.last_resolved_at.is_none());

        feed.title = "Backfilled".into();
        feed.last_resolved_at = Some(Utc::now());
        store.update_feed(&feed).await.expect("update feed");

        let found = store.get_feed(&feed.id).await.unwrap().unwrap();
        assert_eq!(found.title, "Backfilled");
        assert!(found.last_resolved_at.is_some());

        assert_eq!(store.list_feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_feed_url_is_rejected() {
        let store = test_store().await;
        let a = Feed::new("https://example.com/feed.xml", FeedKind::Rss);
        let b = Feed::new("https://example.com/feed.xml", FeedKind::SingleUrl);

        store.insert_feed(&a).await.expect("first insert");
        assert!(store.insert_feed(&b).await.is_err());
    }

    #[tokio::test]
    async fn resolve_cooldown_predicate() {
        let store = test_store().await;

        // Never resolved → due
        let fresh = Feed::new("https://a.example.com/feed.xml", FeedKind::Rss);
        store.insert_feed(&fresh).await.unwrap();

        // Resolved two hours ago → due against a one-hour cutoff
        let mut stale = Feed::new("https://b.example.com/feed.xml", FeedKind::Rss);
        stale.last_resolved_at = Some(Utc::now() - Duration::hours(2));
        store.insert_feed(&stale).await.unwrap();

        // Just resolved → not due
        let mut recent = Feed::new("https://c.example.com/feed.xml", FeedKind::Rss);
        recent.last_resolved_at = Some(Utc::now());
        store.insert_feed(&recent).await.unwrap();

        // Inactive → never due
        let mut inactive = Feed::new("https://d.example.com/feed.xml", FeedKind::Rss);
        inactive.is_active = false;
        store.insert_feed(&inactive).await.unwrap();

        let cutoff = Utc::now() - Duration::hours(1);
        let due = store.feeds_due_for_resolve(cutoff).await.expect("query");
        let urls: Vec<&str> = due.iter().map(|f| f.url.as_str()).collect();

        assert!(urls.contains(&"https://a.example.com/feed.xml"));
        assert!(urls.contains(&"https://b.example.com/feed.xml"));
        assert!(!urls.contains(&"https://c.example.com/feed.xml"));
        assert!(!urls.contains(&"https://d.example.com/feed.xml"));
    }

    #[tokio::test]
    async fn item_insert_and_url_dedup_lookup() {
        let store = test_store().await;
        let item = test_item("https://example.com/post-1");
        store.insert_item(&item).await.expect("insert item");

        let found = store
            .get_item_by_url("https://example.com/post-1")
            .await
            .expect("lookup")
            .expect("item exists");
        assert_eq!(found.id, item.id);
        assert_eq!(found.stage, StageMarker::Unset);
        assert!(!found.is_active);

        let missing = store
            .get_item_by_url("https://example.com/other")
            .await
            .expect("lookup");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn item_update_roundtrips_all_fields() {
        let store = test_store().await;
        let mut item = test_item("https://example.com/post");
        store.insert_item(&item).await.unwrap();

        item.content = "# fetched".into();
        item.ai_content = "cleaned".into();
        item.ai_summary = "summary".into();
        item.tags = vec!["tech".into(), "news".into()];
        item.audio = "/audio/a.mp3".into();
        item.is_active = true;
        item.advance_stage(StageMarker::Enriched);
        item.fetch_attempts = 2;
        item.touch();
        store.update_item(&item).await.expect("update");

        let found = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(found.content, "# fetched");
        assert_eq!(found.ai_content, "cleaned");
        assert_eq!(found.tags, vec!["tech", "news"]);
        assert_eq!(found.stage, StageMarker::Enriched);
        assert_eq!(found.fetch_attempts, 2);
        assert!(found.is_active);
    }

    #[tokio::test]
    async fn fetch_eligibility_excludes_active_failed_and_exhausted() {
        let store = test_store().await;

        let waiting = test_item("https://example.com/waiting");
        store.insert_item(&waiting).await.unwrap();

        let mut active = test_item("https://example.com/active");
        active.is_active = true;
        store.insert_item(&active).await.unwrap();

        let mut failed = test_item("https://example.com/failed");
        failed.stage = StageMarker::Failed;
        store.insert_item(&failed).await.unwrap();

        let mut exhausted = test_item("https://example.com/exhausted");
        exhausted.fetch_attempts = 5;
        store.insert_item(&exhausted).await.unwrap();

        let batch = store.items_awaiting_fetch(10, 5).await.expect("query");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].url, "https://example.com/waiting");
    }

    #[tokio::test]
    async fn fetch_batch_is_newest_first_and_bounded() {
        let store = test_store().await;
        for i in 0..5 {
            let mut item = test_item(&format!("https://example.com/p{i}"));
            item.created_at = Utc::now() - Duration::minutes(10 - i);
            store.insert_item(&item).await.unwrap();
        }

        let batch = store.items_awaiting_fetch(2, 5).await.expect("query");
        assert_eq!(batch.len(), 2);
        // i=4 is the newest
        assert_eq!(batch[0].url, "https://example.com/p4");
        assert_eq!(batch[1].url, "https://example.com/p3");
    }

    #[tokio::test]
    async fn enrichment_eligibility() {
        let store = test_store().await;

        let mut ready = test_item("https://example.com/ready");
        ready.is_active = true;
        ready.content = "raw".into();
        ready.stage = StageMarker::Fetched;
        store.insert_item(&ready).await.unwrap();

        // No content yet
        let mut unfetched = test_item("https://example.com/unfetched");
        unfetched.is_active = true;
        store.insert_item(&unfetched).await.unwrap();

        // Already enriched
        let mut done = test_item("https://example.com/done");
        done.is_active = true;
        done.content = "raw".into();
        done.ai_content = "clean".into();
        done.stage = StageMarker::Enriched;
        store.insert_item(&done).await.unwrap();

        let batch = store.items_awaiting_enrichment(10).await.expect("query");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].url, "https://example.com/ready");
    }

    #[tokio::test]
    async fn aggregation_selection_respects_stage_and_window() {
        let store = test_store().await;

        let mut in_window = test_item("https://example.com/in");
        in_window.is_active = true;
        in_window.content = "raw".into();
        in_window.ai_content = "clean".into();
        in_window.stage = StageMarker::Enriched;
        store.insert_item(&in_window).await.unwrap();

        let mut too_old = test_item("https://example.com/old");
        too_old.is_active = true;
        too_old.content = "raw".into();
        too_old.ai_content = "clean".into();
        too_old.stage = StageMarker::Enriched;
        too_old.created_at = Utc::now() - Duration::hours(2);
        store.insert_item(&too_old).await.unwrap();

        let mut already_aggregated = test_item("https://example.com/agg");
        already_aggregated.is_active = true;
        already_aggregated.content = "raw".into();
        already_aggregated.ai_content = "clean".into();
        already_aggregated.stage = StageMarker::Aggregated;
        store.insert_item(&already_aggregated).await.unwrap();

        let cutoff = Utc::now() - Duration::hours(1);
        let batch = store.items_for_aggregation(cutoff).await.expect("query");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].url, "https://example.com/in");
    }

    #[tokio::test]
    async fn narration_eligibility() {
        let store = test_store().await;

        let mut ready = test_item("");
        ready.is_active = true;
        ready.content = "combined".into();
        ready.ai_content = "article".into();
        ready.kind = ItemKind::AiAggregate;
        ready.stage = StageMarker::Aggregated;
        store.insert_item(&ready).await.unwrap();

        // Not an aggregate
        let mut original = test_item("https://example.com/orig");
        original.is_active = true;
        original.content = "raw".into();
        original.ai_content = "clean".into();
        original.stage = StageMarker::Enriched;
        store.insert_item(&original).await.unwrap();

        // Audio already rendered
        let mut narrated = test_item("");
        narrated.is_active = true;
        narrated.content = "combined".into();
        narrated.ai_content = "article".into();
        narrated.kind = ItemKind::AiAggregate;
        narrated.audio = "/audio/x.mp3".into();
        narrated.stage = StageMarker::Narrated;
        store.insert_item(&narrated).await.unwrap();

        let cutoff = Utc::now() - Duration::hours(1);
        let batch = store
            .items_awaiting_narration(10, cutoff, 5)
            .await
            .expect("query");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, ready.id);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("fl_test_{}.db", Uuid::now_v7()));
        let rw = Store::open(&tmp).await.unwrap();
        let feed = Feed::new("https://example.com/feed.xml", FeedKind::Rss);
        rw.insert_feed(&feed).await.unwrap();
        drop(rw);

        let ro = Store::open_readonly(&tmp).await.unwrap();
        let another = Feed::new("https://other.example.com/feed.xml", FeedKind::Rss);
        let result = ro.insert_feed(&another).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
