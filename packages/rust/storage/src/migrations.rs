//! SQL migration definitions for the Feedloom corpus database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: feeds, items",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Registered content sources
CREATE TABLE IF NOT EXISTS feeds (
    id               TEXT PRIMARY KEY,
    url              TEXT NOT NULL UNIQUE,
    kind             TEXT NOT NULL,
    title            TEXT NOT NULL DEFAULT '',
    description      TEXT NOT NULL DEFAULT '',
    tags             TEXT NOT NULL DEFAULT '[]',
    is_active        INTEGER NOT NULL DEFAULT 1,
    status           TEXT NOT NULL DEFAULT '',
    last_resolved_at TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- Pipeline items (feed-derived and synthesized)
CREATE TABLE IF NOT EXISTS items (
    id               TEXT PRIMARY KEY,
    feed_ref         TEXT NOT NULL DEFAULT '',
    url              TEXT NOT NULL DEFAULT '',
    title            TEXT NOT NULL DEFAULT '',
    content          TEXT NOT NULL DEFAULT '',
    ai_content       TEXT NOT NULL DEFAULT '',
    ai_summary       TEXT NOT NULL DEFAULT '',
    tags             TEXT NOT NULL DEFAULT '[]',
    cover            TEXT NOT NULL DEFAULT '',
    audio            TEXT NOT NULL DEFAULT '',
    published_at     TEXT,
    kind             TEXT NOT NULL DEFAULT 'original',
    is_active        INTEGER NOT NULL DEFAULT 0,
    stage            TEXT NOT NULL DEFAULT 'unset',
    fetch_attempts   INTEGER NOT NULL DEFAULT 0,
    narrate_attempts INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_url ON items(url);
CREATE INDEX IF NOT EXISTS idx_items_stage ON items(stage);
CREATE INDEX IF NOT EXISTS idx_items_created_at ON items(created_at);
CREATE INDEX IF NOT EXISTS idx_items_feed_ref ON items(feed_ref);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
