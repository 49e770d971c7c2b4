//! Database schema and migrations for rssfeed.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded. The `schema_version` table tracks which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: users
    r#"
-- Users own subscriptions and read marks; email receives failure notices
CREATE TABLE users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE,
    email       TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
"#,
    // v2: feeds
    r#"
-- One row per unique feed URL, shared by all subscribers
CREATE TABLE feeds (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_url        TEXT NOT NULL UNIQUE,
    title           TEXT,
    link            TEXT,
    description     TEXT,
    language        TEXT,
    published_time  TEXT,                               -- change-detection watermark
    last_updated    TEXT NOT NULL,                      -- last refresh attempt
    status          TEXT NOT NULL DEFAULT 'creating'    -- 'creating', 'updated', 'error'
);

CREATE INDEX idx_feeds_status ON feeds(status);
"#,
    // v3: entries
    r#"
-- Entries are deduplicated by guid across all feeds and never modified
CREATE TABLE entries (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    guid            TEXT NOT NULL UNIQUE CHECK (guid <> ''),
    feed_id         INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    title           TEXT,
    link            TEXT,
    description     TEXT NOT NULL DEFAULT '',
    author          TEXT,
    published_time  TEXT,
    created_time    TEXT NOT NULL
);

CREATE INDEX idx_entries_feed_id ON entries(feed_id);
CREATE INDEX idx_entries_published_time ON entries(published_time);
"#,
    // v4: subscriptions
    r#"
CREATE TABLE feed_subscriptions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    feed_id         INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    subscribed_time TEXT NOT NULL,
    UNIQUE(user_id, feed_id)
);

CREATE INDEX idx_feed_subscriptions_feed_id ON feed_subscriptions(feed_id);
"#,
    // v5: read marks
    r#"
-- A row means the user has read the entry
CREATE TABLE read_entries (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    entry_id    INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
    read_time   TEXT NOT NULL,
    UNIQUE(user_id, entry_id)
);

CREATE INDEX idx_read_entries_entry_id ON read_entries(entry_id);
"#,
];
