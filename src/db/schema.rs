pub const SCHEMA: &str = r#"
-- sent_items table (delivered or suppressed entries, never deleted)
CREATE TABLE IF NOT EXISTS sent_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_url TEXT NOT NULL,
    item_guid TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    UNIQUE(feed_url, item_guid)
);

CREATE INDEX IF NOT EXISTS idx_sent_items_feed_guid ON sent_items(feed_url, item_guid);

-- feed_metadata table (one row per polled feed)
CREATE TABLE IF NOT EXISTS feed_metadata (
    feed_url TEXT PRIMARY KEY,
    last_modified TEXT,
    etag TEXT,
    last_checked TEXT NOT NULL,
    last_poll_status INTEGER,
    next_check_after TEXT,
    error_count INTEGER NOT NULL DEFAULT 0
);
"#;

/// Columns added to `feed_metadata` after its first release, with the DDL that adds them.
pub const FEED_METADATA_MIGRATIONS: &[(&str, &str)] = &[
    (
        "next_check_after",
        "ALTER TABLE feed_metadata ADD COLUMN next_check_after TEXT",
    ),
    (
        "error_count",
        "ALTER TABLE feed_metadata ADD COLUMN error_count INTEGER NOT NULL DEFAULT 0",
    ),
];
