use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{FeedMetadata, SentItem};

use super::schema::{FEED_METADATA_MIGRATIONS, SCHEMA};
use super::FeedStore;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            migrate_feed_metadata(conn)?;
            Ok(())
        })
        .await?;

        tracing::info!(path = db_path, "Database initialized");

        Ok(Self { conn })
    }
}

#[async_trait]
impl FeedStore for Repository {
    async fn is_item_sent(&self, feed_url: &str, item_guid: &str) -> Result<bool> {
        let feed_url = feed_url.to_string();
        let item_guid = item_guid.to_string();
        let sent = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sent_items WHERE feed_url = ?1 AND item_guid = ?2",
                    params![feed_url, item_guid],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(sent)
    }

    async fn mark_item_sent(&self, item: &SentItem) -> Result<bool> {
        let item = item.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO sent_items (feed_url, item_guid, sent_at)
                       VALUES (?1, ?2, ?3)
                       ON CONFLICT(feed_url, item_guid) DO NOTHING"#,
                    params![item.feed_url, item.item_guid, item.sent_at.to_rfc3339()],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    async fn has_any_items_for_feed(&self, feed_url: &str) -> Result<bool> {
        let feed_url = feed_url.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sent_items WHERE feed_url = ?1)",
                    params![feed_url],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    async fn get_feed_metadata(&self, feed_url: &str) -> Result<Option<FeedMetadata>> {
        let feed_url = feed_url.to_string();
        let metadata = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT feed_url, last_modified, etag, last_checked,
                              COALESCE(last_poll_status, 0), next_check_after,
                              COALESCE(error_count, 0)
                       FROM feed_metadata WHERE feed_url = ?1"#,
                )?;
                let metadata = stmt
                    .query_row(params![feed_url], metadata_from_row)
                    .optional()?;
                Ok(metadata)
            })
            .await?;
        Ok(metadata)
    }

    async fn upsert_feed_metadata(&self, metadata: &FeedMetadata) -> Result<()> {
        let metadata = metadata.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO feed_metadata
                           (feed_url, last_modified, etag, last_checked, last_poll_status,
                            next_check_after, error_count)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                       ON CONFLICT(feed_url) DO UPDATE SET
                           last_modified = excluded.last_modified,
                           etag = excluded.etag,
                           last_checked = excluded.last_checked,
                           last_poll_status = excluded.last_poll_status,
                           next_check_after = excluded.next_check_after,
                           error_count = excluded.error_count"#,
                    params![
                        metadata.feed_url,
                        metadata.last_modified,
                        metadata.etag,
                        metadata.last_checked.to_rfc3339(),
                        metadata.last_poll_status,
                        metadata.next_check_after.map(|dt| dt.to_rfc3339()),
                        metadata.error_count,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn sent_count(&self) -> Result<u64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM sent_items", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// Adds columns that databases created by earlier releases lack.
fn migrate_feed_metadata(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let columns: Vec<String> = {
        let mut stmt = conn.prepare("PRAGMA table_info(feed_metadata)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        names
    };

    for (column, ddl) in FEED_METADATA_MIGRATIONS {
        if !columns.iter().any(|c| c == column) {
            tracing::info!(column, "Migrating feed_metadata table");
            conn.execute_batch(ddl)?;
        }
    }

    Ok(())
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => parse_datetime(&raw).map(Some).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                format!("invalid timestamp: {raw}").into(),
            )
        }),
    }
}

fn metadata_from_row(row: &Row) -> rusqlite::Result<FeedMetadata> {
    let last_checked = timestamp_column(row, 3)?.ok_or(rusqlite::Error::InvalidColumnType(
        3,
        "last_checked".to_string(),
        Type::Null,
    ))?;

    Ok(FeedMetadata {
        feed_url: row.get(0)?,
        last_modified: row
            .get::<_, Option<String>>(1)?
            .filter(|v| !v.is_empty()),
        etag: row.get::<_, Option<String>>(2)?.filter(|v| !v.is_empty()),
        last_checked,
        last_poll_status: row.get(4)?,
        next_check_after: timestamp_column(row, 5)?,
        error_count: row.get(6)?,
    })
}
