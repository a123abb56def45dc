//! Embedded/remote sqlite backend via libSQL.
//!
//! Supports a local database file and remote Turso databases. This
//! backend has no native vector column type, so embeddings are not
//! persisted here.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::debug;

use contentsync_shared::{
    CONTENT_TYPE_WEB, ExtractedPage, NewContent, RETRY_CEILING, Result, RetryCandidate,
    SyncError, SyncHistoryEntry,
};

use crate::{ContentStore, InsertOutcome};

/// Idempotent schema bootstrap, applied on every open.
const SCHEMA: &str = r#"
-- Canonical record per ingested URL
CREATE TABLE IF NOT EXISTS content (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    url          TEXT NOT NULL UNIQUE,
    content_type TEXT NOT NULL,
    title        TEXT,
    created_at   TEXT NOT NULL,
    consumed_at  TEXT,
    scraped_at   TEXT,
    is_scraped   INTEGER NOT NULL DEFAULT 0,
    retry_count  INTEGER
);

CREATE INDEX IF NOT EXISTS idx_content_unscraped ON content(is_scraped, retry_count);

-- Scraped body text, one-to-one with content
CREATE TABLE IF NOT EXISTS web (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    content_id   INTEGER NOT NULL REFERENCES content(id) ON DELETE CASCADE,
    url          TEXT NOT NULL,
    published_at TEXT,
    full_content TEXT
);

CREATE INDEX IF NOT EXISTS idx_web_content_id ON web(content_id);

-- Open Graph metadata, one-to-one with content
CREATE TABLE IF NOT EXISTS metadata (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    content_id     INTEGER NOT NULL REFERENCES content(id) ON DELETE CASCADE,
    og_title       TEXT,
    og_description TEXT,
    og_image       TEXT,
    keywords       TEXT
);

CREATE INDEX IF NOT EXISTS idx_metadata_content_id ON metadata(content_id);

-- Append-only audit trail of ingestion runs
CREATE TABLE IF NOT EXISTS sync_history (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    sync_time       TEXT NOT NULL,
    entries_added   INTEGER NOT NULL,
    entries_updated INTEGER NOT NULL,
    entries_scraped INTEGER NOT NULL,
    scrape_errors   INTEGER NOT NULL,
    sync_type       TEXT NOT NULL
);
"#;

/// libSQL-backed [`ContentStore`].
pub struct LibsqlStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl LibsqlStore {
    /// Open or create a local database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        Self::from_database(db).await
    }

    /// Connect to a remote (Turso) database.
    pub async fn open_remote(url: String, auth_token: String) -> Result<Self> {
        let db = libsql::Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let store = Self { db, conn };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Apply the idempotent schema bootstrap.
    async fn ensure_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map_err(|e| SyncError::Storage(format!("schema bootstrap failed: {e}")))?;
        debug!("sqlite schema ensured");
        Ok(())
    }
}

#[async_trait]
impl ContentStore for LibsqlStore {
    fn supports_embeddings(&self) -> bool {
        false
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        url_exists(&self.conn, url).await
    }

    async fn insert(&self, item: &NewContent) -> Result<InsertOutcome> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        // Authoritative duplicate re-check inside the transaction.
        if url_exists(&tx, &item.url).await? {
            tx.commit()
                .await
                .map_err(|e| SyncError::Storage(e.to_string()))?;
            return Ok(InsertOutcome::Duplicate);
        }

        match insert_scraped_rows(&tx, item).await {
            Ok(id) => {
                tx.commit()
                    .await
                    .map_err(|e| SyncError::Storage(e.to_string()))?;
                Ok(InsertOutcome::Inserted(id))
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn insert_unscraped(
        &self,
        url: &str,
        consumed_at: Option<DateTime<Utc>>,
        note: &str,
    ) -> Result<InsertOutcome> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        if url_exists(&tx, url).await? {
            tx.commit()
                .await
                .map_err(|e| SyncError::Storage(e.to_string()))?;
            return Ok(InsertOutcome::Duplicate);
        }

        match insert_failed_rows(&tx, url, consumed_at, note).await {
            Ok(id) => {
                tx.commit()
                    .await
                    .map_err(|e| SyncError::Storage(e.to_string()))?;
                Ok(InsertOutcome::Inserted(id))
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn list_retry_candidates(&self, limit: u32) -> Result<Vec<RetryCandidate>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, consumed_at, retry_count FROM content
                 WHERE content_type = ?1 AND is_scraped = 0
                   AND (retry_count IS NULL OR retry_count < ?2)
                 ORDER BY consumed_at DESC NULLS LAST, id DESC
                 LIMIT ?3",
                params![CONTENT_TYPE_WEB, i64::from(RETRY_CEILING), i64::from(limit)],
            )
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(RetryCandidate {
                id: row
                    .get::<i64>(0)
                    .map_err(|e| SyncError::Storage(e.to_string()))?,
                url: row
                    .get::<String>(1)
                    .map_err(|e| SyncError::Storage(e.to_string()))?,
                consumed_at: row.get::<String>(2).ok().and_then(|s| parse_timestamp(&s)),
                retry_count: row.get::<i64>(3).ok().unwrap_or(0) as u32,
            });
        }
        Ok(results)
    }

    async fn refresh_content(
        &self,
        id: i64,
        page: &ExtractedPage,
        _embedding: Option<&[f32]>,
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        match refresh_rows(&tx, id, page).await {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| SyncError::Storage(e.to_string())),
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn increment_retry_count(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE content SET retry_count = COALESCE(retry_count, 0) + 1 WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn mark_scraped(&self, id: i64, timestamp: DateTime<Utc>) -> Result<()> {
        let ts = timestamp.to_rfc3339();
        self.conn
            .execute(
                "UPDATE content SET is_scraped = 1, scraped_at = ?1 WHERE id = ?2",
                params![ts.as_str(), id],
            )
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn record_sync_history(&self, entry: &SyncHistoryEntry) -> Result<()> {
        let ts = entry.sync_time.to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO sync_history
                   (sync_time, entries_added, entries_updated, entries_scraped, scrape_errors, sync_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    ts.as_str(),
                    i64::from(entry.entries_added),
                    i64::from(entry.entries_updated),
                    i64::from(entry.entries_scraped),
                    i64::from(entry.scrape_errors),
                    entry.sync_type.as_str(),
                ],
            )
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn count_content(&self) -> Result<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM content").await
    }

    async fn count_unscraped(&self) -> Result<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM content WHERE is_scraped = 0").await
    }

    async fn recent_sync_history(&self, limit: u32) -> Result<Vec<SyncHistoryEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT sync_time, entries_added, entries_updated, entries_scraped, scrape_errors, sync_type
                 FROM sync_history ORDER BY id DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let raw_time: String = row
                .get(0)
                .map_err(|e| SyncError::Storage(e.to_string()))?;
            results.push(SyncHistoryEntry {
                sync_time: parse_timestamp(&raw_time)
                    .ok_or_else(|| SyncError::Storage(format!("invalid sync_time: {raw_time}")))?,
                entries_added: row
                    .get::<i64>(1)
                    .map_err(|e| SyncError::Storage(e.to_string()))? as u32,
                entries_updated: row
                    .get::<i64>(2)
                    .map_err(|e| SyncError::Storage(e.to_string()))? as u32,
                entries_scraped: row
                    .get::<i64>(3)
                    .map_err(|e| SyncError::Storage(e.to_string()))? as u32,
                scrape_errors: row
                    .get::<i64>(4)
                    .map_err(|e| SyncError::Storage(e.to_string()))? as u32,
                sync_type: row
                    .get::<String>(5)
                    .map_err(|e| SyncError::Storage(e.to_string()))?,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row helpers (shared between trait methods and their transactions)
// ---------------------------------------------------------------------------

async fn url_exists(conn: &Connection, url: &str) -> Result<bool> {
    let mut rows = conn
        .query("SELECT 1 FROM content WHERE url = ?1 LIMIT 1", params![url])
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

    match rows.next().await {
        Ok(Some(_)) => Ok(true),
        Ok(None) => Ok(false),
        Err(e) => Err(SyncError::Storage(e.to_string())),
    }
}

/// Insert content + web + metadata rows for a successful scrape.
/// Embeddings are dropped: this backend has no vector column.
async fn insert_scraped_rows(conn: &Connection, item: &NewContent) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO content (url, content_type, title, created_at, consumed_at, scraped_at, is_scraped)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
        params![
            item.url.as_str(),
            CONTENT_TYPE_WEB,
            item.title.as_str(),
            now.as_str(),
            item.consumed_at.map(|t| t.to_rfc3339()),
            now.as_str(),
        ],
    )
    .await
    .map_err(|e| SyncError::Storage(e.to_string()))?;

    let content_id = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO web (content_id, url, published_at, full_content) VALUES (?1, ?2, ?3, ?4)",
        params![
            content_id,
            item.url.as_str(),
            item.published_at.as_deref(),
            item.full_content.as_str(),
        ],
    )
    .await
    .map_err(|e| SyncError::Storage(e.to_string()))?;

    conn.execute(
        "INSERT INTO metadata (content_id, og_title, og_description, og_image, keywords)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            content_id,
            item.metadata.og_title.as_str(),
            item.metadata.og_description.as_str(),
            item.metadata.og_image.as_str(),
            item.metadata.keywords.as_str(),
        ],
    )
    .await
    .map_err(|e| SyncError::Storage(e.to_string()))?;

    Ok(content_id)
}

/// Insert the three rows for a failed scrape: unscraped, retry counter
/// at zero, URL standing in for the title and `note` for the body.
async fn insert_failed_rows(
    conn: &Connection,
    url: &str,
    consumed_at: Option<DateTime<Utc>>,
    note: &str,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO content (url, content_type, title, created_at, consumed_at, is_scraped, retry_count)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
        params![
            url,
            CONTENT_TYPE_WEB,
            url,
            now.as_str(),
            consumed_at.map(|t| t.to_rfc3339()),
        ],
    )
    .await
    .map_err(|e| SyncError::Storage(e.to_string()))?;

    let content_id = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO web (content_id, url, published_at, full_content) VALUES (?1, ?2, NULL, ?3)",
        params![content_id, url, note],
    )
    .await
    .map_err(|e| SyncError::Storage(e.to_string()))?;

    conn.execute(
        "INSERT INTO metadata (content_id, og_title, og_description, og_image, keywords)
         VALUES (?1, '', '', '', '')",
        params![content_id],
    )
    .await
    .map_err(|e| SyncError::Storage(e.to_string()))?;

    Ok(content_id)
}

async fn refresh_rows(conn: &Connection, id: i64, page: &ExtractedPage) -> Result<()> {
    conn.execute(
        "UPDATE content SET title = ?1 WHERE id = ?2",
        params![page.title.as_str(), id],
    )
    .await
    .map_err(|e| SyncError::Storage(e.to_string()))?;

    conn.execute(
        "UPDATE web SET published_at = ?1, full_content = ?2 WHERE content_id = ?3",
        params![page.published_at.as_deref(), page.full_content.as_str(), id],
    )
    .await
    .map_err(|e| SyncError::Storage(e.to_string()))?;

    conn.execute(
        "UPDATE metadata SET og_title = ?1, og_description = ?2, og_image = ?3, keywords = ?4
         WHERE content_id = ?5",
        params![
            page.metadata.og_title.as_str(),
            page.metadata.og_description.as_str(),
            page.metadata.og_image.as_str(),
            page.metadata.keywords.as_str(),
            id,
        ],
    )
    .await
    .map_err(|e| SyncError::Storage(e.to_string()))?;

    Ok(())
}

async fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let mut rows = conn
        .query(sql, params![])
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(row
            .get::<i64>(0)
            .map_err(|e| SyncError::Storage(e.to_string()))? as u64),
        Ok(None) => Ok(0),
        Err(e) => Err(SyncError::Storage(e.to_string())),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
