//! PostgreSQL backend via sqlx.
//!
//! The only backend with embedding support: `web.embedding` is a
//! pgvector column, so the `vector` extension must be installable on
//! the target database. Bootstrap fails otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::debug;

use contentsync_shared::{
    CONTENT_TYPE_WEB, ExtractedPage, NewContent, RETRY_CEILING, Result, RetryCandidate,
    SyncError, SyncHistoryEntry,
};

use crate::{ContentStore, InsertOutcome};

const MAX_CONNECTIONS: u32 = 5;

/// Idempotent schema bootstrap, applied on every connect.
const SCHEMA: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

-- Canonical record per ingested URL
CREATE TABLE IF NOT EXISTS content (
    id           BIGSERIAL PRIMARY KEY,
    url          TEXT NOT NULL UNIQUE,
    content_type TEXT NOT NULL,
    title        TEXT,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    consumed_at  TIMESTAMPTZ,
    scraped_at   TIMESTAMPTZ,
    is_scraped   BOOLEAN NOT NULL DEFAULT FALSE,
    retry_count  INTEGER
);

CREATE INDEX IF NOT EXISTS idx_content_unscraped ON content(is_scraped, retry_count);

-- Scraped body text and its embedding, one-to-one with content
CREATE TABLE IF NOT EXISTS web (
    id           BIGSERIAL PRIMARY KEY,
    content_id   BIGINT NOT NULL REFERENCES content(id) ON DELETE CASCADE,
    url          TEXT NOT NULL,
    published_at TEXT,
    full_content TEXT,
    embedding    vector(1536)
);

CREATE INDEX IF NOT EXISTS idx_web_content_id ON web(content_id);

-- Open Graph metadata, one-to-one with content
CREATE TABLE IF NOT EXISTS metadata (
    id             BIGSERIAL PRIMARY KEY,
    content_id     BIGINT NOT NULL REFERENCES content(id) ON DELETE CASCADE,
    og_title       TEXT,
    og_description TEXT,
    og_image       TEXT,
    keywords       TEXT
);

CREATE INDEX IF NOT EXISTS idx_metadata_content_id ON metadata(content_id);

-- Append-only audit trail of ingestion runs
CREATE TABLE IF NOT EXISTS sync_history (
    id              BIGSERIAL PRIMARY KEY,
    sync_time       TIMESTAMPTZ NOT NULL,
    entries_added   INTEGER NOT NULL,
    entries_updated INTEGER NOT NULL,
    entries_scraped INTEGER NOT NULL,
    scrape_errors   INTEGER NOT NULL,
    sync_type       TEXT NOT NULL
);
"#;

/// Postgres-backed [`ContentStore`].
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to a Postgres database and bootstrap the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(format!("schema bootstrap failed: {e}")))?;
        debug!("postgres schema ensured");
        Ok(())
    }
}

#[async_trait]
impl ContentStore for PostgresStore {
    fn supports_embeddings(&self) -> bool {
        true
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        let hit = sqlx::query_scalar::<_, i32>("SELECT 1 FROM content WHERE url = $1 LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(hit.is_some())
    }

    async fn insert(&self, item: &NewContent) -> Result<InsertOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        // Authoritative duplicate re-check inside the transaction.
        let hit = sqlx::query_scalar::<_, i32>("SELECT 1 FROM content WHERE url = $1 LIMIT 1")
            .bind(&item.url)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        if hit.is_some() {
            tx.commit()
                .await
                .map_err(|e| SyncError::Storage(e.to_string()))?;
            return Ok(InsertOutcome::Duplicate);
        }

        let content_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO content
               (url, content_type, title, created_at, consumed_at, scraped_at, is_scraped)
             VALUES ($1, $2, $3, now(), $4, now(), TRUE)
             RETURNING id",
        )
        .bind(&item.url)
        .bind(CONTENT_TYPE_WEB)
        .bind(&item.title)
        .bind(item.consumed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        let embedding = item.embedding.as_deref().map(vector_literal);
        sqlx::query(
            "INSERT INTO web (content_id, url, published_at, full_content, embedding)
             VALUES ($1, $2, $3, $4, $5::vector)",
        )
        .bind(content_id)
        .bind(&item.url)
        .bind(&item.published_at)
        .bind(&item.full_content)
        .bind(embedding)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO metadata (content_id, og_title, og_description, og_image, keywords)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(content_id)
        .bind(&item.metadata.og_title)
        .bind(&item.metadata.og_description)
        .bind(&item.metadata.og_image)
        .bind(&item.metadata.keywords)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(InsertOutcome::Inserted(content_id))
    }

    async fn insert_unscraped(
        &self,
        url: &str,
        consumed_at: Option<DateTime<Utc>>,
        note: &str,
    ) -> Result<InsertOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let hit = sqlx::query_scalar::<_, i32>("SELECT 1 FROM content WHERE url = $1 LIMIT 1")
            .bind(url)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        if hit.is_some() {
            tx.commit()
                .await
                .map_err(|e| SyncError::Storage(e.to_string()))?;
            return Ok(InsertOutcome::Duplicate);
        }

        // URL stands in for the title until a retry recovers the page.
        let content_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO content
               (url, content_type, title, created_at, consumed_at, is_scraped, retry_count)
             VALUES ($1, $2, $1, now(), $3, FALSE, 0)
             RETURNING id",
        )
        .bind(url)
        .bind(CONTENT_TYPE_WEB)
        .bind(consumed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO web (content_id, url, published_at, full_content)
             VALUES ($1, $2, NULL, $3)",
        )
        .bind(content_id)
        .bind(url)
        .bind(note)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO metadata (content_id, og_title, og_description, og_image, keywords)
             VALUES ($1, '', '', '', '')",
        )
        .bind(content_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(InsertOutcome::Inserted(content_id))
    }

    async fn list_retry_candidates(&self, limit: u32) -> Result<Vec<RetryCandidate>> {
        let rows = sqlx::query_as::<_, (i64, String, Option<DateTime<Utc>>, Option<i32>)>(
            "SELECT id, url, consumed_at, retry_count FROM content
             WHERE content_type = $1 AND is_scraped = FALSE
               AND (retry_count IS NULL OR retry_count < $2)
             ORDER BY consumed_at DESC NULLS LAST, id DESC
             LIMIT $3",
        )
        .bind(CONTENT_TYPE_WEB)
        .bind(RETRY_CEILING as i32)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(id, url, consumed_at, retry_count)| RetryCandidate {
                id,
                url,
                consumed_at,
                retry_count: retry_count.unwrap_or(0) as u32,
            })
            .collect())
    }

    async fn refresh_content(
        &self,
        id: i64,
        page: &ExtractedPage,
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        sqlx::query("UPDATE content SET title = $1 WHERE id = $2")
            .bind(&page.title)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let vector = embedding.map(vector_literal);
        sqlx::query(
            "UPDATE web SET published_at = $1, full_content = $2, embedding = $3::vector
             WHERE content_id = $4",
        )
        .bind(&page.published_at)
        .bind(&page.full_content)
        .bind(vector)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        sqlx::query(
            "UPDATE metadata SET og_title = $1, og_description = $2, og_image = $3, keywords = $4
             WHERE content_id = $5",
        )
        .bind(&page.metadata.og_title)
        .bind(&page.metadata.og_description)
        .bind(&page.metadata.og_image)
        .bind(&page.metadata.keywords)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn increment_retry_count(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE content SET retry_count = COALESCE(retry_count, 0) + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn mark_scraped(&self, id: i64, timestamp: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE content SET is_scraped = TRUE, scraped_at = $1 WHERE id = $2")
            .bind(timestamp)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn record_sync_history(&self, entry: &SyncHistoryEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_history
               (sync_time, entries_added, entries_updated, entries_scraped, scrape_errors, sync_type)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.sync_time)
        .bind(entry.entries_added as i32)
        .bind(entry.entries_updated as i32)
        .bind(entry.entries_scraped as i32)
        .bind(entry.scrape_errors as i32)
        .bind(&entry.sync_type)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn count_content(&self) -> Result<u64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM content")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(n as u64)
    }

    async fn count_unscraped(&self) -> Result<u64> {
        let n =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM content WHERE is_scraped = FALSE")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(n as u64)
    }

    async fn recent_sync_history(&self, limit: u32) -> Result<Vec<SyncHistoryEntry>> {
        let rows = sqlx::query_as::<_, (DateTime<Utc>, i32, i32, i32, i32, String)>(
            "SELECT sync_time, entries_added, entries_updated, entries_scraped, scrape_errors, sync_type
             FROM sync_history ORDER BY id DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(sync_time, added, updated, scraped, errors, sync_type)| SyncHistoryEntry {
                    sync_time,
                    entries_added: added as u32,
                    entries_updated: updated as u32,
                    entries_scraped: scraped as u32,
                    scrape_errors: errors as u32,
                    sync_type,
                },
            )
            .collect())
    }
}

/// pgvector input literal: `[v1,v2,...]`.
fn vector_literal(values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_formats_pgvector_input() {
        assert_eq!(vector_literal(&[1.0, -0.5, 0.25]), "[1,-0.5,0.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }
}
