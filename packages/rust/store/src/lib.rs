//! Storage backends for contentsync.
//!
//! [`ContentStore`] is the capability seam the ingestion runner depends
//! on. Two implementations exist:
//! - [`LibsqlStore`] — embedded or remote (Turso) sqlite, no native
//!   vector support; embeddings are silently omitted.
//! - [`PostgresStore`] — server-side SQL with a pgvector embedding
//!   column.
//!
//! The backend is selected by configuration at process start and passed
//! into the runner as `Arc<dyn ContentStore>`.

mod postgres;
mod sqlite;

pub use postgres::PostgresStore;
pub use sqlite::LibsqlStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use contentsync_shared::{ExtractedPage, NewContent, Result, RetryCandidate, SyncHistoryEntry};

/// Outcome of an insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new content row was created with this id.
    Inserted(i64),
    /// The URL already exists; nothing was written.
    Duplicate,
}

/// Persistence operations the ingestion pipeline needs.
///
/// URL uniqueness is enforced here: [`ContentStore::exists`] is a cheap
/// pre-check, but every insert re-checks inside its own transaction and
/// that second check is authoritative.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Whether this backend can persist embedding vectors.
    fn supports_embeddings(&self) -> bool;

    /// URL existence pre-check.
    async fn exists(&self, url: &str) -> Result<bool>;

    /// Persist a scraped item: one content row, one body row, and one
    /// metadata row, created together in a single transaction. Rolls
    /// all three back on any failure.
    async fn insert(&self, item: &NewContent) -> Result<InsertOutcome>;

    /// Record a failed scrape as an unscraped row so the retry pass can
    /// pick it up on a later run. `note` becomes the placeholder body.
    async fn insert_unscraped(
        &self,
        url: &str,
        consumed_at: Option<DateTime<Utc>>,
        note: &str,
    ) -> Result<InsertOutcome>;

    /// Unscraped records below the retry ceiling, most recently consumed
    /// first, bounded by `limit`.
    async fn list_retry_candidates(&self, limit: u32) -> Result<Vec<RetryCandidate>>;

    /// Replace a record's title, body, and metadata with fresh extraction
    /// results. Does not change the scraped flag.
    async fn refresh_content(
        &self,
        id: i64,
        page: &ExtractedPage,
        embedding: Option<&[f32]>,
    ) -> Result<()>;

    /// Bump a record's retry counter after a failed re-attempt.
    async fn increment_retry_count(&self, id: i64) -> Result<()>;

    /// Flag a record as successfully scraped. Idempotent.
    async fn mark_scraped(&self, id: i64, timestamp: DateTime<Utc>) -> Result<()>;

    /// Append one audit row for a completed run.
    async fn record_sync_history(&self, entry: &SyncHistoryEntry) -> Result<()>;

    /// Total content rows.
    async fn count_content(&self) -> Result<u64>;

    /// Content rows still awaiting a successful scrape.
    async fn count_unscraped(&self) -> Result<u64>;

    /// Most recent sync-history rows, newest first.
    async fn recent_sync_history(&self, limit: u32) -> Result<Vec<SyncHistoryEntry>>;
}
