//! End-to-end sync run: list → extract → embed → store → audit row.
//!
//! One `IngestionRunner` drives every pipeline variant; the differences
//! (which database, whether embeddings are computed) live behind the
//! injected [`ContentStore`] and [`EmbeddingProvider`] collaborators.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use contentsync_embeddings::EmbeddingProvider;
use contentsync_extract::PageExtractor;
use contentsync_shared::{
    ExtractedPage, FAILED_SCRAPE_NOTE, NewContent, Result, RetryCandidate, SYNC_TYPE_API_FETCH,
    SyncConfig, SyncHistoryEntry,
};
use contentsync_store::{ContentStore, InsertOutcome};

use crate::list::{ListApiClient, ListEntry};

/// How many previously failed records one run re-attempts.
const RETRY_BATCH: u32 = 5;

/// Counters and timing for one sync run.
#[derive(Debug)]
pub struct RunSummary {
    /// New URLs stored by the main pass.
    pub added: u32,
    /// Previously failed URLs recovered by the retry pass.
    pub updated: u32,
    /// URLs skipped because they were already stored.
    pub skipped: u32,
    /// Per-item failures across both passes.
    pub errors: u32,
    /// Total content rows after the run, when the store could report it.
    pub total_content: Option<u64>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait SyncProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each entry is processed.
    fn item(&self, url: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl SyncProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _url: &str, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

enum ItemOutcome {
    Added,
    Skipped,
}

/// Orchestrates one sync run against injected collaborators.
pub struct IngestionRunner {
    list: ListApiClient,
    extractor: PageExtractor,
    store: Arc<dyn ContentStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: SyncConfig,
}

impl IngestionRunner {
    pub fn new(
        list: ListApiClient,
        extractor: PageExtractor,
        store: Arc<dyn ContentStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            list,
            extractor,
            store,
            embedder,
            config,
        }
    }

    /// Run one full sync.
    ///
    /// 1. Fetch the URL list (fatal on failure)
    /// 2. Process entries up to the configured limit
    /// 3. Retry previously failed scrapes
    /// 4. Record the sync-history row and log totals
    ///
    /// Per-item failures are tallied, never propagated; only list-fetch
    /// failure aborts the run.
    #[instrument(skip_all)]
    pub async fn run(&self, progress: &dyn SyncProgress) -> Result<RunSummary> {
        let start = Instant::now();

        if self.embedder.is_some() && !self.store.supports_embeddings() {
            warn!("store has no vector support, embeddings will not be persisted");
        }

        // --- Fetch list ---
        progress.phase("Fetching URL list");
        let mut entries = self.list.fetch_entries().await?;
        let received = entries.len();
        entries.truncate(self.config.fetch_limit as usize);
        info!(received, processing = entries.len(), "list fetched");

        // --- Main pass ---
        progress.phase("Processing entries");
        let mut added = 0u32;
        let mut skipped = 0u32;
        let mut errors = 0u32;

        let total = entries.len();
        for (i, entry) in entries.iter().enumerate() {
            progress.item(&entry.url, i + 1, total);

            match self.process_entry(entry).await {
                Ok(ItemOutcome::Added) => added += 1,
                Ok(ItemOutcome::Skipped) => skipped += 1,
                Err(e) => {
                    warn!(url = %entry.url, error = %e, "entry failed");
                    errors += 1;
                }
            }

            // Politeness pause, skipped after the final entry
            if i + 1 < total && self.config.rate_limit_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.rate_limit_ms)).await;
            }
        }

        // --- Retry pass ---
        progress.phase("Retrying failed scrapes");
        let (updated, retry_errors) = self.retry_pass().await;
        errors += retry_errors;

        // --- Finalize ---
        progress.phase("Recording sync history");
        let history = SyncHistoryEntry {
            sync_time: Utc::now(),
            entries_added: added,
            entries_updated: updated,
            entries_scraped: added + updated,
            scrape_errors: errors,
            sync_type: SYNC_TYPE_API_FETCH.to_string(),
        };
        if let Err(e) = self.store.record_sync_history(&history).await {
            warn!(error = %e, "failed to record sync history");
        }

        let total_content = match self.store.count_content().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "failed to count content rows");
                None
            }
        };

        let summary = RunSummary {
            added,
            updated,
            skipped,
            errors,
            total_content,
            elapsed: start.elapsed(),
        };

        progress.done(&summary);

        info!(
            added = summary.added,
            updated = summary.updated,
            skipped = summary.skipped,
            errors = summary.errors,
            total_content = ?summary.total_content,
            elapsed_ms = summary.elapsed.as_millis(),
            "sync run complete"
        );

        Ok(summary)
    }

    async fn process_entry(&self, entry: &ListEntry) -> Result<ItemOutcome> {
        if self.store.exists(&entry.url).await? {
            debug!(url = %entry.url, "already stored, skipping");
            return Ok(ItemOutcome::Skipped);
        }

        let page = match self.extractor.extract(&entry.url).await {
            Ok(page) => page,
            Err(e) => {
                // Persist the failure so the retry pass can find it.
                let note = format!("{FAILED_SCRAPE_NOTE} Error: {e}");
                self.store
                    .insert_unscraped(&entry.url, entry.consumed_at, &note)
                    .await?;
                return Err(e);
            }
        };

        let embedding = self.embed_page(&page).await?;
        let item = NewContent::from_page(page, entry.consumed_at, embedding);

        match self.store.insert(&item).await? {
            InsertOutcome::Inserted(id) => {
                debug!(url = %entry.url, id, "stored");
                Ok(ItemOutcome::Added)
            }
            InsertOutcome::Duplicate => Ok(ItemOutcome::Skipped),
        }
    }

    /// Embed when a provider is configured and the store can hold the
    /// vector. A provider error propagates and the item is not stored.
    async fn embed_page(&self, page: &ExtractedPage) -> Result<Option<Vec<f32>>> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };
        if !self.store.supports_embeddings() {
            return Ok(None);
        }

        let input = contentsync_embeddings::truncate_input(&page.full_content);
        let vector = embedder.embed(input).await?;
        Ok(Some(vector))
    }

    /// Give previously failed URLs another chance, bounded per run.
    /// Returns (recovered, errors).
    async fn retry_pass(&self) -> (u32, u32) {
        let candidates = match self.store.list_retry_candidates(RETRY_BATCH).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "failed to list retry candidates");
                return (0, 1);
            }
        };

        if candidates.is_empty() {
            return (0, 0);
        }
        info!(count = candidates.len(), "retrying failed scrapes");

        let mut recovered = 0u32;
        let mut errors = 0u32;

        for candidate in candidates {
            match self.retry_one(&candidate).await {
                Ok(()) => {
                    info!(url = %candidate.url, "retry recovered");
                    recovered += 1;
                }
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "retry failed");
                    if let Err(e) = self.store.increment_retry_count(candidate.id).await {
                        warn!(id = candidate.id, error = %e, "failed to bump retry count");
                    }
                    errors += 1;
                }
            }
        }

        (recovered, errors)
    }

    async fn retry_one(&self, candidate: &RetryCandidate) -> Result<()> {
        let page = self.extractor.extract(&candidate.url).await?;
        let embedding = self.embed_page(&page).await?;

        self.store
            .refresh_content(candidate.id, &page, embedding.as_deref())
            .await?;
        // Only flip the flag once the refreshed content is durable.
        self.store.mark_scraped(candidate.id, Utc::now()).await?;
        Ok(())
    }
}
