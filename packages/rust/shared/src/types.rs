//! Core domain types for the contentsync ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `content_type` value written for every record this pipeline creates.
pub const CONTENT_TYPE_WEB: &str = "web";

/// `sync_type` tag written on every sync-history row.
pub const SYNC_TYPE_API_FETCH: &str = "api_fetch";

/// Maximum automatic re-attempts before a failed URL is no longer retried.
pub const RETRY_CEILING: u32 = 3;

/// Body text stored for a URL whose scrape failed, ahead of any retry.
pub const FAILED_SCRAPE_NOTE: &str = "Failed to retrieve content from this page.";

// ---------------------------------------------------------------------------
// Extraction output
// ---------------------------------------------------------------------------

/// Open-Graph-style metadata scraped from a page's `<meta>` tags.
///
/// Every field independently defaults to the empty string when the
/// corresponding tag is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub og_title: String,
    #[serde(default)]
    pub og_description: String,
    #[serde(default)]
    pub og_image: String,
    #[serde(default)]
    pub keywords: String,
}

/// Structured content extracted from one fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// The URL the page was fetched from.
    pub url: String,
    /// Document title, falling back to the first `<h1>`, then the URL.
    /// Never empty.
    pub title: String,
    /// Raw publication date string from page metadata. `None` when no
    /// metadata yields one — never an empty string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    /// Cleaned structural text extraction of the page body.
    pub full_content: String,
    /// Best-effort Open Graph metadata.
    #[serde(default)]
    pub metadata: PageMetadata,
}

// ---------------------------------------------------------------------------
// Store payloads
// ---------------------------------------------------------------------------

/// Everything the store needs to persist one successfully scraped item.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub url: String,
    pub title: String,
    /// External item creation timestamp from the list API, when present.
    pub consumed_at: Option<DateTime<Utc>>,
    pub published_at: Option<String>,
    pub full_content: String,
    pub metadata: PageMetadata,
    /// Present only when the embedding step ran; stores without native
    /// vector support ignore it.
    pub embedding: Option<Vec<f32>>,
}

impl NewContent {
    /// Build a store payload from an extracted page plus per-item context.
    pub fn from_page(
        page: ExtractedPage,
        consumed_at: Option<DateTime<Utc>>,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        Self {
            url: page.url,
            title: page.title,
            consumed_at,
            published_at: page.published_at,
            full_content: page.full_content,
            metadata: page.metadata,
            embedding,
        }
    }
}

/// A previously failed record selected for the retry pass.
#[derive(Debug, Clone)]
pub struct RetryCandidate {
    pub id: i64,
    pub url: String,
    pub consumed_at: Option<DateTime<Utc>>,
    /// Re-attempts so far. Records at or above [`RETRY_CEILING`] are never
    /// selected.
    pub retry_count: u32,
}

/// Append-only audit row summarizing one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub sync_time: DateTime<Utc>,
    /// New content rows created by the main pass.
    pub entries_added: u32,
    /// Previously failed rows recovered in place by the retry pass.
    pub entries_updated: u32,
    /// Pages successfully scraped this run (added + updated).
    pub entries_scraped: u32,
    /// Per-item failures across both passes.
    pub scrape_errors: u32,
    /// Constant tag identifying the pipeline, see [`SYNC_TYPE_API_FETCH`].
    pub sync_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_defaults_to_empty_strings() {
        let meta = PageMetadata::default();
        assert_eq!(meta.og_title, "");
        assert_eq!(meta.og_description, "");
        assert_eq!(meta.og_image, "");
        assert_eq!(meta.keywords, "");
    }

    #[test]
    fn extracted_page_serialization() {
        let page = ExtractedPage {
            url: "https://example.com/a".into(),
            title: "A".into(),
            published_at: None,
            full_content: "Hello from the page body".into(),
            metadata: PageMetadata::default(),
        };

        let json = serde_json::to_string(&page).expect("serialize");
        // Absent publication date serializes as absent, not null or "".
        assert!(!json.contains("published_at"));

        let parsed: ExtractedPage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.title, "A");
        assert_eq!(parsed.published_at, None);
    }

    #[test]
    fn new_content_from_page_carries_fields() {
        let page = ExtractedPage {
            url: "https://example.com/a".into(),
            title: "A".into(),
            published_at: Some("2024-03-01T00:00:00Z".into()),
            full_content: "body".into(),
            metadata: PageMetadata {
                og_title: "A (og)".into(),
                ..Default::default()
            },
        };

        let item = NewContent::from_page(page, None, Some(vec![0.5; 4]));
        assert_eq!(item.url, "https://example.com/a");
        assert_eq!(item.published_at.as_deref(), Some("2024-03-01T00:00:00Z"));
        assert_eq!(item.metadata.og_title, "A (og)");
        assert_eq!(item.embedding.as_ref().map(Vec::len), Some(4));
    }
}
