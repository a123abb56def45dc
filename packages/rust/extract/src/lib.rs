//! Page fetching and content extraction for contentsync.
//!
//! [`PageExtractor`] issues the HTTP GET for one URL and turns the
//! response HTML into an [`ExtractedPage`]: title, Open-Graph metadata,
//! best-effort publication date, and a cleaned plain-text body.
//!
//! Fetch failures are reported truthfully — a timeout, HTTP error, or
//! network failure surfaces as an error rather than placeholder
//! content, leaving the retry decision to the caller.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use contentsync_shared::{ExtractedPage, Result, SyncError};

mod text;

/// Browser-like User-Agent for page fetches. Several sites serve empty
/// or blocked responses to clients identifying as bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Per-page fetch time budget.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches pages and extracts structured content from their HTML.
pub struct PageExtractor {
    client: Client,
}

impl PageExtractor {
    /// Create an extractor with the default fetch timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    /// Create an extractor with a custom fetch timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Fetch `url` and extract its content.
    ///
    /// A fetch exceeding the time budget fails with [`SyncError::Timeout`],
    /// distinct from other network failures. A non-2xx response fails with
    /// [`SyncError::HttpStatus`] carrying the status code.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract(&self, url: &str) -> Result<ExtractedPage> {
        debug!("fetching page");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::timeout(url)
            } else {
                SyncError::Network(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::http_status(url, status.as_u16()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::timeout(url)
            } else {
                SyncError::Network(format!("{url}: body read failed: {e}"))
            }
        })?;

        let page = text::build_page(url, &body);
        debug!(
            title = %page.title,
            content_len = page.full_content.len(),
            "extracted page"
        );

        Ok(page)
    }
}
