//! Error types for contentsync.
//!
//! Library crates use [`SyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all contentsync operations.
///
/// Per-item failures (timeouts, bad statuses, storage rollbacks) are caught
/// and tallied at the item boundary; only [`SyncError::Config`] and
/// [`SyncError::ListApi`] abort a run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Configuration loading or validation error. Fatal before any item runs.
    #[error("config error: {message}")]
    Config { message: String },

    /// List API fetch or parse error. Fatal for the whole run.
    #[error("list api error: {0}")]
    ListApi(String),

    /// Page fetch exceeded the time budget. Recoverable per item.
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    /// Non-2xx response from a scraped page. Recoverable per item.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Other network/transport error. Recoverable per item.
    #[error("network error: {0}")]
    Network(String),

    /// Embedding provider error. The item is counted as an error, not stored.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Database or storage layer error. The item's transaction is rolled back.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a timeout error for a URL.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Create an HTTP status error for a URL.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SyncError::config("missing embedding API key");
        assert_eq!(err.to_string(), "config error: missing embedding API key");

        let err = SyncError::http_status("https://example.com/a", 503);
        assert_eq!(err.to_string(), "HTTP 503 from https://example.com/a");

        let err = SyncError::timeout("https://example.com/slow");
        assert!(err.to_string().contains("timed out"));
    }
}
