//! Shared types, error model, and configuration for contentsync.
//!
//! This crate is the foundation depended on by all other contentsync crates.
//! It provides:
//! - [`SyncError`] — the unified error type
//! - Domain types ([`ExtractedPage`], [`NewContent`], [`SyncHistoryEntry`])
//! - Configuration ([`AppConfig`], [`SyncConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, EmbeddingsConfig, StoreConfig, SyncConfig, config_dir,
    config_file_path, embedding_api_key, init_config, load_config, load_config_from,
    postgres_url, resolve_db_path, turso_credentials,
};
pub use error::{Result, SyncError};
pub use types::{
    CONTENT_TYPE_WEB, ExtractedPage, FAILED_SCRAPE_NOTE, NewContent, PageMetadata,
    RETRY_CEILING, RetryCandidate, SYNC_TYPE_API_FETCH, SyncHistoryEntry,
};
