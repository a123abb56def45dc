//! Core orchestration for contentsync.
//!
//! This crate ties the list API client, page extractor, embedding
//! provider, and content store together into the end-to-end sync run.

pub mod list;
pub mod runner;

pub use list::{ListApiClient, ListEntry};
pub use runner::{IngestionRunner, RunSummary, SilentProgress, SyncProgress};
