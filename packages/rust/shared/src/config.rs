//! Application configuration for contentsync.
//!
//! User config lives at `~/.contentsync/contentsync.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! Credentials are never stored in the file. The file names the
//! environment variables to read them from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contentsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contentsync";

// ---------------------------------------------------------------------------
// Config structs (matching contentsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// List API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding settings.
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// List API endpoint returning the URLs to ingest.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum list entries processed per run.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,

    /// Pause in ms between page fetches.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            fetch_limit: default_fetch_limit(),
            rate_limit_ms: default_rate_limit(),
        }
    }
}

fn default_endpoint() -> String {
    "https://open-source-content.xyz/v1/web".into()
}
fn default_fetch_limit() -> u32 {
    10
}
fn default_rate_limit() -> u64 {
    2000
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend: "sqlite" or "postgres".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Local database path for the sqlite backend.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Name of the env var holding a remote sqlite (Turso) URL.
    #[serde(default = "default_url_env")]
    pub url_env: String,

    /// Name of the env var holding the remote sqlite auth token.
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,

    /// Name of the env var holding the Postgres connection URL.
    #[serde(default = "default_database_url_env")]
    pub database_url_env: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            url_env: default_url_env(),
            auth_token_env: default_auth_token_env(),
            database_url_env: default_database_url_env(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".into()
}
fn default_db_path() -> String {
    "~/.contentsync/contentsync.db".into()
}
fn default_url_env() -> String {
    "TURSO_DATABASE_URL".into()
}
fn default_auth_token_env() -> String {
    "TURSO_AUTH_TOKEN".into()
}
fn default_database_url_env() -> String {
    "DATABASE_URL".into()
}

/// `[embeddings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Whether to generate embeddings for scraped content.
    #[serde(default)]
    pub enabled: bool,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Embedding model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the embedding API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "text-embedding-3-small".into()
}
fn default_base_url() -> String {
    "https://api.openai.com".into()
}

// ---------------------------------------------------------------------------
// Sync config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime ingestion configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// List API endpoint.
    pub endpoint: String,
    /// Maximum list entries processed per run.
    pub fetch_limit: u32,
    /// Pause in ms between page fetches.
    pub rate_limit_ms: u64,
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.api.endpoint.clone(),
            fetch_limit: config.api.fetch_limit,
            rate_limit_ms: config.api.rate_limit_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contentsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contentsync/contentsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the local sqlite database path, expanding a leading `~/`.
pub fn resolve_db_path(config: &AppConfig) -> Result<PathBuf> {
    let raw = &config.store.db_path;
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SyncError::config("could not determine home directory"))?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(raw))
}

/// Check that the embedding API key env var is set and non-empty, and return the key.
pub fn embedding_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.embeddings.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SyncError::config(format!(
            "embedding API key not found. Set the {var_name} environment variable, \
             or disable embeddings in the config."
        ))),
    }
}

/// Read the Postgres connection URL from the configured env var.
pub fn postgres_url(config: &AppConfig) -> Result<String> {
    let var_name = &config.store.database_url_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SyncError::config(format!(
            "Postgres connection URL not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Read remote sqlite credentials when both env vars are set and non-empty.
pub fn turso_credentials(config: &AppConfig) -> Option<(String, String)> {
    let url = std::env::var(&config.store.url_env).ok().filter(|v| !v.is_empty())?;
    let token = std::env::var(&config.store.auth_token_env)
        .ok()
        .filter(|v| !v.is_empty())?;
    Some((url, token))
}
