//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use contentsync_core::list::ListApiClient;
use contentsync_core::runner::{IngestionRunner, RunSummary, SilentProgress, SyncProgress};
use contentsync_embeddings::{EmbeddingProvider, OpenAiEmbeddings};
use contentsync_extract::PageExtractor;
use contentsync_shared::{
    AppConfig, SyncConfig, embedding_api_key, init_config, load_config, load_config_from,
    postgres_url, resolve_db_path, turso_credentials,
};
use contentsync_store::{ContentStore, LibsqlStore, PostgresStore};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// contentsync — pull the content feed into your database.
#[derive(Parser)]
#[command(
    name = "contentsync",
    version,
    about = "Fetch the pending URL list, scrape each page, and store the results.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one sync: fetch the list, scrape, store, record history.
    Run {
        /// Maximum number of list entries to process.
        #[arg(long, env = "CONTENTSYNC_LIMIT")]
        limit: Option<u32>,

        /// List API endpoint override.
        #[arg(long, env = "CONTENTSYNC_ENDPOINT")]
        endpoint: Option<String>,

        /// Config file path override.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Suppress spinner output (logs only).
        #[arg(long)]
        quiet: bool,
    },

    /// Show store totals and recent sync history.
    Stats {
        /// Config file path override.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "contentsync=info",
        1 => "contentsync=debug",
        _ => "contentsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            limit,
            endpoint,
            config,
            quiet,
        } => cmd_run(limit, endpoint.as_deref(), config.as_deref(), quiet).await,
        Command::Stats { config } => cmd_stats(config.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    limit: Option<u32>,
    endpoint: Option<&str>,
    config_path: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let config = load(config_path)?;

    let mut sync: SyncConfig = (&config).into();
    if let Some(limit) = limit {
        sync.fetch_limit = limit;
    }
    if let Some(endpoint) = endpoint {
        sync.endpoint = endpoint.to_string();
    }

    // Validate credentials before opening any connection
    let embedder = build_embedder(&config)?;
    let store = build_store(&config).await?;

    let list = ListApiClient::new(sync.endpoint.clone())?;
    let extractor = PageExtractor::new()?;

    info!(
        endpoint = %sync.endpoint,
        limit = sync.fetch_limit,
        "starting sync run"
    );

    let runner = IngestionRunner::new(list, extractor, store, embedder, sync);

    let summary = if quiet {
        runner.run(&SilentProgress).await?
    } else {
        let progress = CliProgress::new();
        runner.run(&progress).await?
    };

    println!();
    println!("  Sync complete!");
    println!("  Added:   {}", summary.added);
    println!("  Updated: {}", summary.updated);
    println!("  Skipped: {}", summary.skipped);
    println!("  Errors:  {}", summary.errors);
    if let Some(total) = summary.total_content {
        println!("  Total:   {total} content rows");
    }
    println!("  Time:    {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Pick the store backend from configuration.
async fn build_store(config: &AppConfig) -> Result<Arc<dyn ContentStore>> {
    match config.store.backend.as_str() {
        "sqlite" => {
            if let Some((url, token)) = turso_credentials(config) {
                info!("using remote sqlite store");
                Ok(Arc::new(LibsqlStore::open_remote(url, token).await?))
            } else {
                let path = resolve_db_path(config)?;
                info!(path = %path.display(), "using local sqlite store");
                Ok(Arc::new(LibsqlStore::open(&path).await?))
            }
        }
        "postgres" => {
            let url = postgres_url(config)?;
            info!("using postgres store");
            Ok(Arc::new(PostgresStore::connect(&url).await?))
        }
        other => Err(eyre!(
            "unknown store backend '{other}': expected 'sqlite' or 'postgres'"
        )),
    }
}

fn build_embedder(config: &AppConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    if !config.embeddings.enabled {
        return Ok(None);
    }

    let api_key = embedding_api_key(config)?;
    let provider = OpenAiEmbeddings::new(
        config.embeddings.base_url.clone(),
        api_key,
        config.embeddings.model.clone(),
    )?;
    Ok(Some(Arc::new(provider)))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl SyncProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processing [{current}/{total}] {url}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// stats
// ---------------------------------------------------------------------------

async fn cmd_stats(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let store = build_store(&config).await?;

    let total = store.count_content().await?;
    let unscraped = store.count_unscraped().await?;

    println!();
    println!("  Content rows: {total}");
    println!("  Scraped:      {}", total - unscraped);
    println!("  Unscraped:    {unscraped}");
    println!();

    let history = store.recent_sync_history(5).await?;
    if history.is_empty() {
        println!("  No sync history yet.");
    } else {
        println!("  Recent syncs:");
        for entry in &history {
            println!(
                "    {}  added={} updated={} scraped={} errors={} ({})",
                entry.sync_time.format("%Y-%m-%d %H:%M:%S"),
                entry.entries_added,
                entry.entries_updated,
                entry.entries_scraped,
                entry.scrape_errors,
                entry.sync_type
            );
        }
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
