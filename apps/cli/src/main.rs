//! contentsync CLI — periodic web-content ingestion job.
//!
//! Pulls the pending URL list from the content API, scrapes each page,
//! optionally embeds the text, and stores everything in the configured
//! database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
