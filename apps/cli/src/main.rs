//! Feedloom CLI — feed ingestion and enrichment pipeline.
//!
//! Resolves registered feeds into items, fetches and LLM-enriches them,
//! synthesizes per-tag aggregate articles, and renders aggregates to audio.

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
