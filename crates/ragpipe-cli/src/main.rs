//! Ragpipe CLI
//!
//! Chunk documents, ingest them into a local store and retrieve context.

use anyhow::Result;
use clap::Parser;
use ragpipe_core::error::exit_codes;
use ragpipe_core::{Config, RagPipeError};

mod app;
mod commands;
mod output;
mod progress;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<RagPipeError>()
            .map(RagPipeError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Chunk(args) => commands::chunk::run(args, &config, cli.format),
        Commands::Ingest(args) => commands::ingest::run(args, &config, cli.format).await,
        Commands::Query(args) => commands::query::run(args, &config, cli.format).await,
        Commands::Stats(args) => commands::stats::run(args, cli.format),
    }
}
