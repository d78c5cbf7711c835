//! Satchel CLI - offline-first task tools
//!
//! Inspect and exercise the sync core from the terminal: reconcile
//! snapshots, preview display merges, and run a scripted sync scenario.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("satchel=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Resolve {
            local,
            remote,
            strategy,
            json,
        } => commands::resolve::run_resolve(&local, &remote, strategy, json)?,
        Commands::Merge {
            local,
            remote,
            json,
        } => commands::merge::run_merge(&local, &remote, json)?,
        Commands::Simulate => commands::simulate::run_simulate().await?,
    }
    Ok(())
}
