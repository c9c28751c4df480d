//! Cadence CLI - inspect and drive the offline-first music library
//!
//! Writes land in the local store immediately and are queued for the remote
//! API; `cadence sync` replays the queue.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::catalog::run_catalog;
use crate::commands::common::{resolve_db_path, Context};
use crate::commands::playlist::run_playlist;
use crate::commands::prefs::run_prefs;
use crate::commands::queue::{run_dead_letters, run_queue};
use crate::commands::sync::{run_status, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "cadence=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let ctx = Context {
        db_path: resolve_db_path(cli.db_path),
        offline: cli.offline,
    };

    match cli.command {
        Commands::Catalog(command) => run_catalog(command, &ctx).await?,
        Commands::Playlist(command) => run_playlist(command, &ctx).await?,
        Commands::Queue { json } => run_queue(json, &ctx).await?,
        Commands::DeadLetters(command) => run_dead_letters(command, &ctx).await?,
        Commands::Prefs(command) => run_prefs(command, &ctx).await?,
        Commands::Sync { json } => run_sync(json, &ctx).await?,
        Commands::Status { json } => run_status(json, &ctx).await?,
    }

    Ok(())
}
