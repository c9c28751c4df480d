use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Offline-first music library with a durable sync queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Treat the network as unavailable (writes are stamped `offline`)
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage catalog items
    #[command(subcommand)]
    Catalog(CatalogCommand),
    /// Manage playlists
    #[command(subcommand)]
    Playlist(PlaylistCommand),
    /// Show pending mutations, oldest first
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect mutations that exhausted their retries
    #[command(subcommand)]
    DeadLetters(DeadLetterCommand),
    /// Local preferences (never synced)
    #[command(subcommand)]
    Prefs(PrefsCommand),
    /// Run one sync pass against CADENCE_API_BASE_URL
    Sync {
        /// Output the pass report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show connectivity, queue depth, and dead letters
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct TrackArgs {
    /// Track title
    pub title: String,
    /// Explicit id (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub artist: Option<String>,
    #[arg(long)]
    pub album: Option<String>,
    #[arg(long)]
    pub genre: Option<String>,
    /// Track length in milliseconds
    #[arg(long, value_name = "MS")]
    pub duration_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum CatalogCommand {
    /// Add or replace a catalog item
    #[command(alias = "put")]
    Add(TrackArgs),
    /// List catalog items
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one catalog item
    Get {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete a catalog item
    Delete { id: String },
    /// Look up items by secondary index (syncStatus, artist, genre)
    Find {
        index: String,
        /// Index value; parsed as JSON when possible
        value: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum PlaylistCommand {
    /// Add or replace a playlist
    Add {
        name: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Catalog item id to include (repeatable)
        #[arg(long = "track", value_name = "ID")]
        tracks: Vec<String>,
    },
    /// List playlists
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete a playlist
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum DeadLetterCommand {
    /// List dead letters, most recent first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Put a dead letter back on the queue
    Retry { id: String },
    /// Drop a dead letter permanently
    Discard { id: String },
}

#[derive(Subcommand)]
pub enum PrefsCommand {
    /// Read one preference
    Get { key: String },
    /// Write a preference; the value is parsed as JSON when possible
    Set { key: String, value: String },
    /// List all preferences
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a preference
    Delete { key: String },
}
