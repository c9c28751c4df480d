use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::remote::RemoteError;
use cadence_core::{
    Connectivity, EntityCollection, LocalStore, RemoteApi, StoreLocation, Stored, SyncConfig,
    SyncEngine, SyncStatus, Visibility,
};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::CliError;

/// Flags shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    pub db_path: PathBuf,
    pub offline: bool,
}

/// Stand-in remote for commands that never replay the queue.
pub struct UnconfiguredRemote;

#[async_trait]
impl RemoteApi for UnconfiguredRemote {
    async fn create(&self, _collection: EntityCollection, _payload: &Value) -> Result<(), RemoteError> {
        Err(unconfigured())
    }

    async fn update(
        &self,
        _collection: EntityCollection,
        _id: &str,
        _payload: &Value,
    ) -> Result<(), RemoteError> {
        Err(unconfigured())
    }

    async fn delete(&self, _collection: EntityCollection, _id: &str) -> Result<(), RemoteError> {
        Err(unconfigured())
    }
}

fn unconfigured() -> RemoteError {
    RemoteError::Unavailable("CADENCE_API_BASE_URL is not set".to_string())
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
        .join("cadence.db")
}

/// `--db-path`, then `CADENCE_DB_PATH`, then the platform data directory.
pub fn resolve_db_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| {
            env::var("CADENCE_DB_PATH")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(default_db_path)
}

pub fn sync_config() -> Result<SyncConfig, CliError> {
    SyncConfig::from_env()
        .map(SyncConfig::without_auto_sync)
        .map_err(|error| CliError::Config(error.to_string()))
}

/// Open the store (falling back to memory when storage is denied) and wrap it in an engine.
pub async fn open_engine(
    ctx: &Context,
    remote: Arc<dyn RemoteApi>,
    config: SyncConfig,
) -> Result<SyncEngine, CliError> {
    let connectivity = Connectivity::new(!ctx.offline);
    let store = open_store(&ctx.db_path, connectivity).await?;
    tracing::debug!(
        offline = ctx.offline,
        "Using local store {}",
        describe_location(store.location())
    );
    let engine = SyncEngine::new(store, remote, Visibility::default(), config);
    engine.init().await?;
    Ok(engine)
}

pub async fn open_local_engine(ctx: &Context) -> Result<SyncEngine, CliError> {
    open_engine(ctx, Arc::new(UnconfiguredRemote), sync_config()?).await
}

async fn open_store(db_path: &Path, connectivity: Connectivity) -> Result<LocalStore, CliError> {
    let store = LocalStore::open_or_memory(StoreLocation::path(db_path), connectivity).await?;
    if matches!(store.location(), StoreLocation::Memory) {
        eprintln!(
            "Warning: could not open {}; changes will not persist",
            db_path.display()
        );
    }
    Ok(store)
}

pub fn describe_location(location: &StoreLocation) -> String {
    match location {
        StoreLocation::Path(path) => path.display().to_string(),
        StoreLocation::Memory => "(in memory, not persisted)".to_string(),
    }
}

/// Interpret a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn require_text(value: &str, what: &'static str) -> Result<String, CliError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CliError::EmptyArgument(what));
    }
    Ok(value.to_string())
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |value| value.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn status_marker(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Synced => " ",
        SyncStatus::Pending => "~",
        SyncStatus::Offline => "!",
    }
}

/// One line per stored entity: status marker, id, and a caller-rendered summary
pub fn format_stored_lines<E>(items: &[Stored<E>], summary: impl Fn(&E) -> String) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            format!(
                "{} {}",
                status_marker(item.sync_status),
                summary(&item.entity)
            )
        })
        .collect()
}
