//! Runtime configuration for the store, the remote API, and the sync engine.
//!
//! Values can be built in code with the builder methods or read from the
//! environment (`CADENCE_*` variables) with [`SyncConfig::from_env`] and
//! [`RemoteConfig::from_env`].

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Where the local store keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// On-disk database file, created on first open
    Path(PathBuf),
    /// Process-local database, lost on exit
    Memory,
}

impl StoreLocation {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }
}

/// Scheduling and retry settings for the sync orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Periodic sync interval; `None` disables the timer trigger
    pub sync_interval: Option<Duration>,
    /// Queue entries replayed concurrently per batch
    pub batch_size: usize,
    /// Failed replays tolerated before an entry is dead-lettered
    pub max_retries: u32,
    /// Upper bound for a single remote call
    pub request_timeout: Duration,
    /// Push `offline` entities that have no queue entry after the drain
    pub reconcile_offline: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Some(Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS)),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            reconcile_offline: true,
        }
    }
}

impl SyncConfig {
    /// Set the automatic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Disable the periodic timer (connectivity, visibility and manual triggers only)
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    /// Set the batch size; clamped to at least one entry
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_reconcile_offline(mut self, enabled: bool) -> Self {
        self.reconcile_offline = enabled;
        self
    }

    /// Read overrides from `CADENCE_SYNC_*` environment variables
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    /// Read overrides through `lookup`; unset variables keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(secs) = parse_ranged(&lookup, "CADENCE_SYNC_INTERVAL_SECS", 0..=86_400)? {
            config.sync_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(size) = parse_ranged(&lookup, "CADENCE_SYNC_BATCH_SIZE", 1..=500)? {
            config.batch_size = usize::try_from(size).unwrap_or(DEFAULT_BATCH_SIZE);
        }
        if let Some(retries) = parse_ranged(&lookup, "CADENCE_SYNC_MAX_RETRIES", 0..=100)? {
            config.max_retries = u32::try_from(retries).unwrap_or(DEFAULT_MAX_RETRIES);
        }
        if let Some(secs) = parse_ranged(&lookup, "CADENCE_SYNC_REQUEST_TIMEOUT_SECS", 1..=600)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(value) = optional_trimmed(&lookup, "CADENCE_SYNC_RECONCILE") {
            config.reconcile_offline = parse_bool("CADENCE_SYNC_RECONCILE", &value)?;
        }

        Ok(config)
    }
}

/// Location of the remote API that queue entries are replayed against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL without trailing slash; endpoints live under `<base_url>/api/<collection>`
    pub base_url: String,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
        })
    }

    /// Read `CADENCE_API_BASE_URL`; `Ok(None)` when it is not set
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        optional_trimmed(&lookup, "CADENCE_API_BASE_URL")
            .map(Self::new)
            .transpose()
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("API base URL must not be empty".to_string()))?;
    if !is_http_url(&url) {
        return Err(Error::Config(
            "API base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn parse_ranged(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    range: std::ops::RangeInclusive<u64>,
) -> Result<Option<u64>> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(None);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        Error::Config(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(Error::Config(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(Some(value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{name} must be a boolean"))),
    }
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
