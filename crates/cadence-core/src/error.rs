//! Error types for cadence-core

use thiserror::Error;

/// Result type alias using cadence-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cadence-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The platform refused persistent storage (quota, read-only media, no permission).
    ///
    /// Fatal to the store; callers decide whether to fall back to an in-memory store.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Collection name that the store does not know about
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Secondary index that is not declared for the collection
    #[error("Unknown index `{index}` on collection `{collection}`")]
    UnknownIndex { collection: String, index: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true when the error means the local store cannot be used at all.
    pub const fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<libsql::Error> for Error {
    fn from(error: libsql::Error) -> Self {
        let message = error.to_string();
        if indicates_storage_unavailable(&message) {
            Self::StorageUnavailable(message)
        } else {
            Self::LibSql(error)
        }
    }
}

/// Platform-level storage failures as reported by SQLite.
fn indicates_storage_unavailable(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    [
        "database or disk is full",
        "disk i/o error",
        "unable to open database",
        "attempt to write a readonly database",
        "readonly database",
        "permission denied",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}
