//! Remote API collaborator.
//!
//! The engine replays queued mutations through [`RemoteApi`]; any error returned
//! by an implementation counts as one failed replay attempt.

mod http;
mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::EntityCollection;

pub use http::HttpRemoteApi;
pub use memory::{InMemoryRemote, RemoteMethod, RemoteRequest};

/// Errors raised while talking to the remote API
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport-level failure (DNS, TLS, connection reset, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status
    #[error("Remote API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request did not finish within the configured timeout
    #[error("Remote API request timed out")]
    Timeout,

    /// No remote is reachable or configured
    #[error("Remote API unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

/// Keyed HTTP-style endpoints per collection.
///
/// `update` and `delete` must be idempotent for a given id; `create` relies on
/// client-generated ids and overwrites an existing resource.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `POST /api/<collection>`
    async fn create(&self, collection: EntityCollection, payload: &Value) -> Result<(), RemoteError>;

    /// `PUT /api/<collection>/<id>`
    async fn update(
        &self,
        collection: EntityCollection,
        id: &str,
        payload: &Value,
    ) -> Result<(), RemoteError>;

    /// `DELETE /api/<collection>/<id>`
    async fn delete(&self, collection: EntityCollection, id: &str) -> Result<(), RemoteError>;
}
