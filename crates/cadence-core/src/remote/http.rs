//! reqwest-backed remote API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::models::EntityCollection;
use crate::util::compact_text;

use super::{RemoteApi, RemoteError};

/// HTTP client for the `/api/<collection>` endpoints.
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteApi {
    /// Builds a client whose requests give up after `timeout`.
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                RemoteError::InvalidConfiguration(format!(
                    "Failed to construct HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            base_url: config.base_url.clone(),
            client,
        })
    }

    /// Returns the base URL this client was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: EntityCollection) -> String {
        format!("{}/api/{collection}", self.base_url)
    }

    fn entity_url(&self, collection: EntityCollection, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(collection),
            urlencoding::encode(id)
        )
    }

    async fn send(request: RequestBuilder) -> Result<(), RemoteError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(classify)?;
        ensure_success(response).await
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create(&self, collection: EntityCollection, payload: &Value) -> Result<(), RemoteError> {
        Self::send(self.client.post(self.collection_url(collection)).json(payload)).await
    }

    async fn update(
        &self,
        collection: EntityCollection,
        id: &str,
        payload: &Value,
    ) -> Result<(), RemoteError> {
        Self::send(self.client.put(self.entity_url(collection, id)).json(payload)).await
    }

    async fn delete(&self, collection: EntityCollection, id: &str) -> Result<(), RemoteError> {
        Self::send(self.client.delete(self.entity_url(collection, id))).await
    }
}

fn classify(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Http(error)
    }
}

async fn ensure_success(response: Response) -> Result<(), RemoteError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status,
        body: compact_text(&body),
    })
}
