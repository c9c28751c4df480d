//! In-process remote API used by tests and offline demos

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::models::EntityCollection;

use super::{RemoteApi, RemoteError};

/// HTTP verb of a recorded request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteMethod {
    Post,
    Put,
    Delete,
}

/// One request observed by [`InMemoryRemote`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteRequest {
    pub method: RemoteMethod,
    pub collection: EntityCollection,
    pub id: String,
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
struct RemoteState {
    records: BTreeMap<(EntityCollection, String), Value>,
    requests: Vec<RemoteRequest>,
    failing: bool,
    fail_next: usize,
    latency: Option<Duration>,
}

/// Keyed resource store with scripted failures and latency.
///
/// Clones share state, so a test can keep one handle while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Fail every request with HTTP 503 until switched off.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Fail the next `count` requests with HTTP 500.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Current remote copy of a resource.
    pub fn get(&self, collection: EntityCollection, id: &str) -> Option<Value> {
        self.lock()
            .records
            .get(&(collection, id.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Requests in arrival order, including failed ones.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the request and decide whether it fails; returns the latency to apply.
    fn admit(&self, request: RemoteRequest) -> (Option<Duration>, Result<(), RemoteError>) {
        let mut state = self.lock();
        state.requests.push(request);
        let outcome = if state.failing {
            Err(RemoteError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            })
        } else if state.fail_next > 0 {
            state.fail_next -= 1;
            Err(RemoteError::Status {
                status: 500,
                body: "scripted failure".to_string(),
            })
        } else {
            Ok(())
        };
        (state.latency, outcome)
    }

    async fn handle(
        &self,
        request: RemoteRequest,
        apply: impl FnOnce(&mut RemoteState),
    ) -> Result<(), RemoteError> {
        let (latency, outcome) = self.admit(request);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        outcome?;
        apply(&mut self.lock());
        Ok(())
    }
}

fn payload_id(payload: &Value) -> Result<String, RemoteError> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| RemoteError::Status {
            status: 400,
            body: "payload is missing `id`".to_string(),
        })
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn create(&self, collection: EntityCollection, payload: &Value) -> Result<(), RemoteError> {
        let id = payload_id(payload)?;
        let request = RemoteRequest {
            method: RemoteMethod::Post,
            collection,
            id: id.clone(),
            body: Some(payload.clone()),
        };
        self.handle(request, |state| {
            state.records.insert((collection, id), payload.clone());
        })
        .await
    }

    async fn update(
        &self,
        collection: EntityCollection,
        id: &str,
        payload: &Value,
    ) -> Result<(), RemoteError> {
        let request = RemoteRequest {
            method: RemoteMethod::Put,
            collection,
            id: id.to_string(),
            body: Some(payload.clone()),
        };
        self.handle(request, |state| {
            state
                .records
                .insert((collection, id.to_string()), payload.clone());
        })
        .await
    }

    async fn delete(&self, collection: EntityCollection, id: &str) -> Result<(), RemoteError> {
        let request = RemoteRequest {
            method: RemoteMethod::Delete,
            collection,
            id: id.to_string(),
            body: None,
        };
        self.handle(request, |state| {
            state.records.remove(&(collection, id.to_string()));
        })
        .await
    }
}
