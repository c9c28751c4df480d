//! Mutation queue entries and dead letters

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::entity::EntityCollection;

/// Remote effect a queue entry replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl MutationAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("Unknown mutation action: {other}"))),
        }
    }
}

/// Build a queue entry id: `<collection>-<action>-<timestamp>-<random>`.
///
/// Unique without a central sequence.
pub fn queue_entry_id(collection: EntityCollection, action: MutationAction, created_at: i64) -> String {
    let disambiguator = Uuid::new_v4().simple().to_string();
    format!("{collection}-{action}-{created_at}-{}", &disambiguator[..8])
}

/// A pending remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: String,
    pub action: MutationAction,
    pub collection: EntityCollection,
    /// Id of the targeted entity (also present in `payload`)
    pub entity_id: String,
    /// Entity data needed to replay the action
    pub payload: Value,
    /// Enqueue time (Unix ms)
    pub created_at: i64,
    /// Failed replay attempts so far
    pub retry_count: u32,
}

impl QueueEntry {
    /// Key used to keep replays of the same entity in enqueue order.
    pub fn target(&self) -> (EntityCollection, &str) {
        (self.collection, self.entity_id.as_str())
    }

    /// Local `updatedAt` of the record this entry carries, when the payload has one.
    pub fn sent_version(&self) -> Option<i64> {
        self.payload.get("updatedAt").and_then(Value::as_i64)
    }
}

/// A mutation dropped from the queue after exhausting its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    #[serde(flatten)]
    pub entry: QueueEntry,
    /// When the entry was moved out of the queue (Unix ms)
    pub failed_at: i64,
    /// Error from the final replay attempt
    pub last_error: String,
}
