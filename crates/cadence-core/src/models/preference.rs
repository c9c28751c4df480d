//! Local preference model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A local key-value preference. Never replicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    pub key: String,
    /// String, number, boolean, object, array, or null
    pub value: Value,
    /// Last write (Unix ms)
    pub updated_at: i64,
}
