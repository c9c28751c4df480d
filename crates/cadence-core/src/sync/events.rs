//! Notifications emitted by the sync engine

use serde::Serialize;

use crate::models::{DeadLetter, EntityCollection};

/// What caused a sync pass to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerReason {
    /// Connectivity went from offline to online
    Reconnected,
    /// The app returned to the foreground while online
    Foregrounded,
    /// The periodic timer fired
    Periodic,
    /// `trigger_sync` was called
    Manual,
}

/// One failed replay inside a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFailure {
    pub entry_id: String,
    pub error: String,
}

/// Outcome counters for one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Entries replayed and removed from the queue
    pub replayed: usize,
    /// Entries that failed and stay queued with a bumped retry count
    pub retried: usize,
    /// Entries moved to the dead-letter log
    pub exhausted: usize,
    /// Entries skipped because an earlier entry for the same entity failed
    pub deferred: usize,
    /// Offline records pushed by the reconciliation sweep
    pub reconciled: usize,
    pub reconcile_failed: usize,
    pub failures: Vec<ReplayFailure>,
}

impl SyncReport {
    /// True when nothing failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.reconcile_failed == 0
    }
}

/// Broadcast to [`super::SyncEngine::subscribe`] receivers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    PassStarted {
        reason: TriggerReason,
    },
    PassCompleted(SyncReport),
    /// A replay failed and will be retried on a later pass
    ReplayFailed {
        entry_id: String,
        retry_count: u32,
        error: String,
    },
    /// A mutation gave up after the retry ceiling and was dead-lettered
    RetryExhausted(DeadLetter),
    /// The reconciliation sweep pushed an offline record
    Reconciled {
        collection: EntityCollection,
        id: String,
    },
}
