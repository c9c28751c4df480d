//! Sync orchestration.
//!
//! [`SyncEngine`] owns the trigger loop (reconnect, foreground, periodic timer)
//! and runs at most one pass at a time. Each pass replays the mutation queue
//! oldest-first in batches, then pushes records still flagged `offline` that
//! no queue entry covers.

mod events;
mod pass;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::db::LocalStore;
use crate::error::Result;
use crate::models::{Entity, EntityCollection, EntityRecord, Preference, Stored};
use crate::remote::RemoteApi;
use crate::signal::{Connectivity, Visibility};

pub use events::{ReplayFailure, SyncEvent, SyncReport, TriggerReason};

const EVENT_CAPACITY: usize = 64;

/// Snapshot returned by [`SyncEngine::status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub is_online: bool,
    pub is_syncing: bool,
}

struct EngineInner {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    connectivity: Connectivity,
    visibility: Visibility,
    config: SyncConfig,
    syncing: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
}

/// Resets the syncing flag when a pass ends, even on error.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EngineInner {
    async fn run(&self, reason: TriggerReason) -> Result<Option<SyncReport>> {
        if !self.connectivity.is_online() {
            tracing::debug!(?reason, "Skipping sync while offline");
            return Ok(None);
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(?reason, "Sync already in progress, trigger coalesced");
            return Ok(None);
        }
        let _guard = SyncingGuard(&self.syncing);

        let _ = self.events.send(SyncEvent::PassStarted { reason });
        let pass = pass::Pass {
            store: &self.store,
            remote: self.remote.as_ref(),
            config: &self.config,
            events: &self.events,
        };
        let report = pass.run().await?;

        tracing::info!(
            ?reason,
            replayed = report.replayed,
            retried = report.retried,
            exhausted = report.exhausted,
            deferred = report.deferred,
            reconciled = report.reconciled,
            "Sync pass completed"
        );
        let _ = self.events.send(SyncEvent::PassCompleted(report.clone()));
        Ok(Some(report))
    }
}

/// Offline-first sync orchestrator.
///
/// Reads and writes go straight to the local store; queued mutations reach the
/// remote API on the next pass. Call [`SyncEngine::start`] to enable automatic
/// triggers and [`SyncEngine::destroy`] to stop them.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SyncEngine {
    /// Build an engine; connectivity is shared with `store`.
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        visibility: Visibility,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let connectivity = store.connectivity().clone();
        Self {
            inner: Arc::new(EngineInner {
                store,
                remote,
                connectivity,
                visibility,
                config,
                syncing: AtomicBool::new(false),
                events,
            }),
            task: Mutex::new(None),
        }
    }

    /// Open the local store.
    pub async fn init(&self) -> Result<()> {
        self.inner.store.init().await
    }

    /// Spawn the trigger loop. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|(_, handle)| !handle.is_finished()) {
            return;
        }

        // Subscribe before spawning so changes made right after `start` are seen.
        let signals = Signals::subscribe(&self.inner);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(trigger_loop(
            Arc::clone(&self.inner),
            signals,
            shutdown.clone(),
        ));
        *task = Some((shutdown, handle));
        tracing::debug!("Sync trigger loop started");
    }

    /// Stop the trigger loop and wait for a pass in flight to finish. Idempotent.
    pub async fn destroy(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((shutdown, handle)) = task else {
            return;
        };

        shutdown.cancel();
        if let Err(error) = handle.await {
            if error.is_panic() {
                tracing::error!("Sync trigger loop panicked: {error}");
            }
        }
    }

    /// Run one pass now. `None` when offline or a pass is already running.
    pub async fn trigger_sync(&self) -> Result<Option<SyncReport>> {
        self.inner.run(TriggerReason::Manual).await
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            is_online: self.inner.connectivity.is_online(),
            is_syncing: self.inner.syncing.load(Ordering::Acquire),
        }
    }

    /// Receive pass notifications; slow receivers may observe `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn visibility(&self) -> &Visibility {
        &self.inner.visibility
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Write an entity locally and queue a create (new id) or update.
    pub async fn save<E: Entity>(&self, entity: &E) -> Result<Stored<E>> {
        let record = EntityRecord::from_entity(entity)?;
        let (record, entry) = self
            .inner
            .store
            .upsert_and_enqueue(E::COLLECTION, record)
            .await?;
        tracing::debug!("Saved {} {} ({})", E::COLLECTION, record.id, entry.action);
        Stored::from_record(&record)
    }

    /// Delete an entity locally and queue its remote delete; false when it did not exist.
    pub async fn remove<E: Entity>(&self, id: &str) -> Result<bool> {
        Ok(self
            .inner
            .store
            .delete_and_enqueue(E::COLLECTION, id)
            .await?
            .is_some())
    }

    pub async fn get<E: Entity>(&self, id: &str) -> Result<Option<Stored<E>>> {
        self.inner
            .store
            .get(E::COLLECTION, id)
            .await?
            .as_ref()
            .map(Stored::from_record)
            .transpose()
    }

    pub async fn list<E: Entity>(&self) -> Result<Vec<Stored<E>>> {
        self.inner
            .store
            .get_all(E::COLLECTION)
            .await?
            .iter()
            .map(Stored::from_record)
            .collect()
    }

    pub async fn find_by_index<E: Entity>(&self, index: &str, value: &Value) -> Result<Vec<Stored<E>>> {
        self.inner
            .store
            .get_by_index(E::COLLECTION, index, value)
            .await?
            .iter()
            .map(Stored::from_record)
            .collect()
    }

    /// True once no queued mutation targets the entity.
    pub async fn is_synced(&self, collection: EntityCollection, id: &str) -> Result<bool> {
        Ok(!self.inner.store.has_pending(collection, id).await?)
    }

    pub async fn preference<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.inner.store.get_preference_as(key).await
    }

    pub async fn set_preference<T: Serialize>(&self, key: &str, value: &T) -> Result<Preference> {
        let value = serde_json::to_value(value)?;
        self.inner.store.set_preference(key, value).await
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        let task = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((shutdown, _)) = task {
            shutdown.cancel();
        }
    }
}

/// Wait for the next periodic tick; never resolves when the timer is disabled.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Signal receivers plus the values observed when they were created
struct Signals {
    online_rx: watch::Receiver<bool>,
    foreground_rx: watch::Receiver<bool>,
    was_online: bool,
    was_foreground: bool,
}

impl Signals {
    fn subscribe(inner: &EngineInner) -> Self {
        let mut online_rx = inner.connectivity.subscribe();
        let mut foreground_rx = inner.visibility.subscribe();
        let was_online = *online_rx.borrow_and_update();
        let was_foreground = *foreground_rx.borrow_and_update();
        Self {
            online_rx,
            foreground_rx,
            was_online,
            was_foreground,
        }
    }
}

async fn trigger_loop(inner: Arc<EngineInner>, signals: Signals, shutdown: CancellationToken) {
    let Signals {
        mut online_rx,
        mut foreground_rx,
        mut was_online,
        mut was_foreground,
    } = signals;

    let mut ticker = inner.config.sync_interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    loop {
        let reason = tokio::select! {
            () = shutdown.cancelled() => break,
            changed = online_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *online_rx.borrow_and_update();
                let reconnected = online && !was_online;
                was_online = online;
                if !reconnected {
                    continue;
                }
                TriggerReason::Reconnected
            }
            changed = foreground_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let foreground = *foreground_rx.borrow_and_update();
                let resumed = foreground && !was_foreground;
                was_foreground = foreground;
                if !resumed || !inner.connectivity.is_online() {
                    continue;
                }
                TriggerReason::Foregrounded
            }
            () = next_tick(&mut ticker) => {
                if !inner.connectivity.is_online() {
                    continue;
                }
                TriggerReason::Periodic
            }
        };

        // A pass is never cancelled midway; shutdown is observed once it returns.
        if let Err(error) = inner.run(reason).await {
            tracing::error!(?reason, "Sync pass aborted: {error}");
        }
    }

    tracing::debug!("Sync trigger loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogItem, SyncStatus};
    use crate::remote::InMemoryRemote;

    fn engine(online: bool, remote: &InMemoryRemote) -> SyncEngine {
        let store = LocalStore::in_memory(Connectivity::new(online));
        SyncEngine::new(
            store,
            Arc::new(remote.clone()),
            Visibility::default(),
            SyncConfig::default().without_auto_sync(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_trigger_while_offline_is_skipped() {
        let remote = InMemoryRemote::new();
        let engine = engine(false, &remote);
        engine.save(&CatalogItem::with_id("t1", "Song A")).await.unwrap();

        assert_eq!(engine.trigger_sync().await.unwrap(), None);
        assert!(remote.requests().is_empty());
        assert_eq!(
            engine.status(),
            EngineStatus {
                is_online: false,
                is_syncing: false
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_then_sync_marks_synced() {
        let remote = InMemoryRemote::new();
        let engine = engine(true, &remote);

        let saved = engine.save(&CatalogItem::with_id("t1", "Song A")).await.unwrap();
        assert_eq!(saved.sync_status, SyncStatus::Pending);
        assert!(!engine.is_synced(EntityCollection::Catalog, "t1").await.unwrap());

        let report = engine.trigger_sync().await.unwrap().unwrap();
        assert_eq!(report.replayed, 1);
        assert!(report.is_clean());

        let stored = engine.get::<CatalogItem>("t1").await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert!(engine.is_synced(EntityCollection::Catalog, "t1").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_preference_passthrough() {
        let remote = InMemoryRemote::new();
        let engine = engine(true, &remote);

        engine.set_preference("crossfadeSecs", &4).await.unwrap();
        assert_eq!(engine.preference::<u32>("crossfadeSecs").await.unwrap(), Some(4));
        engine.trigger_sync().await.unwrap();
        assert!(remote.requests().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_destroy_are_idempotent() {
        let remote = InMemoryRemote::new();
        let engine = engine(true, &remote);

        engine.start();
        engine.start();
        engine.destroy().await;
        engine.destroy().await;
    }
}
