use std::sync::Arc;
use std::time::Duration;

use cadence_core::remote::RemoteMethod;
use cadence_core::{
    CatalogItem, Connectivity, EntityCollection, InMemoryRemote, LocalStore, MutationAction,
    Playlist, SyncConfig, SyncEngine, SyncEvent, SyncReport, SyncStatus, TriggerReason,
    Visibility,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::broadcast::Receiver;

struct Harness {
    engine: SyncEngine,
    remote: InMemoryRemote,
    connectivity: Connectivity,
    visibility: Visibility,
}

fn harness(online: bool, remote: InMemoryRemote, config: SyncConfig) -> Harness {
    let connectivity = Connectivity::new(online);
    let visibility = Visibility::default();
    let store = LocalStore::in_memory(connectivity.clone());
    let engine = SyncEngine::new(store, Arc::new(remote.clone()), visibility.clone(), config);
    Harness {
        engine,
        remote,
        connectivity,
        visibility,
    }
}

fn manual() -> SyncConfig {
    SyncConfig::default().without_auto_sync()
}

async fn next_completed(events: &mut Receiver<SyncEvent>) -> SyncReport {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SyncEvent::PassCompleted(report)) = events.recv().await {
                return report;
            }
        }
    })
    .await
    .expect("sync pass did not complete in time")
}

fn drain(events: &mut Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_write_is_pushed_once_after_reconnect() {
    let h = harness(false, InMemoryRemote::new(), manual());
    h.engine.init().await.unwrap();

    let saved = h
        .engine
        .save(&CatalogItem::with_id("t1", "Song A"))
        .await
        .unwrap();
    assert_eq!(saved.sync_status, SyncStatus::Offline);

    h.connectivity.set_online(true);
    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.replayed, 1);

    let requests = h.remote.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, RemoteMethod::Post);
    assert_eq!(requests[0].collection, EntityCollection::Catalog);
    assert_eq!(requests[0].id, "t1");
    assert_eq!(
        h.remote.get(EntityCollection::Catalog, "t1").unwrap()["title"],
        "Song A"
    );

    let stored = h.engine.get::<CatalogItem>("t1").await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Synced);
    assert_eq!(h.engine.store().count_queue().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconnect_triggers_a_pass() {
    let h = harness(false, InMemoryRemote::new(), manual());
    let mut events = h.engine.subscribe();
    h.engine
        .save(&CatalogItem::with_id("t1", "Song A"))
        .await
        .unwrap();
    h.engine.start();

    h.connectivity.set_online(true);
    let report = next_completed(&mut events).await;

    assert_eq!(report.replayed, 1);
    assert_eq!(h.remote.requests().len(), 1);
    h.engine.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn foreground_while_online_triggers_a_pass() {
    let h = harness(true, InMemoryRemote::new(), manual());
    h.visibility.set_foreground(false);
    let mut events = h.engine.subscribe();
    h.engine.start();

    h.engine
        .save(&Playlist::new("Commute"))
        .await
        .unwrap();
    h.visibility.set_foreground(true);

    let started = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SyncEvent::PassStarted { reason }) = events.recv().await {
                return reason;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(started, TriggerReason::Foregrounded);
    assert_eq!(next_completed(&mut events).await.replayed, 1);
    h.engine.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn periodic_timer_drains_queue() {
    let config = SyncConfig::default().with_sync_interval(Duration::from_millis(50));
    let h = harness(true, InMemoryRemote::new(), config);
    let mut events = h.engine.subscribe();

    h.engine
        .save(&CatalogItem::with_id("t1", "Song A"))
        .await
        .unwrap();
    h.engine.start();

    let report = next_completed(&mut events).await;
    assert_eq!(report.replayed, 1);
    assert!(h.engine.is_synced(EntityCollection::Catalog, "t1").await.unwrap());
    h.engine.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn always_failing_remote_exhausts_once() {
    let remote = InMemoryRemote::new();
    remote.set_failing(true);
    let h = harness(true, remote, manual());
    let mut events = h.engine.subscribe();

    h.engine
        .save(&CatalogItem::with_id("t1", "Song A"))
        .await
        .unwrap();

    let mut retry_counts = Vec::new();
    for _ in 0..3 {
        let report = h.engine.trigger_sync().await.unwrap().unwrap();
        assert_eq!(report.retried, 1);
        let queue = h.engine.store().list_queue().await.unwrap();
        retry_counts.push(queue[0].retry_count);
    }
    assert_eq!(retry_counts, vec![1, 2, 3]);

    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.exhausted, 1);
    assert_eq!(h.engine.store().count_queue().await.unwrap(), 0);

    // Nothing left to exhaust on later passes.
    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.exhausted, 0);

    let exhausted: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::RetryExhausted(letter) => Some(letter),
            _ => None,
        })
        .collect();
    assert_eq!(exhausted.len(), 1);
    assert_eq!(exhausted[0].entry.entity_id, "t1");
    assert_eq!(exhausted[0].entry.retry_count, 3);

    let letters = h.engine.store().list_dead_letters().await.unwrap();
    assert_eq!(letters.len(), 1);
    assert!(letters[0].last_error.contains("503"));
    assert_eq!(h.remote.requests().len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn requeued_dead_letter_replays() {
    let remote = InMemoryRemote::new();
    remote.set_failing(true);
    let h = harness(true, remote, manual().with_max_retries(0));

    h.engine
        .save(&CatalogItem::with_id("t1", "Song A"))
        .await
        .unwrap();
    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.exhausted, 1);

    let letter = h.engine.store().list_dead_letters().await.unwrap().remove(0);
    h.remote.set_failing(false);
    h.engine
        .store()
        .requeue_dead_letter(&letter.entry.id)
        .await
        .unwrap()
        .unwrap();

    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.replayed, 1);
    assert!(h.remote.get(EntityCollection::Catalog, "t1").is_some());
    let stored = h.engine.get::<CatalogItem>("t1").await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_triggers_coalesce() {
    let remote = InMemoryRemote::new().with_latency(Duration::from_millis(200));
    let h = harness(true, remote, manual());
    h.engine
        .save(&CatalogItem::with_id("t1", "Song A"))
        .await
        .unwrap();

    let (first, second) = tokio::join!(h.engine.trigger_sync(), h.engine.trigger_sync());
    let ran: Vec<_> = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .collect();

    assert_eq!(ran.len(), 1);
    assert_eq!(h.remote.requests().len(), 1);
    assert!(!h.engine.status().is_syncing);
}

#[tokio::test(flavor = "multi_thread")]
async fn last_write_wins_for_same_entity() {
    for batch_size in [10, 1] {
        let h = harness(false, InMemoryRemote::new(), manual().with_batch_size(batch_size));
        for title in ["A", "B", "C"] {
            h.engine
                .save(&CatalogItem::with_id("t1", title))
                .await
                .unwrap();
        }

        h.connectivity.set_online(true);
        h.engine.trigger_sync().await.unwrap().unwrap();

        let methods: Vec<_> = h.remote.requests().iter().map(|r| r.method).collect();
        assert_eq!(
            methods,
            vec![RemoteMethod::Post, RemoteMethod::Put, RemoteMethod::Put]
        );
        assert_eq!(
            h.remote.get(EntityCollection::Catalog, "t1").unwrap()["title"],
            "C"
        );
        assert!(h.engine.is_synced(EntityCollection::Catalog, "t1").await.unwrap());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_head_defers_later_writes_for_same_entity() {
    let remote = InMemoryRemote::new();
    let h = harness(false, remote, manual());
    for title in ["A", "B", "C"] {
        h.engine
            .save(&CatalogItem::with_id("t1", title))
            .await
            .unwrap();
    }
    h.engine
        .save(&CatalogItem::with_id("t2", "Other"))
        .await
        .unwrap();

    h.connectivity.set_online(true);
    h.remote.fail_next(1);
    let first = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(first.retried, 1);
    assert_eq!(first.deferred, 2);
    assert!(h.remote.get(EntityCollection::Catalog, "t1").is_none());

    let queue = h.engine.store().list_queue().await.unwrap();
    let retries: Vec<_> = queue.iter().map(|e| e.retry_count).collect();
    assert_eq!(retries, vec![1, 0, 0]);

    let second = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(second.replayed, 3);
    assert_eq!(
        h.remote.get(EntityCollection::Catalog, "t1").unwrap()["title"],
        "C"
    );
    assert_eq!(h.engine.store().count_queue().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn replaying_update_and_delete_twice_converges() {
    let h = harness(true, InMemoryRemote::new(), manual());
    let store = h.engine.store();

    for title in ["First", "Second"] {
        store
            .enqueue_mutation(
                MutationAction::Create,
                EntityCollection::Catalog,
                json!({"id": "t1", "title": title}),
            )
            .await
            .unwrap();
    }
    for _ in 0..2 {
        store
            .enqueue_mutation(
                MutationAction::Update,
                EntityCollection::Catalog,
                json!({"id": "t2", "title": "Same"}),
            )
            .await
            .unwrap();
        store
            .enqueue_mutation(
                MutationAction::Delete,
                EntityCollection::Playlists,
                json!({"id": "p1"}),
            )
            .await
            .unwrap();
    }

    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.replayed, 6);
    assert!(report.is_clean());
    assert_eq!(
        h.remote.get(EntityCollection::Catalog, "t1").unwrap()["title"],
        "Second"
    );
    assert_eq!(
        h.remote.get(EntityCollection::Catalog, "t2").unwrap()["title"],
        "Same"
    );
    assert!(h.remote.get(EntityCollection::Playlists, "p1").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn sweep_pushes_unqueued_offline_records() {
    let h = harness(false, InMemoryRemote::new(), manual());
    let mut events = h.engine.subscribe();
    let store = h.engine.store();

    let record = cadence_core::EntityRecord::from_entity(&CatalogItem::with_id("t1", "Loose")).unwrap();
    let written = store.put(EntityCollection::Catalog, record).await.unwrap();
    assert_eq!(written.sync_status, SyncStatus::Offline);

    h.connectivity.set_online(true);
    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.reconciled, 1);

    let pushed = h.remote.get(EntityCollection::Catalog, "t1").unwrap();
    assert_eq!(pushed["updatedAt"], json!(written.updated_at));
    let stored = h.engine.get::<CatalogItem>("t1").await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Synced);

    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        SyncEvent::Reconciled { id, .. } if id == "t1"
    )));

    // Second pass has nothing to push.
    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.reconciled, 0);
    assert_eq!(h.remote.requests().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unqueued_rewrite_after_save_still_reaches_remote() {
    let h = harness(false, InMemoryRemote::new(), manual());
    let store = h.engine.store();

    h.engine
        .save(&CatalogItem::with_id("t1", "Song A"))
        .await
        .unwrap();
    let record = cadence_core::EntityRecord::from_entity(&CatalogItem::with_id("t1", "Song B")).unwrap();
    let rewritten = store.put(EntityCollection::Catalog, record).await.unwrap();

    h.connectivity.set_online(true);
    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(report.reconciled, 1);

    let pushed = h.remote.get(EntityCollection::Catalog, "t1").unwrap();
    assert_eq!(pushed["title"], "Song B");
    assert_eq!(pushed["updatedAt"], json!(rewritten.updated_at));
    let stored = h.engine.get::<CatalogItem>("t1").await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Synced);
    assert_eq!(stored.entity.title, "Song B");

    let report = h.engine.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.replayed + report.reconciled, 0);
    assert_eq!(h.remote.requests().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_remote_counts_as_failure() {
    let remote = InMemoryRemote::new().with_latency(Duration::from_millis(300));
    let config = manual().with_request_timeout(Duration::from_millis(50));
    let h = harness(true, remote, config);

    h.engine
        .save(&CatalogItem::with_id("t1", "Song A"))
        .await
        .unwrap();
    let report = h.engine.trigger_sync().await.unwrap().unwrap();

    assert_eq!(report.retried, 1);
    assert!(report.failures[0].error.contains("timed out"));
    assert_eq!(h.engine.store().list_queue().await.unwrap()[0].retry_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_queues_delete_and_destroy_is_repeatable() {
    let h = harness(true, InMemoryRemote::new(), manual());
    h.engine
        .save(&CatalogItem::with_id("t1", "Song A"))
        .await
        .unwrap();
    h.engine.trigger_sync().await.unwrap();

    assert!(h.engine.remove::<CatalogItem>("t1").await.unwrap());
    assert!(!h.engine.remove::<CatalogItem>("t1").await.unwrap());
    h.engine.trigger_sync().await.unwrap();
    assert!(h.remote.is_empty());

    h.engine.start();
    h.engine.destroy().await;
    h.engine.destroy().await;
    assert!(h.engine.get::<CatalogItem>("t1").await.unwrap().is_none());
}
