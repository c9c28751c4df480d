//! Lazily-opened local store shared by the engine and its callers

use std::sync::Arc;

use libsql::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard, OnceCell};

use crate::config::StoreLocation;
use crate::error::{Error, Result};
use crate::models::{
    queue_entry_id, DeadLetter, EntityCollection, EntityRecord, MutationAction, Preference,
    QueueEntry, SyncStatus,
};
use crate::signal::Connectivity;
use crate::util::now_millis;

use super::{
    Database, LibSqlEntityRepository, LibSqlPreferenceRepository, LibSqlQueueRepository,
    PreferenceRepository,
};

/// Table selector for [`LocalStore::clear`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTable {
    Entity(EntityCollection),
    Preferences,
    SyncQueue,
    DeadLetters,
}

/// Thread-safe handle to the persistent local store.
///
/// Cloning is cheap; clones share one connection. The database is opened and
/// migrated on first use.
#[derive(Clone)]
pub struct LocalStore {
    location: StoreLocation,
    db: Arc<OnceCell<Mutex<Database>>>,
    connectivity: Connectivity,
}

impl LocalStore {
    /// Create a store handle; nothing is opened until the first operation.
    pub fn new(location: StoreLocation, connectivity: Connectivity) -> Self {
        Self {
            location,
            db: Arc::new(OnceCell::new()),
            connectivity,
        }
    }

    /// Create a store backed by an in-memory database.
    pub fn in_memory(connectivity: Connectivity) -> Self {
        Self::new(StoreLocation::Memory, connectivity)
    }

    /// Open the store at `location`, degrading to memory when the platform denies storage.
    pub async fn open_or_memory(location: StoreLocation, connectivity: Connectivity) -> Result<Self> {
        let store = Self::new(location, connectivity.clone());
        match store.init().await {
            Ok(()) => Ok(store),
            Err(error) if error.is_storage_unavailable() => {
                tracing::warn!("Persistent storage unavailable, using in-memory store: {error}");
                let fallback = Self::in_memory(connectivity);
                fallback.init().await?;
                Ok(fallback)
            }
            Err(error) => Err(error),
        }
    }

    pub const fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Open and migrate the database. Safe to call repeatedly.
    pub async fn init(&self) -> Result<()> {
        self.database().await.map(|_| ())
    }

    async fn database(&self) -> Result<MutexGuard<'_, Database>> {
        let db = self
            .db
            .get_or_try_init(|| async {
                Database::open_location(&self.location).await.map(Mutex::new)
            })
            .await?;
        Ok(db.lock().await)
    }

    // Entity collections

    /// Upsert a record with an optimistic sync status and no queue side effect.
    pub async fn put(&self, collection: EntityCollection, mut record: EntityRecord) -> Result<EntityRecord> {
        let db = self.database().await?;
        let repo = LibSqlEntityRepository::new(db.connection(), collection);
        let previous = repo.get(&record.id).await?;

        record.updated_at = stamp(previous.as_ref());
        record.sync_status = SyncStatus::optimistic(self.connectivity.is_online());
        repo.upsert(&record).await?;
        Ok(record)
    }

    pub async fn get(&self, collection: EntityCollection, id: &str) -> Result<Option<EntityRecord>> {
        let db = self.database().await?;
        LibSqlEntityRepository::new(db.connection(), collection)
            .get(id)
            .await
    }

    pub async fn get_all(&self, collection: EntityCollection) -> Result<Vec<EntityRecord>> {
        let db = self.database().await?;
        LibSqlEntityRepository::new(db.connection(), collection)
            .list()
            .await
    }

    pub async fn get_by_index(
        &self,
        collection: EntityCollection,
        index: &str,
        value: &Value,
    ) -> Result<Vec<EntityRecord>> {
        let db = self.database().await?;
        LibSqlEntityRepository::new(db.connection(), collection)
            .list_by_index(index, value)
            .await
    }

    /// Remove a record without recording a tombstone; returns whether it existed.
    pub async fn delete(&self, collection: EntityCollection, id: &str) -> Result<bool> {
        let db = self.database().await?;
        LibSqlEntityRepository::new(db.connection(), collection)
            .delete(id)
            .await
    }

    /// Write a record and append its create/update mutation in one transaction.
    pub async fn put_and_enqueue(
        &self,
        collection: EntityCollection,
        action: MutationAction,
        record: EntityRecord,
    ) -> Result<(EntityRecord, QueueEntry)> {
        if action == MutationAction::Delete {
            return Err(Error::InvalidInput(
                "use delete_and_enqueue for delete mutations".to_string(),
            ));
        }
        self.write_and_enqueue(collection, Some(action), record).await
    }

    /// Like [`Self::put_and_enqueue`], queuing `create` for new ids and `update` otherwise.
    pub async fn upsert_and_enqueue(
        &self,
        collection: EntityCollection,
        record: EntityRecord,
    ) -> Result<(EntityRecord, QueueEntry)> {
        self.write_and_enqueue(collection, None, record).await
    }

    async fn write_and_enqueue(
        &self,
        collection: EntityCollection,
        action: Option<MutationAction>,
        mut record: EntityRecord,
    ) -> Result<(EntityRecord, QueueEntry)> {
        let db = self.database().await?;
        let conn = db.connection();
        let online = self.connectivity.is_online();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let result: Result<_> = async {
            let entities = LibSqlEntityRepository::new(conn, collection);
            let previous = entities.get(&record.id).await?;
            let action = action.unwrap_or(if previous.is_some() {
                MutationAction::Update
            } else {
                MutationAction::Create
            });

            record.updated_at = stamp(previous.as_ref());
            record.sync_status = SyncStatus::queued(online);
            entities.upsert(&record).await?;

            let entry = new_entry(action, collection, record.id.clone(), record.remote_payload());
            LibSqlQueueRepository::new(conn).insert(&entry).await?;
            Ok((record, entry))
        }
        .await;
        finish_transaction(conn, result).await
    }

    /// Delete a record and append its delete mutation in one transaction.
    ///
    /// Returns `None` when the record did not exist locally; nothing is queued then.
    pub async fn delete_and_enqueue(
        &self,
        collection: EntityCollection,
        id: &str,
    ) -> Result<Option<QueueEntry>> {
        let db = self.database().await?;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let result: Result<_> = async {
            if !LibSqlEntityRepository::new(conn, collection).delete(id).await? {
                return Ok(None);
            }
            let payload = serde_json::json!({ "id": id });
            let entry = new_entry(MutationAction::Delete, collection, id.to_string(), payload);
            LibSqlQueueRepository::new(conn).insert(&entry).await?;
            Ok(Some(entry))
        }
        .await;
        finish_transaction(conn, result).await
    }

    // Mutation queue

    /// Append a mutation; the target entity id is read from `payload["id"]`.
    pub async fn enqueue_mutation(
        &self,
        action: MutationAction,
        collection: EntityCollection,
        payload: Value,
    ) -> Result<QueueEntry> {
        let entity_id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::InvalidInput("mutation payload must carry a string `id`".to_string())
            })?;

        let entry = new_entry(action, collection, entity_id, payload);
        let db = self.database().await?;
        LibSqlQueueRepository::new(db.connection())
            .insert(&entry)
            .await?;
        tracing::debug!("Queued {} {} {}", entry.action, entry.collection, entry.entity_id);
        Ok(entry)
    }

    /// Queue entries, oldest first.
    pub async fn list_queue(&self) -> Result<Vec<QueueEntry>> {
        let db = self.database().await?;
        LibSqlQueueRepository::new(db.connection()).list().await
    }

    pub async fn count_queue(&self) -> Result<usize> {
        let db = self.database().await?;
        LibSqlQueueRepository::new(db.connection()).count().await
    }

    /// Remove an entry; unknown ids are a no-op.
    pub async fn remove_queue_entry(&self, id: &str) -> Result<bool> {
        let db = self.database().await?;
        LibSqlQueueRepository::new(db.connection()).remove(id).await
    }

    /// Bump an entry's retry counter; unknown ids are a no-op.
    pub async fn increment_retry(&self, id: &str) -> Result<bool> {
        let db = self.database().await?;
        LibSqlQueueRepository::new(db.connection())
            .increment_retry(id)
            .await
    }

    /// Whether a queue entry still targets `(collection, id)`.
    pub async fn has_pending(&self, collection: EntityCollection, id: &str) -> Result<bool> {
        let db = self.database().await?;
        LibSqlQueueRepository::new(db.connection())
            .has_pending(collection.as_str(), id)
            .await
    }

    /// Drop a replayed entry and settle its entity once nothing else is queued for it.
    ///
    /// The entity becomes `synced` only if it still holds the version the entry carried;
    /// a record rewritten since goes back to `offline` for the sweep. Returns false when
    /// the entry had already been removed.
    pub async fn complete_entry(&self, entry: &QueueEntry) -> Result<bool> {
        let db = self.database().await?;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let result: Result<_> = async {
            if !LibSqlQueueRepository::new(conn).remove(&entry.id).await? {
                return Ok(false);
            }
            if entry.action != MutationAction::Delete {
                LibSqlEntityRepository::new(conn, entry.collection)
                    .settle_replayed(&entry.entity_id, entry.sent_version())
                    .await?;
            }
            Ok(true)
        }
        .await;
        finish_transaction(conn, result).await
    }

    // Dead letters

    /// Move an exhausted entry from the queue into the dead-letter log.
    ///
    /// Returns `None` when the entry was no longer queued.
    pub async fn dead_letter(&self, entry: &QueueEntry, last_error: &str) -> Result<Option<DeadLetter>> {
        let db = self.database().await?;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let result: Result<_> = async {
            let queue = LibSqlQueueRepository::new(conn);
            if !queue.remove(&entry.id).await? {
                return Ok(None);
            }
            let letter = DeadLetter {
                entry: entry.clone(),
                failed_at: now_millis(),
                last_error: last_error.to_string(),
            };
            queue.insert_dead_letter(&letter).await?;
            Ok(Some(letter))
        }
        .await;
        finish_transaction(conn, result).await
    }

    pub async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let db = self.database().await?;
        LibSqlQueueRepository::new(db.connection())
            .list_dead_letters()
            .await
    }

    /// Put a dead letter back at the tail of the queue with a fresh id and zero retries.
    pub async fn requeue_dead_letter(&self, id: &str) -> Result<Option<QueueEntry>> {
        let db = self.database().await?;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let result: Result<_> = async {
            let queue = LibSqlQueueRepository::new(conn);
            let Some(letter) = queue.get_dead_letter(id).await? else {
                return Ok(None);
            };
            queue.remove_dead_letter(id).await?;

            let previous = letter.entry;
            let entry = new_entry(
                previous.action,
                previous.collection,
                previous.entity_id,
                previous.payload,
            );
            queue.insert(&entry).await?;
            Ok(Some(entry))
        }
        .await;
        finish_transaction(conn, result).await
    }

    pub async fn discard_dead_letter(&self, id: &str) -> Result<bool> {
        let db = self.database().await?;
        LibSqlQueueRepository::new(db.connection())
            .remove_dead_letter(id)
            .await
    }

    // Reconciliation sweep

    /// Records still flagged `offline` that no queue entry will push.
    pub async fn unqueued_offline(&self, collection: EntityCollection) -> Result<Vec<EntityRecord>> {
        let db = self.database().await?;
        LibSqlEntityRepository::new(db.connection(), collection)
            .list_unqueued_offline()
            .await
    }

    /// Mark a swept record `synced` unless it was rewritten after `updated_at`.
    pub async fn mark_reconciled(
        &self,
        collection: EntityCollection,
        id: &str,
        updated_at: i64,
    ) -> Result<bool> {
        let db = self.database().await?;
        LibSqlEntityRepository::new(db.connection(), collection)
            .mark_synced_if_unchanged(id, updated_at)
            .await
    }

    // Preferences

    pub async fn get_preference(&self, key: &str) -> Result<Option<Preference>> {
        let db = self.database().await?;
        LibSqlPreferenceRepository::new(db.connection())
            .get(key)
            .await
    }

    /// Read a preference and decode it; `None` when unset.
    pub async fn get_preference_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_preference(key)
            .await?
            .map(|preference| serde_json::from_value(preference.value))
            .transpose()
            .map_err(Error::from)
    }

    pub async fn set_preference(&self, key: &str, value: Value) -> Result<Preference> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidInput("preference key cannot be empty".to_string()));
        }
        let preference = Preference {
            key: key.to_string(),
            value,
            updated_at: now_millis(),
        };
        let db = self.database().await?;
        LibSqlPreferenceRepository::new(db.connection())
            .set(&preference)
            .await?;
        Ok(preference)
    }

    pub async fn list_preferences(&self) -> Result<Vec<Preference>> {
        let db = self.database().await?;
        LibSqlPreferenceRepository::new(db.connection()).list().await
    }

    pub async fn delete_preference(&self, key: &str) -> Result<bool> {
        let db = self.database().await?;
        LibSqlPreferenceRepository::new(db.connection())
            .delete(key)
            .await
    }

    /// Destructive reset of one table, or of every table when `table` is `None`.
    pub async fn clear(&self, table: Option<StoreTable>) -> Result<()> {
        let db = self.database().await?;
        let conn = db.connection();

        let tables = table.map_or_else(
            || {
                let mut all: Vec<StoreTable> = EntityCollection::ALL
                    .into_iter()
                    .map(StoreTable::Entity)
                    .collect();
                all.extend([StoreTable::Preferences, StoreTable::SyncQueue, StoreTable::DeadLetters]);
                all
            },
            |table| vec![table],
        );

        for table in tables {
            match table {
                StoreTable::Entity(collection) => {
                    LibSqlEntityRepository::new(conn, collection).clear().await?;
                }
                StoreTable::Preferences => LibSqlPreferenceRepository::new(conn).clear().await?,
                StoreTable::SyncQueue => LibSqlQueueRepository::new(conn).clear().await?,
                StoreTable::DeadLetters => {
                    LibSqlQueueRepository::new(conn).clear_dead_letters().await?;
                }
            }
        }
        tracing::debug!("Cleared local store tables");
        Ok(())
    }
}

fn new_entry(
    action: MutationAction,
    collection: EntityCollection,
    entity_id: String,
    payload: Value,
) -> QueueEntry {
    let created_at = now_millis();
    QueueEntry {
        id: queue_entry_id(collection, action, created_at),
        action,
        collection,
        entity_id,
        payload,
        created_at,
        retry_count: 0,
    }
}

/// Write timestamp that strictly increases per record
fn stamp(previous: Option<&EntityRecord>) -> i64 {
    let now = now_millis();
    previous.map_or(now, |record| now.max(record.updated_at + 1))
}

async fn finish_transaction<T>(conn: &Connection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            if let Err(e) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
            Ok(value)
        }
        Err(e) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(e)
        }
    }
}
