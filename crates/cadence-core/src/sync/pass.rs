//! One sync pass: batched queue replay followed by the reconciliation sweep

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast;

use crate::config::SyncConfig;
use crate::db::LocalStore;
use crate::error::Result;
use crate::models::{EntityCollection, EntityRecord, MutationAction, QueueEntry};
use crate::remote::{RemoteApi, RemoteError};

use super::events::{ReplayFailure, SyncEvent, SyncReport};

type TargetKey = (EntityCollection, String);

/// Everything a pass needs, borrowed from the engine.
pub(crate) struct Pass<'a> {
    pub store: &'a LocalStore,
    pub remote: &'a dyn RemoteApi,
    pub config: &'a SyncConfig,
    pub events: &'a broadcast::Sender<SyncEvent>,
}

enum Outcome<'e> {
    Replayed(&'e QueueEntry),
    Failed(&'e QueueEntry, RemoteError),
    Deferred(&'e QueueEntry),
}

impl Pass<'_> {
    pub async fn run(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let queue = self.store.list_queue().await?;
        tracing::debug!(entries = queue.len(), "Replaying mutation queue");

        // Keys with a failed entry; later entries for them wait for the next pass.
        let mut blocked: HashSet<TargetKey> = HashSet::new();

        for batch in queue.chunks(self.config.batch_size.max(1)) {
            let mut chains: Vec<Vec<&QueueEntry>> = Vec::new();
            let mut chain_index: HashMap<(EntityCollection, &str), usize> = HashMap::new();

            for entry in batch {
                if blocked.contains(&(entry.collection, entry.entity_id.clone())) {
                    report.deferred += 1;
                    continue;
                }
                let slot = *chain_index.entry(entry.target()).or_insert_with(|| {
                    chains.push(Vec::new());
                    chains.len() - 1
                });
                chains[slot].push(entry);
            }

            let outcomes = join_all(chains.iter().map(|chain| self.replay_chain(chain))).await;

            for outcome in outcomes.into_iter().flatten() {
                match outcome {
                    Outcome::Replayed(entry) => {
                        if self.store.complete_entry(entry).await? {
                            report.replayed += 1;
                        }
                    }
                    Outcome::Failed(entry, error) => {
                        blocked.insert((entry.collection, entry.entity_id.clone()));
                        self.settle_failure(entry, &error, &mut report).await?;
                    }
                    Outcome::Deferred(entry) => {
                        blocked.insert((entry.collection, entry.entity_id.clone()));
                        report.deferred += 1;
                    }
                }
            }
        }

        if self.config.reconcile_offline {
            self.reconcile(&mut report).await?;
        }

        Ok(report)
    }

    /// Replay entries for one entity in order, stopping at the first failure.
    async fn replay_chain<'e>(&self, chain: &[&'e QueueEntry]) -> Vec<Outcome<'e>> {
        let mut outcomes = Vec::with_capacity(chain.len());
        let mut failed = false;
        for &entry in chain {
            if failed {
                outcomes.push(Outcome::Deferred(entry));
                continue;
            }
            match self.replay(entry).await {
                Ok(()) => outcomes.push(Outcome::Replayed(entry)),
                Err(error) => {
                    failed = true;
                    outcomes.push(Outcome::Failed(entry, error));
                }
            }
        }
        outcomes
    }

    async fn replay(&self, entry: &QueueEntry) -> std::result::Result<(), RemoteError> {
        let call = async {
            match entry.action {
                MutationAction::Create => self.remote.create(entry.collection, &entry.payload).await,
                MutationAction::Update => {
                    self.remote
                        .update(entry.collection, &entry.entity_id, &entry.payload)
                        .await
                }
                MutationAction::Delete => {
                    self.remote.delete(entry.collection, &entry.entity_id).await
                }
            }
        };
        with_timeout(self.config.request_timeout, call).await
    }

    async fn settle_failure(
        &self,
        entry: &QueueEntry,
        error: &RemoteError,
        report: &mut SyncReport,
    ) -> Result<()> {
        let message = error.to_string();
        report.failures.push(ReplayFailure {
            entry_id: entry.id.clone(),
            error: message.clone(),
        });

        if entry.retry_count < self.config.max_retries {
            if self.store.increment_retry(&entry.id).await? {
                report.retried += 1;
                let retry_count = entry.retry_count + 1;
                tracing::warn!(
                    entry = %entry.id,
                    retry_count,
                    "Replay failed: {message}"
                );
                self.emit(SyncEvent::ReplayFailed {
                    entry_id: entry.id.clone(),
                    retry_count,
                    error: message,
                });
            }
            return Ok(());
        }

        if let Some(letter) = self.store.dead_letter(entry, &message).await? {
            report.exhausted += 1;
            tracing::warn!(
                entry = %entry.id,
                retries = entry.retry_count,
                "Mutation dropped after exhausting retries: {message}"
            );
            self.emit(SyncEvent::RetryExhausted(letter));
        }
        Ok(())
    }

    /// Push records still flagged `offline` that the queue does not cover.
    async fn reconcile(&self, report: &mut SyncReport) -> Result<()> {
        for collection in EntityCollection::ALL {
            let records = self.store.unqueued_offline(collection).await?;
            if records.is_empty() {
                continue;
            }
            tracing::debug!(%collection, records = records.len(), "Reconciling offline records");

            for chunk in records.chunks(self.config.batch_size.max(1)) {
                let results = join_all(chunk.iter().map(|record| self.push(collection, record))).await;

                for (record, result) in chunk.iter().zip(results) {
                    match result {
                        Ok(()) => {
                            if self
                                .store
                                .mark_reconciled(collection, &record.id, record.updated_at)
                                .await?
                            {
                                report.reconciled += 1;
                                self.emit(SyncEvent::Reconciled {
                                    collection,
                                    id: record.id.clone(),
                                });
                            }
                        }
                        Err(error) => {
                            report.reconcile_failed += 1;
                            tracing::warn!(%collection, id = %record.id, "Reconcile push failed: {error}");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn push(
        &self,
        collection: EntityCollection,
        record: &EntityRecord,
    ) -> std::result::Result<(), RemoteError> {
        let payload = record.remote_payload();
        with_timeout(
            self.config.request_timeout,
            self.remote.create(collection, &payload),
        )
        .await
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn with_timeout(
    limit: Duration,
    call: impl std::future::Future<Output = std::result::Result<(), RemoteError>>,
) -> std::result::Result<(), RemoteError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(RemoteError::Timeout))
}
