//! cadence-core - Core library for Cadence
//!
//! This crate contains the models, local store, mutation queue, remote API
//! client, and sync engine used by Cadence front ends.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod signal;
pub mod sync;
pub mod util;

pub use config::{RemoteConfig, StoreLocation, SyncConfig};
pub use db::{LocalStore, StoreTable};
pub use error::{Error, Result};
pub use models::{
    CatalogItem, DeadLetter, Entity, EntityCollection, EntityRecord, MutationAction, Playlist,
    Preference, QueueEntry, Stored, SyncStatus,
};
pub use remote::{HttpRemoteApi, InMemoryRemote, RemoteApi, RemoteError};
pub use signal::{Connectivity, Visibility};
pub use sync::{EngineStatus, SyncEngine, SyncEvent, SyncReport, TriggerReason};
