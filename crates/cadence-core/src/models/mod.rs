//! Data models for Cadence

mod catalog;
mod entity;
mod mutation;
mod playlist;
mod preference;

pub use catalog::CatalogItem;
pub use entity::{
    new_entity_id, Entity, EntityCollection, EntityRecord, IndexColumn, IndexDef, Stored,
    SyncStatus,
};
pub use mutation::{queue_entry_id, DeadLetter, MutationAction, QueueEntry};
pub use playlist::Playlist;
pub use preference::Preference;
