//! Database layer for Cadence

mod connection;
mod entity_repository;
mod migrations;
mod preference_repository;
mod queue_repository;
mod store;

pub use connection::Database;
pub use entity_repository::LibSqlEntityRepository;
pub use migrations::CURRENT_VERSION;
pub use preference_repository::{LibSqlPreferenceRepository, PreferenceRepository};
pub use queue_repository::LibSqlQueueRepository;
pub use store::{LocalStore, StoreTable};
