pub mod catalog;
pub mod common;
pub mod playlist;
pub mod prefs;
pub mod queue;
pub mod sync;
