//! Playlist model

use serde::{Deserialize, Serialize};

use super::entity::{new_entity_id, Entity, EntityCollection};

/// An ordered list of catalog items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Catalog item ids, in play order
    #[serde(default)]
    pub track_ids: Vec<String>,
}

impl Playlist {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into(),
            description: None,
            track_ids: Vec::new(),
        }
    }

    /// Append a track unless it is already in the playlist
    pub fn add_track(&mut self, track_id: impl Into<String>) {
        let track_id = track_id.into();
        if !self.track_ids.contains(&track_id) {
            self.track_ids.push(track_id);
        }
    }
}

impl Entity for Playlist {
    const COLLECTION: EntityCollection = EntityCollection::Playlists;

    fn id(&self) -> &str {
        &self.id
    }
}
