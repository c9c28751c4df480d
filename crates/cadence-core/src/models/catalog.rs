//! Catalog item model

use serde::{Deserialize, Serialize};

use super::entity::{new_entity_id, Entity, EntityCollection};

/// A track in the local music catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Client-generated identifier
    pub id: String,
    /// Track title
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Track length in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CatalogItem {
    /// Create a new catalog item with a fresh id
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(new_entity_id(), title)
    }

    /// Create a catalog item with a caller-chosen id
    #[must_use]
    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: None,
            album: None,
            genre: None,
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    #[must_use]
    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }
}

impl Entity for CatalogItem {
    const COLLECTION: EntityCollection = EntityCollection::Catalog;

    fn id(&self) -> &str {
        &self.id
    }
}
