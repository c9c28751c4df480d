//! Generic entity records and the collections that hold them

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Create a new client-generated entity id (UUID v7, time-sortable).
///
/// Client-side ids keep `create` replays idempotent at the remote API.
#[must_use]
pub fn new_entity_id() -> String {
    Uuid::now_v7().to_string()
}

/// Local view of whether a record has reached the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Current field values have been transmitted at least once
    Synced,
    /// Written while online, waiting in the mutation queue
    Pending,
    /// Written while disconnected
    #[default]
    Offline,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Offline => "offline",
        }
    }

    /// Status stamped by a plain `put`: optimistic, derived from connectivity alone.
    pub const fn optimistic(online: bool) -> Self {
        if online {
            Self::Synced
        } else {
            Self::Offline
        }
    }

    /// Status stamped by a queued write: never `synced` until replay succeeds.
    pub const fn queued(online: bool) -> Self {
        if online {
            Self::Pending
        } else {
            Self::Offline
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "offline" => Ok(Self::Offline),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// Column a secondary index reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexColumn {
    /// The `sync_status` column
    SyncStatus,
    /// A top-level field of the JSON document
    Field(&'static str),
}

/// Secondary index declared for an entity collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub column: IndexColumn,
}

impl IndexDef {
    /// SQL expression the index is built on and queried with.
    pub fn sql_expr(&self) -> String {
        match self.column {
            IndexColumn::SyncStatus => "sync_status".to_string(),
            IndexColumn::Field(field) => format!("json_extract(data, '$.{field}')"),
        }
    }
}

const CATALOG_INDEXES: &[IndexDef] = &[
    IndexDef {
        name: "syncStatus",
        column: IndexColumn::SyncStatus,
    },
    IndexDef {
        name: "artist",
        column: IndexColumn::Field("artist"),
    },
    IndexDef {
        name: "genre",
        column: IndexColumn::Field("genre"),
    },
];

const PLAYLIST_INDEXES: &[IndexDef] = &[
    IndexDef {
        name: "syncStatus",
        column: IndexColumn::SyncStatus,
    },
    IndexDef {
        name: "name",
        column: IndexColumn::Field("name"),
    },
];

/// Entity collections that track sync status and replicate to the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCollection {
    Catalog,
    Playlists,
}

impl EntityCollection {
    pub const ALL: [Self; 2] = [Self::Catalog, Self::Playlists];

    /// Logical name, also used as the table name and the remote endpoint segment.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Playlists => "playlists",
        }
    }

    pub const fn indexes(self) -> &'static [IndexDef] {
        match self {
            Self::Catalog => CATALOG_INDEXES,
            Self::Playlists => PLAYLIST_INDEXES,
        }
    }

    pub fn index(self, name: &str) -> Result<&'static IndexDef> {
        self.indexes()
            .iter()
            .find(|index| index.name == name)
            .ok_or_else(|| Error::UnknownIndex {
                collection: self.as_str().to_string(),
                index: name.to_string(),
            })
    }
}

impl fmt::Display for EntityCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityCollection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == s)
            .ok_or_else(|| Error::UnknownCollection(s.to_string()))
    }
}

/// A stored entity: id, free-form domain fields, and sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    /// Primary key, unique within the collection
    pub id: String,
    /// Domain fields (everything except the bookkeeping below)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Last local write (Unix ms)
    pub updated_at: i64,
    /// Local sync status
    pub sync_status: SyncStatus,
}

impl EntityRecord {
    /// Build an unsaved record; the store stamps `updated_at` and `sync_status` on write.
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
            updated_at: 0,
            sync_status: SyncStatus::default(),
        }
    }

    /// Convert a typed entity into a generic record.
    pub fn from_entity<E: Entity>(entity: &E) -> Result<Self> {
        let Value::Object(mut fields) = serde_json::to_value(entity)? else {
            return Err(Error::InvalidInput(format!(
                "{} entities must serialize to a JSON object",
                E::COLLECTION
            )));
        };
        fields.remove("id");
        Ok(Self::new(entity.id(), fields))
    }

    /// Decode the record back into a typed entity.
    pub fn to_entity<E: Entity>(&self) -> Result<E> {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Body sent to the remote API: the entity data without local-only bookkeeping.
    pub fn remote_payload(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert("updatedAt".to_string(), Value::from(self.updated_at));
        Value::Object(object)
    }
}

/// A domain type stored in one of the entity collections.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Collection the type lives in
    const COLLECTION: EntityCollection;

    /// Client-assigned primary key
    fn id(&self) -> &str;
}

/// A typed entity together with its sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<E> {
    pub entity: E,
    pub updated_at: i64,
    pub sync_status: SyncStatus,
}

impl<E: Entity> Stored<E> {
    pub fn from_record(record: &EntityRecord) -> Result<Self> {
        Ok(Self {
            entity: record.to_entity()?,
            updated_at: record.updated_at,
            sync_status: record.sync_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_parse_roundtrip() {
        for collection in EntityCollection::ALL {
            let parsed: EntityCollection = collection.as_str().parse().unwrap();
            assert_eq!(parsed, collection);
        }
        assert!(matches!(
            "songs".parse::<EntityCollection>(),
            Err(Error::UnknownCollection(name)) if name == "songs"
        ));
    }

    #[test]
    fn unknown_index_is_rejected() {
        assert!(EntityCollection::Catalog.index("artist").is_ok());
        assert!(matches!(
            EntityCollection::Playlists.index("artist"),
            Err(Error::UnknownIndex { .. })
        ));
    }

    #[test]
    fn index_expressions() {
        let artist = EntityCollection::Catalog.index("artist").unwrap();
        assert_eq!(artist.sql_expr(), "json_extract(data, '$.artist')");
        let status = EntityCollection::Catalog.index("syncStatus").unwrap();
        assert_eq!(status.sql_expr(), "sync_status");
    }

    #[test]
    fn status_rules() {
        assert_eq!(SyncStatus::optimistic(true), SyncStatus::Synced);
        assert_eq!(SyncStatus::optimistic(false), SyncStatus::Offline);
        assert_eq!(SyncStatus::queued(true), SyncStatus::Pending);
        assert_eq!(SyncStatus::queued(false), SyncStatus::Offline);
        assert_eq!("pending".parse::<SyncStatus>().unwrap(), SyncStatus::Pending);
    }

    #[test]
    fn record_serializes_flat() {
        let mut fields = Map::new();
        fields.insert("title".to_string(), json!("Song A"));
        let record = EntityRecord {
            id: "t1".to_string(),
            fields,
            updated_at: 42,
            sync_status: SyncStatus::Offline,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"id": "t1", "title": "Song A", "updatedAt": 42, "syncStatus": "offline"})
        );
        assert_eq!(
            record.remote_payload(),
            json!({"id": "t1", "title": "Song A", "updatedAt": 42})
        );
    }

    #[test]
    fn entity_ids_are_unique() {
        assert_ne!(new_entity_id(), new_entity_id());
    }
}
