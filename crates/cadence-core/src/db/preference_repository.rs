//! Preference repository implementation

use crate::error::Result;
use crate::models::Preference;
use libsql::{params, Connection, Row};
use serde_json::Value;

/// Trait for local preference storage (async)
#[allow(async_fn_in_trait)]
pub trait PreferenceRepository {
    /// Read one preference
    async fn get(&self, key: &str) -> Result<Option<Preference>>;

    /// Write a preference, replacing any previous value
    async fn set(&self, preference: &Preference) -> Result<()>;

    /// All preferences ordered by key
    async fn list(&self) -> Result<Vec<Preference>>;

    /// Remove a preference; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every preference
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `PreferenceRepository`
pub struct LibSqlPreferenceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlPreferenceRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_preference(row: &Row) -> Result<Preference> {
        let raw: String = row.get(1)?;
        Ok(Preference {
            key: row.get(0)?,
            value: serde_json::from_str::<Value>(&raw)?,
            updated_at: row.get(2)?,
        })
    }
}

impl PreferenceRepository for LibSqlPreferenceRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<Preference>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, value, updated_at FROM preferences WHERE key = ?",
                [key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_preference(&row)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, preference: &Preference) -> Result<()> {
        let value = serde_json::to_string(&preference.value)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![preference.key.as_str(), value, preference.updated_at],
            )
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Preference>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, value, updated_at FROM preferences ORDER BY key",
                (),
            )
            .await?;

        let mut preferences = Vec::new();
        while let Some(row) = rows.next().await? {
            preferences.push(Self::parse_preference(&row)?);
        }
        Ok(preferences)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM preferences WHERE key = ?", [key])
            .await?;
        Ok(affected > 0)
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM preferences", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn preference(key: &str, value: Value) -> Preference {
        Preference {
            key: key.to_string(),
            value,
            updated_at: 1,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_preference() {
        let db = setup().await;
        let repo = LibSqlPreferenceRepository::new(db.connection());

        assert!(repo.get("volume").await.unwrap().is_none());
        assert!(!repo.delete("volume").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_values_keep_their_json_type() {
        let db = setup().await;
        let repo = LibSqlPreferenceRepository::new(db.connection());

        repo.set(&preference("volume", json!(0.8))).await.unwrap();
        repo.set(&preference("shuffle", json!(true))).await.unwrap();
        repo.set(&preference("eq", json!({"bass": 3, "treble": -1})))
            .await
            .unwrap();
        repo.set(&preference("lastPlayed", Value::Null)).await.unwrap();

        assert_eq!(repo.get("volume").await.unwrap().unwrap().value, json!(0.8));
        assert_eq!(repo.get("shuffle").await.unwrap().unwrap().value, json!(true));
        assert_eq!(
            repo.get("eq").await.unwrap().unwrap().value,
            json!({"bass": 3, "treble": -1})
        );
        assert_eq!(
            repo.get("lastPlayed").await.unwrap().unwrap().value,
            Value::Null
        );

        let keys: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, vec!["eq", "lastPlayed", "shuffle", "volume"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_overwrites() {
        let db = setup().await;
        let repo = LibSqlPreferenceRepository::new(db.connection());

        repo.set(&preference("theme", json!("dark"))).await.unwrap();
        repo.set(&preference("theme", json!("light"))).await.unwrap();

        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert_eq!(repo.get("theme").await.unwrap().unwrap().value, json!("light"));

        repo.clear().await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }
}
