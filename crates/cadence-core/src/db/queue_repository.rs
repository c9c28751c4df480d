//! Mutation queue and dead-letter repository

use crate::error::{Error, Result};
use crate::models::{DeadLetter, QueueEntry};
use libsql::{params, Connection, Row};

const ENTRY_COLUMNS: &str =
    "id, action, collection, entity_id, payload, created_at, retry_count";

/// libSQL access to `sync_queue` and `dead_letters`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &Row) -> Result<QueueEntry> {
        let action: String = row.get(1)?;
        let collection: String = row.get(2)?;
        let payload: String = row.get(4)?;
        let retry_count: i64 = row.get(6)?;
        Ok(QueueEntry {
            id: row.get(0)?,
            action: action.parse()?,
            collection: collection.parse()?,
            entity_id: row.get(3)?,
            payload: serde_json::from_str(&payload)?,
            created_at: row.get(5)?,
            retry_count: u32::try_from(retry_count).map_err(|_| {
                Error::Database(format!("retry_count out of range: {retry_count}"))
            })?,
        })
    }

    fn parse_dead_letter(row: &Row) -> Result<DeadLetter> {
        Ok(DeadLetter {
            entry: Self::parse_entry(row)?,
            failed_at: row.get(7)?,
            last_error: row.get(8)?,
        })
    }

    /// Append an entry at the tail of the queue
    pub async fn insert(&self, entry: &QueueEntry) -> Result<()> {
        let payload = serde_json::to_string(&entry.payload)?;
        self.conn
            .execute(
                "INSERT INTO sync_queue (id, action, collection, entity_id, payload, created_at, retry_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id.as_str(),
                    entry.action.as_str(),
                    entry.collection.as_str(),
                    entry.entity_id.as_str(),
                    payload,
                    entry.created_at,
                    i64::from(entry.retry_count)
                ],
            )
            .await?;
        Ok(())
    }

    /// Entries in enqueue order
    pub async fn list(&self) -> Result<Vec<QueueEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM sync_queue ORDER BY seq"),
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    pub async fn get(&self, id: &str) -> Result<Option<QueueEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM sync_queue WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    /// Remove an entry; returns whether it was still queued
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?1", params![id])
            .await?;
        Ok(affected > 0)
    }

    /// Bump the retry counter of a queued entry
    pub async fn increment_retry(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE sync_queue SET retry_count = retry_count + 1 WHERE id = ?1",
                params![id],
            )
            .await?;
        Ok(affected > 0)
    }

    pub async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_queue", ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Whether any entry still targets the given entity
    pub async fn has_pending(&self, collection: &str, entity_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sync_queue WHERE collection = ?1 AND entity_id = ?2)",
                params![collection, entity_id],
            )
            .await?;
        Ok(match rows.next().await? {
            Some(row) => row.get::<i32>(0)? != 0,
            None => false,
        })
    }

    pub async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sync_queue", ()).await?;
        Ok(())
    }

    pub async fn insert_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let entry = &letter.entry;
        let payload = serde_json::to_string(&entry.payload)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO dead_letters
                    (id, action, collection, entity_id, payload, created_at, retry_count, failed_at, last_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.id.as_str(),
                    entry.action.as_str(),
                    entry.collection.as_str(),
                    entry.entity_id.as_str(),
                    payload,
                    entry.created_at,
                    i64::from(entry.retry_count),
                    letter.failed_at,
                    letter.last_error.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    /// Dead letters, most recent failure first
    pub async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS}, failed_at, last_error FROM dead_letters
                     ORDER BY failed_at DESC, id"
                ),
                (),
            )
            .await?;

        let mut letters = Vec::new();
        while let Some(row) = rows.next().await? {
            letters.push(Self::parse_dead_letter(&row)?);
        }
        Ok(letters)
    }

    pub async fn get_dead_letter(&self, id: &str) -> Result<Option<DeadLetter>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS}, failed_at, last_error FROM dead_letters WHERE id = ?1"
                ),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_dead_letter(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn remove_dead_letter(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM dead_letters WHERE id = ?1", params![id])
            .await?;
        Ok(affected > 0)
    }

    pub async fn clear_dead_letters(&self) -> Result<()> {
        self.conn.execute("DELETE FROM dead_letters", ()).await?;
        Ok(())
    }
}
