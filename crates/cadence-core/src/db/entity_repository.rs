//! Entity collection repository

use crate::error::Result;
use crate::models::{EntityCollection, EntityRecord, SyncStatus};
use libsql::{params, Connection, Row, Rows, Value as SqlValue};
use serde_json::{Map, Value};

/// libSQL access to one entity collection table
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
    collection: EntityCollection,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection, collection: EntityCollection) -> Self {
        Self { conn, collection }
    }

    fn table(&self) -> &'static str {
        self.collection.as_str()
    }

    /// Parse a record from a database row
    fn parse_record(row: &Row) -> Result<EntityRecord> {
        let data: String = row.get(1)?;
        let fields: Map<String, Value> = serde_json::from_str(&data)?;
        let status: String = row.get(3)?;
        Ok(EntityRecord {
            id: row.get(0)?,
            fields,
            updated_at: row.get(2)?,
            sync_status: status.parse()?,
        })
    }

    async fn collect(mut rows: Rows) -> Result<Vec<EntityRecord>> {
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    /// Insert or replace by primary key
    pub async fn upsert(&self, record: &EntityRecord) -> Result<()> {
        let data = serde_json::to_string(&record.fields)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (id, data, updated_at, sync_status) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        data = excluded.data,
                        updated_at = excluded.updated_at,
                        sync_status = excluded.sync_status",
                    self.table()
                ),
                params![
                    record.id.as_str(),
                    data,
                    record.updated_at,
                    record.sync_status.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<EntityRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT id, data, updated_at, sync_status FROM {} WHERE id = ?1",
                    self.table()
                ),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    /// All records, ordered by primary key
    pub async fn list(&self) -> Result<Vec<EntityRecord>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT id, data, updated_at, sync_status FROM {} ORDER BY id",
                    self.table()
                ),
                (),
            )
            .await?;
        Self::collect(rows).await
    }

    /// Records whose secondary index `index_name` equals `value`; `null` matches unset fields
    pub async fn list_by_index(&self, index_name: &str, value: &Value) -> Result<Vec<EntityRecord>> {
        let index = self.collection.index(index_name)?;
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT id, data, updated_at, sync_status FROM {} WHERE {} IS ?1 ORDER BY id",
                    self.table(),
                    index.sql_expr()
                ),
                vec![index_value(value)],
            )
            .await?;
        Self::collect(rows).await
    }

    /// Remove by primary key; returns whether a row existed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", self.table()),
                params![id],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Settle a record after its version `sent_version` reached the remote.
    ///
    /// Untouched while another queue entry still targets it. Otherwise it becomes
    /// `synced` if still at `sent_version` (any version when `None`), or `offline`
    /// if it was rewritten since, so the sweep pushes the newer fields. Returns
    /// whether the record is now `synced`.
    pub async fn settle_replayed(&self, id: &str, sent_version: Option<i64>) -> Result<bool> {
        let unqueued = "NOT EXISTS (
                SELECT 1 FROM sync_queue WHERE collection = ?3 AND entity_id = ?2
             )";
        let synced = self
            .conn
            .execute(
                &format!(
                    "UPDATE {table} SET sync_status = ?1
                     WHERE id = ?2 AND {unqueued} AND (?4 IS NULL OR updated_at = ?4)",
                    table = self.table()
                ),
                vec![
                    SqlValue::Text(SyncStatus::Synced.as_str().to_string()),
                    SqlValue::Text(id.to_string()),
                    SqlValue::Text(self.table().to_string()),
                    sent_version.map_or(SqlValue::Null, SqlValue::Integer),
                ],
            )
            .await?;
        if synced > 0 {
            return Ok(true);
        }

        self.conn
            .execute(
                &format!(
                    "UPDATE {table} SET sync_status = ?1 WHERE id = ?2 AND {unqueued}",
                    table = self.table()
                ),
                params![SyncStatus::Offline.as_str(), id, self.table()],
            )
            .await?;
        Ok(false)
    }

    /// Mark `synced` only if the record was not rewritten since `updated_at`
    pub async fn mark_synced_if_unchanged(&self, id: &str, updated_at: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                &format!(
                    "UPDATE {} SET sync_status = ?1 WHERE id = ?2 AND updated_at = ?3",
                    self.table()
                ),
                params![SyncStatus::Synced.as_str(), id, updated_at],
            )
            .await?;
        Ok(affected > 0)
    }

    /// `offline` records that no queue entry covers
    pub async fn list_unqueued_offline(&self) -> Result<Vec<EntityRecord>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT id, data, updated_at, sync_status FROM {table}
                     WHERE sync_status = ?1 AND id NOT IN (
                        SELECT entity_id FROM sync_queue WHERE collection = ?2
                     )
                     ORDER BY updated_at, id",
                    table = self.table()
                ),
                params![SyncStatus::Offline.as_str(), self.table()],
            )
            .await?;
        Self::collect(rows).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", self.table()), ())
            .await?;
        Ok(())
    }
}

/// Bind a JSON value the way `json_extract` reports it
fn index_value(value: &Value) -> SqlValue {
    match value {
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || SqlValue::Real(number.as_f64().unwrap_or_default()),
            SqlValue::Integer,
        ),
        Value::Null => SqlValue::Null,
        other => SqlValue::Text(other.to_string()),
    }
}
