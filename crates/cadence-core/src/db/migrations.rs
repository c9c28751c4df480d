//! Database migrations
//!
//! Migrations are additive: a new version may add tables and indexes but never
//! drops data written by an earlier version.

use crate::error::Result;
use crate::models::EntityCollection;
use libsql::Connection;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
pub async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// DDL for one entity collection table and its secondary indexes
fn entity_collection_statements(collection: EntityCollection) -> Vec<String> {
    let table = collection.as_str();
    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL
        )"
    )];
    for index in collection.indexes() {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{name} ON {table}({expr})",
            name = index.name.to_ascii_lowercase(),
            expr = index.sql_expr(),
        ));
    }
    statements
}

/// Migration to version 1: entity collections, preferences, and the mutation queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let mut statements = vec![
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )"
        .to_string(),
    ];

    for collection in EntityCollection::ALL {
        statements.extend(entity_collection_statements(collection));
    }

    statements.extend([
        // Preferences (local only)
        "CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )"
        .to_string(),
        // Mutation queue; seq preserves insertion order
        "CREATE TABLE IF NOT EXISTS sync_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            action TEXT NOT NULL,
            collection TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0
        )"
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_target ON sync_queue(collection, entity_id)"
            .to_string(),
        "INSERT INTO schema_version (version) VALUES (1)".to_string(),
    ]);

    apply(conn, 1, &statements).await
}

/// Migration to version 2: dead-letter log for retry-exhausted mutations
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS dead_letters (
            id TEXT PRIMARY KEY,
            action TEXT NOT NULL,
            collection TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL,
            failed_at INTEGER NOT NULL,
            last_error TEXT NOT NULL
        )"
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_dead_letters_failed_at ON dead_letters(failed_at DESC)"
            .to_string(),
        "INSERT INTO schema_version (version) VALUES (2)".to_string(),
    ];

    apply(conn, 2, &statements).await
}

/// Run `statements` in one transaction, rolling back on the first failure
async fn apply(conn: &Connection, version: i32, statements: &[String]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt.as_str(), ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated local store to version {version}");
    Ok(())
}
