use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::sync::client::SyncError;
use crate::sync::query::SyncStatus;

fn db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "example", "RippleGtk")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

fn open_conn() -> Result<Connection, SyncError> {
    let path = db_path().ok_or_else(|| SyncError::Storage("no data dir".into()))?;
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    Ok(Connection::open(path)?)
}

// One generic table caches every collection the local backend holds, so the
// app has data to serve on the next launch before anything else happens.
pub fn init() -> Result<(), SyncError> {
    let conn = open_conn()?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS entities (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            sync_status TEXT NOT NULL,
            json TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        );
        "#,
    )?;
    Ok(())
}

pub fn upsert_entity(
    collection: &str,
    id: &str,
    status: SyncStatus,
    value: &Value,
) -> Result<(), SyncError> {
    let conn = open_conn()?;
    let json = serde_json::to_string(value).unwrap_or_default();
    conn.execute(
        r#"
        INSERT INTO entities (collection, id, sync_status, json, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(collection, id) DO UPDATE SET
            sync_status=excluded.sync_status,
            json=excluded.json,
            updated_at=excluded.updated_at
        "#,
        params![collection, id, status.as_str(), json, crate::utils::now_millis()],
    )?;
    Ok(())
}

pub fn load_all() -> Result<Vec<(String, String, SyncStatus, Value)>, SyncError> {
    let conn = open_conn()?;
    let mut stmt = conn.prepare("SELECT collection, id, sync_status, json FROM entities")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (collection, id, status, json) = row?;
        let status = SyncStatus::parse(&status).unwrap_or(SyncStatus::Confirmed);
        match serde_json::from_str(&json) {
            Ok(value) => out.push((collection, id, status, value)),
            Err(e) => log::warn!("dropping cached entity {collection}/{id}: {e}"),
        }
    }
    Ok(out)
}
