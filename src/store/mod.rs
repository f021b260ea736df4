//! Durable local record store.
//!
//! Two collections (`reports`, `identities`) live in SQLite, one table each,
//! with the record body stored as JSON next to its primary key. Every write
//! runs in its own immediate transaction and is committed (`synchronous =
//! FULL`) before the call returns, so a caller that observed success can rely
//! on the record surviving a restart.

use rusqlite::types::ToSql;
use rusqlite::{params, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::db;
use crate::db::models::{Identity, Report};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A record type that belongs to one collection of the store.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Table backing the collection.
    const COLLECTION: &'static str;
    /// Primary key column of that table.
    const KEY_COLUMN: &'static str;

    type Key: ToSql + Send + Sync;

    fn key(&self) -> Self::Key;

    /// Columns copied out of the body so they can be inspected without JSON.
    fn mirrored_columns(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

impl Record for Report {
    const COLLECTION: &'static str = "reports";
    const KEY_COLUMN: &'static str = "id";
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }

    fn mirrored_columns(&self) -> Vec<(&'static str, String)> {
        vec![("sync_state", self.sync_state.as_str().to_string())]
    }
}

impl Record for Identity {
    const COLLECTION: &'static str = "identities";
    const KEY_COLUMN: &'static str = "username";
    type Key = String;

    fn key(&self) -> String {
        self.username.clone()
    }
}

/// One delivery attempt recorded by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub id: String,
    pub report_id: i64,
    pub outcome: String,
    pub detail: Option<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct LocalStore {
    pool: DbPool,
}

impl LocalStore {
    /// Open (or create) the store at `path`. Safe to call on an existing database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = db::create_pool(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_pool(pool)
    }

    pub fn from_pool(pool: DbPool) -> Result<Self, StoreError> {
        db::run_migrations(&pool).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Insert or replace `record` by its primary key.
    pub async fn put<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let body = serde_json::to_string(record)?;
        let mirrored = record.mirrored_columns();
        let key = record.key();

        let mut columns = vec![R::KEY_COLUMN, "body", "updated_at"];
        columns.extend(mirrored.iter().map(|(name, _)| *name));
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let updates: Vec<String> = columns
            .iter()
            .skip(1)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders})
             ON CONFLICT({key}) DO UPDATE SET {updates}",
            table = R::COLLECTION,
            columns = columns.join(", "),
            placeholders = placeholders.join(", "),
            key = R::KEY_COLUMN,
            updates = updates.join(", "),
        );

        let now = chrono::Utc::now().to_rfc3339();
        let mut values: Vec<&dyn ToSql> = vec![&key, &body, &now];
        values.extend(mirrored.iter().map(|(_, v)| v as &dyn ToSql));

        let mut conn = self.pool.get()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(classify_write)?;
        tx.execute(&sql, values.as_slice()).map_err(classify_write)?;
        tx.commit().map_err(classify_write)?;

        tracing::debug!("Stored {} record", R::COLLECTION);
        Ok(())
    }

    pub async fn get<R: Record>(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT body FROM {} WHERE {} = ?1",
            R::COLLECTION,
            R::KEY_COLUMN
        );

        let body: Option<String> = conn
            .query_row(&sql, params![key], |row| row.get(0))
            .optional()?;

        match body {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Every record of the collection, in no particular order.
    pub async fn get_all<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("SELECT body FROM {}", R::COLLECTION))?;

        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    pub async fn max_report_id(&self) -> Result<Option<i64>, StoreError> {
        let conn = self.pool.get()?;
        let max: Option<i64> = conn.query_row("SELECT MAX(id) FROM reports", [], |row| row.get(0))?;
        Ok(max)
    }

    /// Store a new identity and make it the active one, all or nothing.
    pub async fn register_identity_atomic(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let body = serde_json::to_string(identity)?;

        // Rolls back on drop, so a failed write never leaves the pooled connection mid-transaction
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(classify_write)?;
        tx.execute(
            "INSERT INTO identities (username, body) VALUES (?1, ?2)",
            params![identity.username, body],
        )
        .map_err(classify_write)?;
        tx.execute(
            "INSERT INTO active_identity (slot, username, activated_at)
             VALUES (1, ?1, datetime('now'))
             ON CONFLICT(slot) DO UPDATE SET
               username = excluded.username,
               activated_at = excluded.activated_at",
            params![identity.username],
        )
        .map_err(classify_write)?;
        tx.commit().map_err(classify_write)?;
        Ok(())
    }

    /// Point the active-identity slot at `username`, or clear it.
    pub async fn set_active_identity(&self, username: Option<&str>) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        match username {
            Some(username) => conn.execute(
                "INSERT INTO active_identity (slot, username, activated_at)
                 VALUES (1, ?1, datetime('now'))
                 ON CONFLICT(slot) DO UPDATE SET
                   username = excluded.username,
                   activated_at = excluded.activated_at",
                params![username],
            ),
            None => conn.execute("DELETE FROM active_identity WHERE slot = 1", []),
        }
        .map_err(classify_write)?;
        Ok(())
    }

    pub async fn active_identity(&self) -> Result<Option<Identity>, StoreError> {
        let conn = self.pool.get()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT i.body FROM active_identity a
                 JOIN identities i ON i.username = a.username
                 WHERE a.slot = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Append to the delivery audit trail.
    pub async fn log_sync_event(
        &self,
        report_id: i64,
        outcome: &str,
        detail: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO sync_events (id, report_id, outcome, detail) VALUES (?1, ?2, ?3, ?4)",
            params![id, report_id, outcome, detail],
        )
        .map_err(classify_write)?;
        Ok(())
    }

    /// Most recent delivery events, newest first.
    pub async fn recent_sync_events(&self, limit: usize) -> Result<Vec<SyncEvent>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, report_id, outcome, detail, created_at
             FROM sync_events
             ORDER BY rowid DESC
             LIMIT ?1",
        )?;

        let events = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SyncEvent {
                    id: row.get(0)?,
                    report_id: row.get(1)?,
                    outcome: row.get(2)?,
                    detail: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

/// Aborted transactions are retryable conflicts; anything else is a plain SQL error.
fn classify_write(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::ConstraintViolation
            ) =>
        {
            StoreError::WriteConflict(err.to_string())
        }
        other => StoreError::Sql(other),
    }
}
