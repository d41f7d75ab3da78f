//! SQLite-backed durable store.
//!
//! The production implementation: every put/delete is a single SQLite
//! statement and therefore durable before the call returns, which is what
//! lets an interrupted process resume from its last completed operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use backhaul_common::{Error, Result};

use crate::record::{ActionFailure, CachedEntry, PendingAction, SyncRecord};
use crate::store::DurableStore;

/// Durable store over an embedded SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a store database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(sql_err)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pending_actions (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                target TEXT NOT NULL,
                method TEXT NOT NULL,
                headers TEXT NOT NULL,
                body BLOB,
                enqueued_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL,
                attempt_limit INTEGER NOT NULL,
                priority INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_actions_order
                ON pending_actions(priority DESC, enqueued_at ASC);

            CREATE TABLE IF NOT EXISTS cached_entries (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                payload BLOB NOT NULL,
                stored_at INTEGER NOT NULL,
                expires_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_cache_category ON cached_entries(category);
            CREATE INDEX IF NOT EXISTS idx_cache_expiry ON cached_entries(expires_at);

            CREATE TABLE IF NOT EXISTS sync_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                ran_at INTEGER NOT NULL,
                succeeded INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                failures TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sync_log_ran_at ON sync_log(ran_at);
            "#,
        )
        .map_err(sql_err)?;

        info!("Durable store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

fn sql_err(err: rusqlite::Error) -> Error {
    Error::Storage(err.to_string())
}

fn millis_to_utc(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(idx, ms)
    })
}

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<PendingAction> {
    let headers_json: String = row.get(4)?;
    let headers = serde_json::from_str(&headers_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
    })?;
    let method_str: String = row.get(3)?;
    let method = method_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
    })?;

    Ok(PendingAction {
        id: row.get(0)?,
        kind: row.get(1)?,
        target: row.get(2)?,
        method,
        headers,
        body: row.get(5)?,
        enqueued_at: millis_to_utc(6, row.get(6)?)?,
        attempts: row.get(7)?,
        attempt_limit: row.get(8)?,
        priority: backhaul_common::Priority::from_rank(row.get(9)?),
    })
}

fn cached_from_row(row: &Row<'_>) -> rusqlite::Result<CachedEntry> {
    let expires_at = match row.get::<_, Option<i64>>(4)? {
        Some(ms) => Some(millis_to_utc(4, ms)?),
        None => None,
    };
    Ok(CachedEntry {
        id: row.get(0)?,
        category: row.get(1)?,
        payload: row.get(2)?,
        stored_at: millis_to_utc(3, row.get(3)?)?,
        expires_at,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
    let failures_json: String = row.get(3)?;
    let failures: Vec<ActionFailure> = serde_json::from_str(&failures_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
    })?;
    Ok(SyncRecord {
        ran_at: millis_to_utc(0, row.get(0)?)?,
        succeeded: row.get::<_, i64>(1)? as usize,
        failed: row.get::<_, i64>(2)? as usize,
        failures,
    })
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn put_action(&self, action: &PendingAction) -> Result<()> {
        debug!(id = %action.id, kind = %action.kind, "Persisting pending action");
        let headers = serde_json::to_string(&action.headers)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO pending_actions
            (id, kind, target, method, headers, body, enqueued_at, attempts, attempt_limit, priority)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                action.id,
                action.kind,
                action.target,
                action.method.as_str(),
                headers,
                action.body,
                action.enqueued_at.timestamp_millis(),
                action.attempts,
                action.attempt_limit,
                action.priority.rank(),
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    async fn get_action(&self, id: &str) -> Result<Option<PendingAction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, kind, target, method, headers, body,
                       enqueued_at, attempts, attempt_limit, priority
                FROM pending_actions WHERE id = ?1
                "#,
            )
            .map_err(sql_err)?;

        match stmt.query_row([id], action_from_row) {
            Ok(action) => Ok(Some(action)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(sql_err(e)),
        }
    }

    async fn delete_action(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM pending_actions WHERE id = ?1", params![id])
            .map_err(sql_err)?;
        Ok(())
    }

    async fn list_actions(&self) -> Result<Vec<PendingAction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, kind, target, method, headers, body,
                       enqueued_at, attempts, attempt_limit, priority
                FROM pending_actions
                "#,
            )
            .map_err(sql_err)?;

        let actions = stmt
            .query_map([], action_from_row)
            .map_err(sql_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_err)?;
        Ok(actions)
    }

    async fn put_cached(&self, entry: &CachedEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cached_entries
            (id, category, payload, stored_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.id,
                entry.category,
                entry.payload,
                entry.stored_at.timestamp_millis(),
                entry.expires_at.map(|t| t.timestamp_millis()),
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    async fn list_cached(&self, category: Option<&str>) -> Result<Vec<CachedEntry>> {
        let conn = self.conn.lock().unwrap();
        let entries = match category {
            Some(category) => {
                let mut stmt = conn
                    .prepare(
                        r#"
                        SELECT id, category, payload, stored_at, expires_at
                        FROM cached_entries WHERE category = ?1
                        "#,
                    )
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map([category], cached_from_row)
                    .map_err(sql_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(sql_err)?;
                rows
            }
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, category, payload, stored_at, expires_at FROM cached_entries",
                    )
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map([], cached_from_row)
                    .map_err(sql_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(sql_err)?;
                rows
            }
        };
        Ok(entries)
    }

    async fn delete_cached(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM cached_entries WHERE id = ?1", params![id])
            .map_err(sql_err)?;
        Ok(())
    }

    async fn delete_expired_cached(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute(
                "DELETE FROM cached_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now.timestamp_millis()],
            )
            .map_err(sql_err)?;
        Ok(removed)
    }

    async fn append_sync_record(&self, record: &SyncRecord) -> Result<()> {
        let failures = serde_json::to_string(&record.failures)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sync_log (ran_at, succeeded, failed, failures)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                record.ran_at.timestamp_millis(),
                record.succeeded as i64,
                record.failed as i64,
                failures,
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    async fn list_sync_records(&self, limit: usize) -> Result<Vec<SyncRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT ran_at, succeeded, failed, failures
                FROM sync_log ORDER BY seq DESC LIMIT ?1
                "#,
            )
            .map_err(sql_err)?;

        let records = stmt
            .query_map([limit as i64], record_from_row)
            .map_err(sql_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_err)?;
        Ok(records)
    }

    async fn prune_sync_records(&self, keep: usize) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute(
                r#"
                DELETE FROM sync_log WHERE seq NOT IN
                    (SELECT seq FROM sync_log ORDER BY seq DESC LIMIT ?1)
                "#,
                params![keep as i64],
            )
            .map_err(sql_err)?;
        Ok(removed)
    }
}
