//! Append-only audit log of registration events
//!
//! Lives in its own SQLite file, independent of the client store, so a
//! failure here can never corrupt or block client data.

use crate::database::{Database, DatabaseError, Synchronous};
use crate::interface::{AuditEntry, StorageError, StoreKind};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::params;
use std::path::Path;
use tracing::warn;

const AUDIT_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS client_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event TEXT NOT NULL,
        timestampMillis INTEGER NOT NULL
    );
"#;

/// Append-only event log
pub trait AuditLog: Send + Sync {
    /// Store `event` stamped with the log's own clock
    fn append(&self, event: &str) -> Result<AuditEntry, StorageError>;

    /// Newest `limit` entries, newest first
    fn try_recent(&self, limit: usize) -> Result<Vec<AuditEntry>, StorageError>;

    /// Like `try_recent`, but a read failure yields an empty list plus the error
    fn recent(&self, limit: usize) -> (Vec<AuditEntry>, Option<StorageError>) {
        match self.try_recent(limit) {
            Ok(entries) => (entries, None),
            Err(err) => {
                warn!(error = %err, "audit log read failed");
                (Vec::new(), Some(err))
            }
        }
    }
}

/// SQLite-backed audit log
pub struct SqliteAuditLog {
    db: Database,
    /// Last timestamp handed out; appends never go backwards in time
    last_stamp: Mutex<i64>,
}

impl SqliteAuditLog {
    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self, StorageError> {
        let db = Database::open(path, AUDIT_SCHEMA, pool_size, Synchronous::Normal)
            .map_err(audit_error)?;
        Ok(Self::with_database(db))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let db = Database::open_in_memory(AUDIT_SCHEMA).map_err(audit_error)?;
        Ok(Self::with_database(db))
    }

    fn with_database(db: Database) -> Self {
        Self {
            db,
            last_stamp: Mutex::new(i64::MIN),
        }
    }

    /// Total number of entries
    pub fn count(&self) -> Result<u64, StorageError> {
        let count = (|| -> Result<i64, DatabaseError> {
            let conn = self.db.get_conn()?;
            Ok(conn.query_row("SELECT COUNT(*) FROM client_log", [], |row| row.get(0))?)
        })()
        .map_err(audit_error)?;
        Ok(count.max(0) as u64)
    }

    fn insert_row(&self, event: &str, timestamp_millis: i64) -> Result<i64, DatabaseError> {
        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT INTO client_log (event, timestampMillis) VALUES (?1, ?2)",
            params![event, timestamp_millis],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn select_recent(&self, limit: usize) -> Result<Vec<AuditEntry>, DatabaseError> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, event, timestampMillis FROM client_log ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    event: row.get(1)?,
                    timestamp_millis: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl AuditLog for SqliteAuditLog {
    fn append(&self, event: &str) -> Result<AuditEntry, StorageError> {
        // Held across the insert so id order and timestamp order agree
        let mut last_stamp = self.last_stamp.lock();
        let timestamp_millis = Utc::now().timestamp_millis().max(*last_stamp);

        let id = self.insert_row(event, timestamp_millis).map_err(audit_error)?;
        *last_stamp = timestamp_millis;

        Ok(AuditEntry {
            id,
            event: event.to_string(),
            timestamp_millis,
        })
    }

    fn try_recent(&self, limit: usize) -> Result<Vec<AuditEntry>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.select_recent(limit).map_err(audit_error)
    }
}

fn audit_error(err: DatabaseError) -> StorageError {
    err.for_store(StoreKind::Audit)
}
