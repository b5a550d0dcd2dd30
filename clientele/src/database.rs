//! SQLite database layer shared by the client store and the audit log
//!
//! Each store owns its own database file and schema; this module only knows
//! how to open a pooled connection set and apply a schema batch.
//! Uses r2d2 connection pooling to allow concurrent reads without mutex blocking.

use crate::interface::{StorageError, StoreKind};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl DatabaseError {
    /// Tag this error with the store it came from
    pub fn for_store(self, store: StoreKind) -> StorageError {
        StorageError::new(store, self.to_string())
    }
}

/// SQLite `synchronous` level applied to every pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synchronous {
    /// Commits may roll back on power loss; WAL keeps the file consistent
    Normal,
    /// Every commit is fsynced before it returns
    Full,
}

impl Synchronous {
    fn pragma(self) -> &'static str {
        match self {
            Synchronous::Normal => "NORMAL",
            Synchronous::Full => "FULL",
        }
    }
}

/// Thread-safe database wrapper using connection pooling
///
/// WAL mode enables readers to proceed without blocking each other.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path and apply `schema`
    pub fn open<P: AsRef<Path>>(
        path: P,
        schema: &str,
        max_size: u32,
        synchronous: Synchronous,
    ) -> DatabaseResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(move |conn| {
                conn.execute_batch(&format!(
                    "PRAGMA journal_mode=WAL;
                     PRAGMA synchronous={};
                     PRAGMA foreign_keys=ON;",
                    synchronous.pragma()
                ))?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema(schema)?;
        Ok(db)
    }

    /// Open an in-memory database and apply `schema`
    pub fn open_in_memory(schema: &str) -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| {
                conn.execute_batch("PRAGMA foreign_keys=ON;")?;
                Ok(())
            });

        // In-memory needs single connection to maintain state
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema(schema)?;
        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self, schema: &str) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(schema)?;
        Ok(())
    }
}
