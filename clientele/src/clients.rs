//! Durable client store with a live listing feed
//!
//! The store is the only owner of client identity. Ids come from SQLite
//! `AUTOINCREMENT`, so they are never reused, even after `clear_all`.
//!
//! Live listing: every committed mutation publishes exactly one new snapshot
//! on a `watch` channel. Writes are serialized so publication order matches
//! commit order, and nothing is published for a write that did not commit.

use crate::database::{Database, DatabaseError, Synchronous};
use crate::interface::{ClientRecord, Listing, StorageError, StoreKind};
use crate::models::NewClient;
use parking_lot::Mutex;
use rusqlite::params;
use std::path::Path;
use tokio::sync::watch;
use tracing::{debug, error};

const CLIENTS_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS clients (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL
    );
"#;

/// Authoritative store of client records
pub trait ClientStore: Send + Sync {
    /// Persist a client and return it with its assigned id.
    /// Returns only after the write is durable.
    fn insert(&self, client: &NewClient) -> Result<ClientRecord, StorageError>;

    /// Remove every client record
    fn clear_all(&self) -> Result<(), StorageError>;

    /// Current full listing, newest id first
    fn listing(&self) -> Listing;

    /// Live listing feed. The receiver's current value is the listing at
    /// subscription time; each later mutation produces one change.
    fn subscribe(&self) -> watch::Receiver<Listing>;
}

/// SQLite-backed client store
pub struct SqliteClientStore {
    db: Database,
    write_lock: Mutex<()>,
    listing_tx: watch::Sender<Listing>,
}

impl SqliteClientStore {
    /// Open or create the client database at `path`
    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self, StorageError> {
        let db = Database::open(path, CLIENTS_SCHEMA, pool_size, Synchronous::Full)
            .map_err(clients_error)?;
        Self::with_database(db)
    }

    /// Open a client store backed by an in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let db = Database::open_in_memory(CLIENTS_SCHEMA).map_err(clients_error)?;
        Self::with_database(db)
    }

    fn with_database(db: Database) -> Result<Self, StorageError> {
        let existing = Self::load_listing(&db).map_err(clients_error)?;
        debug!(count = existing.len(), "client store opened");
        let (listing_tx, _) = watch::channel(Listing::from(existing));
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            listing_tx,
        })
    }

    fn load_listing(db: &Database) -> Result<Vec<ClientRecord>, DatabaseError> {
        let conn = db.get_conn()?;
        let mut stmt = conn.prepare("SELECT id, name, email, phone FROM clients ORDER BY id DESC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ClientRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    phone: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_row(&self, client: &NewClient) -> Result<i64, DatabaseError> {
        let conn = self.db.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO clients (name, email, phone) VALUES (?1, ?2, ?3)",
            params![client.name, client.email, client.phone],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    fn delete_rows(&self) -> Result<usize, DatabaseError> {
        let conn = self.db.get_conn()?;
        Ok(conn.execute("DELETE FROM clients", [])?)
    }

    /// Number of records in the current listing
    pub fn count(&self) -> usize {
        self.listing_tx.borrow().len()
    }
}

impl ClientStore for SqliteClientStore {
    fn insert(&self, client: &NewClient) -> Result<ClientRecord, StorageError> {
        let _write = self.write_lock.lock();

        let id = self.insert_row(client).map_err(|err| {
            error!(error = %err, "client insert failed");
            clients_error(err)
        })?;
        let record = client.clone().into_record(id);

        self.listing_tx.send_modify(|listing| {
            *listing = std::iter::once(record.clone())
                .chain(listing.iter().cloned())
                .collect();
        });
        debug!(client_id = id, "client inserted");

        Ok(record)
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        let _write = self.write_lock.lock();

        let removed = self.delete_rows().map_err(|err| {
            error!(error = %err, "client clear failed");
            clients_error(err)
        })?;

        self.listing_tx.send_replace(Listing::from(Vec::new()));
        debug!(removed, "client store cleared");
        Ok(())
    }

    fn listing(&self) -> Listing {
        self.listing_tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Listing> {
        self.listing_tx.subscribe()
    }
}

fn clients_error(err: DatabaseError) -> StorageError {
    err.for_store(StoreKind::Clients)
}
