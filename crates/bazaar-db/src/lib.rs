pub mod blocks;
pub mod cursors;
pub mod directory;
pub mod error;
pub mod friends;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod pair;
pub mod rooms;

use anyhow::Result;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

pub use error::{Conflict, StoreError, StoreResult};
pub use pair::canonical_pair;

const DEFAULT_READER_POOL_SIZE: usize = 4;

/// Concurrent writers wait this long on SQLite's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite store with a reader/writer split.
///
/// Every write goes through the single writer connection, so write
/// transactions are serialized in-process. Readers are read-only WAL
/// connections handed out round-robin.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_readers(path, DEFAULT_READER_POOL_SIZE)
    }

    pub fn open_with_readers(path: &Path, reader_pool_size: usize) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&writer)?;

        let pool = reader_pool_size.max(1);
        let mut readers = Vec::with_capacity(pool);
        for _ in 0..pool {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            pool
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Run a read-only closure on one of the reader connections.
    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| StoreError::Internal(format!("reader lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a closure on the writer connection outside of an explicit transaction.
    /// Suitable for single-statement writes.
    pub fn with_conn_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| StoreError::Internal(format!("writer lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a closure inside a `BEGIN IMMEDIATE` transaction on the writer.
    /// The write lock is taken up front, so rows read inside the closure cannot
    /// change underneath it. Commits on `Ok`, rolls back on `Err`.
    pub fn with_tx<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| StoreError::Internal(format!("writer lock poisoned: {}", e)))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Milliseconds since the Unix epoch; every timestamp column uses this unit.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Opaque ids from the identity and listing services must be non-blank.
pub(crate) fn require_id<'a>(value: &'a str, field: &str) -> StoreResult<&'a str> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(format!("{} is required", field)));
    }
    Ok(value)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Database;
    use crate::directory::{NewProduct, NewUser};
    use tempfile::TempDir;

    /// Temporary database; keep the `TempDir` alive for the test's duration.
    pub fn open_temp() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("bazaar.db")).unwrap();
        (dir, db)
    }

    pub fn seed_users(db: &Database, ids: &[&str]) {
        for id in ids {
            db.upsert_user(&NewUser {
                id: id.to_string(),
                email: format!("{}@campus.edu", id),
                display_name: id.to_uppercase(),
            })
            .unwrap();
        }
    }

    pub fn seed_product(db: &Database, id: &str, owner: &str) {
        db.upsert_product(&NewProduct {
            id: id.to_string(),
            owner_id: owner.to_string(),
            title: format!("listing {}", id),
        })
        .unwrap();
    }
}
