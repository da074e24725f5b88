//! SQLite persistence: article upsert with content-hash versioning, evidence
//! snapshots, run/fetch logging, merge decisions, author profiles, and
//! precise per-run rollback.
//!
//! The connection is exclusive per operation and every multi-step write runs
//! in one transaction with foreign keys enforced.

mod articles;
mod error;
mod profiles;
mod rollback;
mod runs;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

pub use error::{Result, StorageError};
pub use rollback::RollbackSummary;

const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Handle to one byline database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating and migrating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| StorageError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an existing database without applying the schema. Fails later at
    /// query time if the schema is missing.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(INIT_SQL)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store connection is never poisoned")
    }
}

pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod test {
    use super::Store;

    #[test]
    fn schema_bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("byline.db");
        drop(Store::open(&path).unwrap());
        // Re-opening applies CREATE IF NOT EXISTS against existing tables.
        drop(Store::open(&path).unwrap());
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let result = conn.execute(
            "INSERT INTO accounts (id, author_id, source, source_identifier, created_at)
             VALUES ('a1', 'missing-author', 'web', 'jane@example.com', '2024-01-01')",
            [],
        );
        assert!(result.is_err());
    }
}
