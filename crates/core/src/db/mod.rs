//! SQLite store for documentation folders, tracked repositories, webhook
//! events and per-file sync records.

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::errors::DatabaseError;

/// Pragmas applied to every connection. Foreign keys are required for the
/// folder -> repository -> event -> file cascade.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

/// Shared handle to the docsync store.
///
/// A single connection sits behind a `Mutex`; the webhook pipeline and the
/// HTTP handlers all go through [`Database::conn`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the store at `path`, creating the file if needed. File-backed
    /// stores run in WAL mode so readers don't block an in-progress sync.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening docsync store");

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn)
    }

    /// Transient store, used by tests.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply pending migrations.
    pub fn initialize(&self) -> Result<(), DatabaseError> {
        let conn = self.conn();
        schema::run_migrations(&conn)?;
        debug!(
            version = schema::CURRENT_VERSION,
            "docsync store schema ready"
        );
        Ok(())
    }

    /// Lock the connection. A poisoned lock is taken over; SQLite itself
    /// rolls back whatever the panicking holder left open.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("store lock poisoned by a panicked task, continuing");
                poisoned.into_inner()
            }
        }
    }

    /// Run `work` in a transaction; any error rolls everything back.
    pub fn transaction<F, T>(&self, work: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder_count(db: &Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM doc_folders", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_file_store_is_created_and_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docsync.db");

        let db = Database::new(&path).unwrap();
        db.initialize().unwrap();

        assert!(path.exists());
        assert_eq!(folder_count(&db), 0);
    }

    #[test]
    fn test_initialize_twice_is_harmless() {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();
    }

    #[test]
    fn test_failed_transaction_leaves_no_rows() {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();

        let result: Result<(), DatabaseError> = db.transaction(|conn| {
            conn.execute(
                "INSERT INTO doc_folders (owner, folder_path, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params!["alice", "/docs/rollback", "2025-01-01T00:00:00Z"],
            )?;
            Err(DatabaseError::NotFound {
                entity: "doc folder".into(),
                id: "rollback".into(),
            })
        });

        assert!(result.is_err());
        assert_eq!(folder_count(&db), 0);
    }
}
