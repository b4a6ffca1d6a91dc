//! SQLite-backed record store for conversion jobs.
//!
//! One `conversions` table holds every upload and the outcome of its latest
//! conversion. Several docshift processes may share the same database file;
//! claims are arbitrated by SQLite itself (see [`job_repo::claim_for_conversion`]).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod error;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

/// How long a writer waits for another process's claim or terminal write
/// before SQLite reports `SQLITE_BUSY`. Those transactions touch a single
/// row, so contention is short-lived.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the conversion record store.
///
/// Clones share one connection; the conversion pipeline itself runs outside
/// the lock, so the mutex is held only for the duration of a statement or a
/// claim transaction.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the record store at `path`, creating missing parent
    /// directories, and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        // WAL lets `history` and `download` readers proceed while a claim is
        // being written by another process.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let db = Self::prepare(conn)?;

        tracing::info!(
            database = %crate::sanitize::redact_path(path),
            "Record store opened"
        );
        Ok(db)
    }

    /// A private, empty record store. Nothing survives the handle.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with exclusive use of the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// `~/.docshift/docshift.db`, next to the default storage root.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".docshift").join("docshift.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_upload(db: &Database, stored_as: &str) {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversions (original_filename, original_path, format_from,
                 original_size, owner_token, created_at, updated_at)
                 VALUES ('a.png', ?1, 'png', 1, 'o', 't', 't')",
                [stored_as],
            )?;
            Ok(())
        })
        .unwrap();
    }

    fn count(db: &Database) -> u32 {
        db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM conversions", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_in_memory_store_is_migrated_and_empty() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_file_store_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("docshift.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());

        db.with_conn(|conn| {
            let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
            assert_eq!(mode.to_lowercase(), "wal");
            let synchronous: i64 = conn.query_row("PRAGMA synchronous", [], |r| r.get(0))?;
            assert_eq!(synchronous, 1);
            let busy: i64 = conn.query_row("PRAGMA busy_timeout", [], |r| r.get(0))?;
            assert_eq!(busy, 5000);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_second_handle_sees_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docshift.db");

        let first = Database::open(&path).unwrap();
        insert_upload(&first, "uploads/x.png");

        // A separate connection stands in for another docshift process.
        let second = Database::open(&path).unwrap();
        assert_eq!(count(&second), 1);
        drop(first);
        drop(second);

        assert_eq!(count(&Database::open(&path).unwrap()), 1);
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path().unwrap();
        assert!(path.ends_with(".docshift/docshift.db"));
    }

    #[test]
    fn test_clones_share_connection() {
        let db = Database::open_in_memory().unwrap();
        let clone = db.clone();
        insert_upload(&db, "uploads/y.png");
        assert_eq!(count(&clone), 1);
    }
}
