use std::path::PathBuf;
use thiserror::Error;

/// Failures of the conversion record store.
///
/// None of these messages are shown to end users; the job layer maps them
/// to a generic internal error.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The directory for the database file could not be created.
    #[error("Cannot prepare database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A `conversions` row holds a status, format or size docshift cannot
    /// represent, usually after a manual edit.
    #[error("Conversion {id} has an invalid stored value: {reason}")]
    CorruptRow { id: i64, reason: String },

    /// Another thread panicked while holding the connection.
    #[error("Record store lock poisoned")]
    LockPoisoned,
}
