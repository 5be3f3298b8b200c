use sphinx_shared::ValidationError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A persisted row violates a store invariant (e.g. an unknown record
    /// kind). Fatal: never retried.
    #[error("Store integrity error: {0}")]
    Integrity(String),

    /// A persisted identifier failed validation on the way out.
    #[error("Invalid stored value: {0}")]
    Validation(#[from] ValidationError),

    /// Another thread panicked while holding the connection.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether this error means the store itself is broken.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Integrity(_) | StoreError::LockPoisoned)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
