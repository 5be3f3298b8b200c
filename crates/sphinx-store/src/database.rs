//! Database connection management.
//!
//! The [`Database`] struct owns a single [`rusqlite::Connection`] behind a
//! mutex and guarantees that migrations are run before any other operation.
//!
//! Writes go through [`Database::write`], which wraps the closure in one
//! transaction. Writes that change dashboard rows bump the dashboard version
//! after the commit. Readers take the same lock, so they see either the state
//! before a batch or the state after it, never something in between.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::{Connection, Transaction};

use crate::error::{Result, StoreError};
use crate::migrations;

/// Shared handle to the local store.
pub struct Database {
    conn: Mutex<Connection>,
    /// Incremented once per committed write that changed dashboard rows.
    /// Only modified with `conn` held.
    dashboard_version: AtomicU64,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/sphinx/sphinx.db`
    /// - macOS:   `~/Library/Application Support/chat.sphinx.sphinx/sphinx.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\sphinx\sphinx\data\sphinx.db`
    pub fn new() -> Result<Self> {
        let data_dir = default_data_dir()?;
        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join("sphinx.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database. Used by tests and ephemeral tools.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            dashboard_version: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Run a read-only closure against the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Like [`with_conn`](Self::with_conn), but also returns the dashboard
    /// version the closure observed.
    pub fn read_versioned<F, T>(&self, f: F) -> Result<(u64, T)>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        let version = self.dashboard_version.load(Ordering::Acquire);
        let value = f(&conn)?;
        Ok((version, value))
    }

    /// Run `f` inside a single transaction.
    ///
    /// `f` returns its value and whether it changed any dashboard row. Only
    /// then is the dashboard version bumped, so dashboard cursors outlive
    /// commits that touch feeds or older messages alone. If `f` fails the
    /// transaction rolls back and the version is unchanged.
    ///
    /// Returns the dashboard version after the commit alongside the value.
    pub fn write<F, T>(&self, f: F) -> Result<(u64, T)>
    where
        F: FnOnce(&Transaction<'_>) -> Result<(T, bool)>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let (value, dashboard_changed) = f(&tx)?;
        tx.commit()?;
        let version = if dashboard_changed {
            self.dashboard_version.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.dashboard_version.load(Ordering::Acquire)
        };
        Ok((version, value))
    }

    /// Number of committed writes that changed dashboard rows.
    pub fn dashboard_version(&self) -> u64 {
        self.dashboard_version.load(Ordering::Acquire)
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        let conn = self.lock().ok()?;
        conn.path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

/// Platform data directory used by [`Database::new`].
pub fn default_data_dir() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("chat", "sphinx", "sphinx").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().to_path_buf())
}
