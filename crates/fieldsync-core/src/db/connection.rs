//! Database connection management

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::migrations;

/// How long a writer waits for the database write lock before giving up
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the authoritative `SQLite` database.
///
/// Holds no connection of its own: every unit of work opens a fresh
/// connection, so any number of handles (in one process or many) can share
/// the file. All cross-request synchronization is left to `SQLite`.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// Open the database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database = Self {
            path,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        let mut conn = database.connect()?;
        // WAL is persistent, so setting it once per file is enough
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "Configured journal mode");
        migrations::run(&mut conn)?;
        tracing::debug!("Opened database at {}", database.path.display());
        Ok(database)
    }

    /// Override how long writers wait on a locked database
    #[must_use]
    pub const fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Filesystem path of the database
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version the database is currently at
    pub fn schema_version(&self) -> Result<i32> {
        self.read(migrations::get_version)
    }

    /// Open a new connection configured for this database
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    /// Run `f` as one atomic unit of work.
    ///
    /// The transaction is started with `BEGIN IMMEDIATE`, which takes the
    /// database write lock up front so that two units of work can never both
    /// read the same entity version and then both write. The transaction
    /// commits when `f` returns `Ok` and rolls back when it returns `Err`.
    pub fn write<T, E>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
    {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(Error::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(Error::from)?;
        Ok(value)
    }

    /// Run a read-only closure on a fresh connection
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.connect()?;
        f(&conn)
    }
}
