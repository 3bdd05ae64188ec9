//! SQLite plumbing shared by the local run and model registries.
//!
//! Every handle owns one connection. Several handles, in one process or
//! many, may open the same file: the database runs in WAL mode, writers
//! wait up to the busy timeout for each other, and every mutation is a
//! single `BEGIN IMMEDIATE` transaction that either commits whole or
//! leaves nothing behind.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use tracing::debug;

use crate::{Error, Result};

/// How long a writer waits for another writer before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One connection to a registry database.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    label: &'static str,
}

impl Database {
    /// Open (or create) the database file at `path` and apply `schema`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the file
    /// cannot be opened, or the schema cannot be applied.
    pub fn open(
        path: &Path,
        busy_timeout: Duration,
        schema: &str,
        label: &'static str,
    ) -> Result<Self> {
        if path.is_dir() {
            return Err(Error::Config(format!(
                "{label} path {} is a directory",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        debug!(label, path = %path.display(), "opened database");
        Self::init(conn, schema, label)
    }

    /// A private database that disappears with the handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory(schema: &str, label: &'static str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn, schema, label)
    }

    fn init(mut conn: Connection, schema: &str, label: &'static str) -> Result<Self> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(schema)?;
        tx.commit()?;
        Ok(Self {
            conn: Mutex::new(conn),
            label,
        })
    }

    /// Run `f` against a consistent read snapshot.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a database error.
    pub fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        f(&tx)
    }

    /// Run `f` inside a write transaction; commit only if it succeeds.
    ///
    /// The write lock is taken up front, so values computed from the
    /// database inside `f` (next version, next sequence) cannot be handed
    /// out twice, even across processes.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, `Database` if the lock is not granted
    /// within the busy timeout, or the commit error.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned(self.label))
    }
}

/// Run a blocking registry call on the blocking thread pool.
///
/// Registry calls hit the disk and may wait on the busy timeout, so async
/// callers route them through here instead of stalling a runtime worker.
///
/// # Errors
///
/// Returns the error from `f`, or `Other` if the blocking task panicked.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("registry task failed: {e}")))?
}
