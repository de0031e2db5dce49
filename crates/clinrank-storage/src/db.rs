//! SQLite handle for the metric sidecar.
//!
//! One connection behind a Mutex. File databases run in WAL mode with a busy
//! timeout so a second process reading the sidecar waits instead of failing.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use clinrank_core::error::ClinrankError;

use crate::migrations;

fn sqlite_err(context: &'static str) -> impl Fn(rusqlite::Error) -> ClinrankError {
    move |e| ClinrankError::Storage(format!("{}: {}", context, e))
}

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the sidecar at `path` and bring its schema up to date.
    ///
    /// `busy_timeout` bounds how long a write waits on another connection's lock.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, ClinrankError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(sqlite_err("Failed to open database"))?;
        conn.busy_timeout(busy_timeout)
            .map_err(sqlite_err("Failed to set busy timeout"))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA cache_size = -65536;")
            .map_err(sqlite_err("Failed to set pragmas"))?;

        let db = Self::from_connection(conn)?;
        info!(
            path = %path.display(),
            schema_version = db.schema_version()?,
            "Sidecar database opened"
        );
        Ok(db)
    }

    /// Private in-memory database, used by tests.
    pub fn in_memory() -> Result<Self, ClinrankError> {
        let conn =
            Connection::open_in_memory().map_err(sqlite_err("Failed to open in-memory db"))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, ClinrankError> {
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")
            .map_err(sqlite_err("Failed to set pragmas"))?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Applied schema version.
    pub fn schema_version(&self) -> Result<i64, ClinrankError> {
        self.with_conn(migrations::current_version)
    }

    /// Run `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ClinrankError>
    where
        F: FnOnce(&Connection) -> Result<T, ClinrankError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ClinrankError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
