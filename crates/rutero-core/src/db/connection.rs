//! Database connection management

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;

use crate::error::Result;

use super::config_repository::ConfigRepository;
use super::migrations;

/// Handle to the local SQLite store.
///
/// Constructed once at process start and passed to whoever needs it; there
/// is no global singleton. The inner connection is guarded by a mutex so
/// the async sync pipeline can interleave remote calls with short,
/// exclusive bursts of local work.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the store at the given path and bring the schema up
    /// to date. Idempotent: safe to call against an already-initialized
    /// file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        migrations::run(&conn)?;
        ConfigRepository::new(&conn).seed_display_fields()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection for a burst of local work.
    ///
    /// Callers must not hold the guard across await points.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Destructive: drop and recreate the entire store.
    ///
    /// Clears the sync watermark along with everything else, so the next
    /// sync behaves as a first-ever (full) sync.
    pub fn reset(&self) -> Result<()> {
        let conn = self.lock();
        migrations::drop_all(&conn)?;
        migrations::run(&conn)?;
        ConfigRepository::new(&conn).seed_display_fields()?;
        tracing::info!("Local store reset to empty schema");
        Ok(())
    }
}

fn configure(conn: &Connection) -> Result<()> {
    // WAL and relaxed fsync for interactive use; foreign keys must be on
    // for the order/item cascades.
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL").ok();
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}
