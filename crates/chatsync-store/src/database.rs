//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees
//! that migrations have run before any other operation.  The connection is
//! kept behind a mutex so the handle is `Sync`; SQLite's own single-writer
//! locking serializes conflicting writes beneath that.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

/// Row counts per table, for the `status` operation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreStats {
    pub messages: u64,
    pub chats: u64,
    pub contacts: u64,
    pub reactions: u64,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data
    /// directory:
    /// - Linux:   `~/.local/share/chatsync/messages.db`
    /// - macOS:   `~/Library/Application Support/com.chatsync.chatsync/messages.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\chatsync\chatsync\data\messages.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "chatsync", "chatsync").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("messages.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// This is useful for tests and for embedding the store inside custom
    /// directory layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Run schema migrations.  Any failure here is fatal.
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Lock and return the underlying connection.
    ///
    /// Callers should prefer the typed helpers, but direct access is
    /// occasionally needed for ad-hoc queries.  A poisoned lock is
    /// recovered rather than propagated: SQLite state is consistent even
    /// if a previous holder panicked mid-call.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Row counts for every table.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn();
        let count = |table: &str| -> Result<u64> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(n as u64)
        };
        Ok(StoreStats {
            messages: count("messages")?,
            chats: count("chats")?,
            contacts: count("contacts")?,
            reactions: count("reactions")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert_eq!(db.path(), Some(path.as_path()));

        let stats = db.stats().unwrap();
        assert_eq!(stats.messages, 0);
        assert_eq!(stats.chats, 0);
    }

    #[test]
    fn reopen_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        drop(Database::open_at(&path).unwrap());
        // Second open re-runs migrations; all of them must be idempotent.
        Database::open_at(&path).expect("reopen should succeed");
    }
}
