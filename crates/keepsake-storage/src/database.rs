// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use keepsake_core::KeepsakeError;
use tracing::debug;

use crate::migrations;

/// Convert a tokio-rusqlite error into KeepsakeError::Storage.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> KeepsakeError {
    KeepsakeError::Storage {
        source: Box::new(e),
    }
}

fn storage_err(e: rusqlite::Error) -> KeepsakeError {
    KeepsakeError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the Keepsake SQLite database.
///
/// Cloning the inner connection is cheap; every clone shares the same
/// background thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs and run migrations.
    ///
    /// Parent directories are created when missing.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, KeepsakeError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| KeepsakeError::Storage {
                source: Box::new(e),
            })?;
        }

        // Schema setup runs on a short-lived synchronous connection so the
        // async connection only ever sees a migrated database.
        {
            let mut conn = rusqlite::Connection::open(path).map_err(storage_err)?;
            apply_pragmas(&conn, wal_mode).map_err(storage_err)?;
            migrations::run_migrations(&mut conn)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| KeepsakeError::Storage {
                source: Box::new(e),
            })?;
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            apply_pragmas(conn, wal_mode)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    /// Returns the shared async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Filesystem path the database was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Liveness check: runs `SELECT 1`.
    pub async fn ping(&self) -> Result<(), KeepsakeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL so the main file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), KeepsakeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

fn apply_pragmas(conn: &rusqlite::Connection, wal_mode: bool) -> Result<(), rusqlite::Error> {
    if wal_mode {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(mode, "journal mode set");
    }
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}
