// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All reads and writes are serialized through tokio-rusqlite's single
//! background thread. `Database` wraps exactly one connection; query modules
//! accept `&Database` and go through `connection().call()`.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use keylock_config::model::StorageConfig;
use keylock_core::KeylockError;
use tracing::debug;

use crate::migrations;

/// Handle to the vault's SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (creating if needed) the database at `path` with WAL enabled and
    /// run pending migrations.
    pub async fn open(path: &str) -> Result<Self, KeylockError> {
        Self::open_with(path, true).await
    }

    /// Open the database described by a storage config section.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, KeylockError> {
        Self::open_with(&config.database_path, config.wal_mode).await
    }

    async fn open_with(path: &str, wal_mode: bool) -> Result<Self, KeylockError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(KeylockError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(KeylockError::storage)?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(Duration::from_secs(5))?;
            if wal_mode {
                let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get(0)
                })?;
                debug!(journal_mode = %mode, "journal mode set");
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), KeylockError> { migrations::run_migrations(conn) })
            .await
            .map_err(|e| KeylockError::Storage {
                source: format!("migration failed: {e}").into(),
            })?;

        debug!(path = %path, "vault database opened");
        Ok(Self { conn })
    }

    /// The underlying single-writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), KeylockError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)?;
        debug!("vault database closed");
        Ok(())
    }
}

/// Convert tokio-rusqlite errors to [`KeylockError::Storage`].
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> KeylockError {
    KeylockError::Storage {
        source: format!("vault database error: {e}").into(),
    }
}
