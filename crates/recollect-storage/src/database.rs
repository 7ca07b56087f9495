// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All access is serialized through tokio-rusqlite's single background thread.
//! Clone the [`Database`] handle rather than opening a second connection.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use recollect_core::RecollectError;
use tracing::debug;

use crate::migrations::run_migrations;

/// Shared handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database file, enables WAL, and applies migrations.
    pub async fn open(path: &str) -> Result<Self, RecollectError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(RecollectError::storage)?;
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(RecollectError::storage)?;
        let db = Self { conn };
        db.initialize(true).await?;
        debug!(path, "database opened");
        Ok(db)
    }

    /// Opens a private in-memory database with the schema applied.
    pub async fn open_in_memory() -> Result<Self, RecollectError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(RecollectError::storage)?;
        let db = Self { conn };
        db.initialize(false).await?;
        Ok(db)
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    async fn initialize(&self, wal: bool) -> Result<(), RecollectError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                    conn.pragma_update(None, "synchronous", "NORMAL")?;
                }
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| run_migrations(conn))
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoints the WAL so the database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), RecollectError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Maps a tokio-rusqlite failure into a storage error.
pub fn map_tr_err<E>(e: tokio_rusqlite::Error<E>) -> RecollectError
where
    E: std::error::Error + Send + Sync + 'static,
{
    RecollectError::Storage {
        source: Box::new(e),
    }
}

/// Timestamps are stored as RFC 3339 UTC with millisecond precision so that
/// lexical order matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
