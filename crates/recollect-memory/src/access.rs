// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-memory usage counters.
//!
//! Updates from concurrent context assemblies may land in any order: the
//! count only ever grows and `last_accessed_at` is last-write-wins. With an
//! [`AccessStore`] attached the counters outlive the process.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use recollect_core::RecollectError;
use recollect_storage::Database;
use recollect_storage::database::{format_timestamp, map_tr_err, parse_timestamp};
use rusqlite::params;

use crate::types::AccessMetadata;

/// Durable home of access counters.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Stored aggregates for the given ids. Unknown ids are skipped.
    async fn load(&self, memory_ids: &[String]) -> Result<Vec<AccessMetadata>, RecollectError>;

    /// Adds one access at `at` to each id.
    async fn record(&self, memory_ids: &[String], at: DateTime<Utc>)
    -> Result<(), RecollectError>;
}

/// [`AccessStore`] over the `memory_access` table.
#[derive(Clone)]
pub struct SqliteAccessStore {
    db: Database,
}

impl SqliteAccessStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccessStore for SqliteAccessStore {
    async fn load(&self, memory_ids: &[String]) -> Result<Vec<AccessMetadata>, RecollectError> {
        let memory_ids = memory_ids.to_vec();
        self.db
            .connection()
            .call(move |conn| -> Result<Vec<AccessMetadata>, rusqlite::Error> {
                let mut stmt = conn.prepare_cached(
                    "SELECT memory_id, last_accessed_at, access_count
                     FROM memory_access WHERE memory_id = ?1",
                )?;
                let mut found = Vec::new();
                for id in &memory_ids {
                    let mut rows = stmt.query(params![id])?;
                    if let Some(row) = rows.next()? {
                        let last_accessed_at: String = row.get(1)?;
                        let access_count: i64 = row.get(2)?;
                        found.push(AccessMetadata {
                            memory_id: row.get(0)?,
                            last_accessed_at: Some(parse_timestamp(1, &last_accessed_at)?),
                            access_count: u64::try_from(access_count).unwrap_or(0),
                        });
                    }
                }
                Ok(found)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn record(
        &self,
        memory_ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), RecollectError> {
        let memory_ids = memory_ids.to_vec();
        let at = format_timestamp(&at);
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO memory_access (memory_id, last_accessed_at, access_count)
                         VALUES (?1, ?2, 1)
                         ON CONFLICT(memory_id) DO UPDATE SET
                            access_count = access_count + 1,
                            last_accessed_at = excluded.last_accessed_at",
                    )?;
                    for id in &memory_ids {
                        stmt.execute(params![id, at])?;
                    }
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)
    }
}

#[derive(Default)]
pub struct AccessTracker {
    entries: DashMap<String, AccessMetadata>,
    store: Option<Arc<dyn AccessStore>>,
}

impl fmt::Debug for AccessTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTracker")
            .field("entries", &self.entries.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl AccessTracker {
    /// Process-local counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters backed by `store`.
    pub fn with_store(store: Arc<dyn AccessStore>) -> Self {
        Self {
            entries: DashMap::new(),
            store: Some(store),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Replace the local view of `memory_ids` with the stored aggregates.
    /// No-op without a store.
    pub async fn load(&self, memory_ids: &[String]) -> Result<(), RecollectError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        for meta in store.load(memory_ids).await? {
            self.entries.insert(meta.memory_id.clone(), meta);
        }
        Ok(())
    }

    /// Record locally, then in the store if there is one.
    pub async fn persist(
        &self,
        memory_ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), RecollectError> {
        self.record_many(memory_ids.iter().map(String::as_str), at);
        match &self.store {
            Some(store) if !memory_ids.is_empty() => store.record(memory_ids, at).await,
            _ => Ok(()),
        }
    }

    /// Record that `memory_id` was surfaced at `at`.
    pub fn record(&self, memory_id: &str, at: DateTime<Utc>) {
        let mut entry = self
            .entries
            .entry(memory_id.to_string())
            .or_insert_with(|| AccessMetadata::never(memory_id));
        entry.access_count = entry.access_count.saturating_add(1);
        entry.last_accessed_at = Some(at);
    }

    pub fn record_many<'a>(&self, memory_ids: impl IntoIterator<Item = &'a str>, at: DateTime<Utc>) {
        for id in memory_ids {
            self.record(id, at);
        }
    }

    /// Current aggregate, or a zeroed entry for a never-seen memory.
    pub fn get(&self, memory_id: &str) -> AccessMetadata {
        self.entries
            .get(memory_id)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| AccessMetadata::never(memory_id))
    }

    /// A copy of every aggregate, sorted by memory id.
    pub fn snapshot(&self) -> Vec<AccessMetadata> {
        let mut all: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.memory_id.cmp(&b.memory_id));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
