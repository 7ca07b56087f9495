// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed vector index with embeddings stored as BLOBs.
//!
//! Similarity search is a brute-force scan in Rust over the rows that pass
//! the SQL-side filters.

use std::str::FromStr;

use async_trait::async_trait;
use recollect_core::{ConfidenceLevel, MemoryCategory, RecollectError};
use recollect_storage::Database;
use recollect_storage::database::{format_timestamp, map_tr_err, parse_timestamp};
use rusqlite::OptionalExtension;
use tracing::warn;

use crate::index::{VectorIndex, rank_candidates};
use crate::types::{
    MemoryRecord, RetrievalFilters, RetrievalResult, blob_to_vec, vec_to_blob,
};

const SELECT_COLUMNS: &str = "SELECT id, text, category, confidence, source_conversation_id, created_at, embedding FROM memories";

/// Persistent [`VectorIndex`] over the `memories` table.
#[derive(Clone)]
pub struct SqliteVectorIndex {
    db: Database,
}

impl SqliteVectorIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn text_conversion_error(idx: usize, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        detail.into(),
    )
}

/// Decode one row. The embedding is `None` when the BLOB is corrupt.
fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<(MemoryRecord, Option<Vec<f32>>), rusqlite::Error> {
    let category: String = row.get(2)?;
    let confidence: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let blob: Vec<u8> = row.get(6)?;
    let record = MemoryRecord {
        id: row.get(0)?,
        text: row.get(1)?,
        category: MemoryCategory::from_str(&category)
            .map_err(|_| text_conversion_error(2, format!("unknown category `{category}`")))?,
        confidence_level: ConfidenceLevel::from_str(&confidence)
            .map_err(|_| text_conversion_error(3, format!("unknown confidence `{confidence}`")))?,
        source_conversation_id: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
    };
    Ok((record, blob_to_vec(&blob)))
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, record: MemoryRecord, vector: Vec<f32>) -> Result<(), RecollectError> {
        let blob = vec_to_blob(&vector);
        let dimensions = vector.len() as i64;
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO memories (id, text, category, confidence, source_conversation_id, created_at, dimensions, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                        text = excluded.text,
                        category = excluded.category,
                        confidence = excluded.confidence,
                        dimensions = excluded.dimensions,
                        embedding = excluded.embedding",
                    rusqlite::params![
                        record.id,
                        record.text,
                        record.category.to_string(),
                        record.confidence_level.to_string(),
                        record.source_conversation_id,
                        format_timestamp(&record.created_at),
                        dimensions,
                        blob,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: &RetrievalFilters,
    ) -> Result<Vec<RetrievalResult>, RecollectError> {
        if top_k == 0 || vector.is_empty() {
            return Ok(Vec::new());
        }
        let dimensions = vector.len() as i64;
        let source = filters.source_conversation_id.clone();
        let rows = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<(MemoryRecord, Option<Vec<f32>>)>, rusqlite::Error> {
                let sql = format!(
                    "{SELECT_COLUMNS} WHERE dimensions = ?1 AND (?2 IS NULL OR source_conversation_id = ?2)"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params![dimensions, source], row_to_entry)?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)?;

        let candidates = rows.into_iter().filter_map(|(record, embedding)| match embedding {
            Some(embedding) => Some((record, embedding)),
            None => {
                warn!(memory_id = %record.id, "skipping memory with corrupt embedding");
                None
            }
        });
        Ok(rank_candidates(vector, top_k, filters, candidates))
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, RecollectError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<MemoryRecord>, rusqlite::Error> {
                let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
                let entry = conn
                    .query_row(&sql, rusqlite::params![id], row_to_entry)
                    .optional()?;
                Ok(entry.map(|(record, _)| record))
            })
            .await
            .map_err(map_tr_err)
    }

    async fn count(&self) -> Result<usize, RecollectError> {
        self.db
            .connection()
            .call(|conn| -> Result<usize, rusqlite::Error> {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
                Ok(n as usize)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(id: &str, category: MemoryCategory) -> MemoryRecord {
        MemoryRecord {
            id: id.into(),
            text: format!("text of {id}"),
            category,
            confidence_level: ConfidenceLevel::Medium,
            source_conversation_id: "conv".into(),
            created_at: Utc.timestamp_opt(1_700_000_000, 123_000_000).unwrap(),
        }
    }

    #[tokio::test]
    async fn upsert_get_and_count() {
        let index = SqliteVectorIndex::new(Database::open_in_memory().await.unwrap());
        let rec = record("m1", MemoryCategory::Decision);
        index.upsert(rec.clone(), vec![0.5, 0.5]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.get("m1").await.unwrap(), Some(rec.clone()));
        assert_eq!(index.get("nope").await.unwrap(), None);

        let mut newer = rec.clone();
        newer.text = "revised".into();
        newer.created_at = rec.created_at + Duration::days(1);
        index.upsert(newer, vec![1.0, 0.0]).await.unwrap();

        let stored = index.get("m1").await.unwrap().unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(stored.text, "revised");
        assert_eq!(stored.created_at, rec.created_at);
    }

    #[tokio::test]
    async fn query_ranks_and_filters() {
        let index = SqliteVectorIndex::new(Database::open_in_memory().await.unwrap());
        index.upsert(record("near", MemoryCategory::Fact), vec![1.0, 0.0]).await.unwrap();
        index.upsert(record("mid", MemoryCategory::Task), vec![0.6, 0.8]).await.unwrap();
        index.upsert(record("far", MemoryCategory::Fact), vec![0.0, 1.0]).await.unwrap();
        index.upsert(record("3d", MemoryCategory::Fact), vec![1.0, 0.0, 0.0]).await.unwrap();

        let results = index
            .query(&[1.0, 0.0], 10, &RetrievalFilters::default())
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);

        let facts = RetrievalFilters {
            categories: vec![MemoryCategory::Fact],
            min_similarity: Some(0.5),
            ..Default::default()
        };
        let results = index.query(&[1.0, 0.0], 10, &facts).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.id, "near");
    }
}
