// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The vector index seam and an in-process implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use recollect_core::RecollectError;
use tokio::sync::RwLock;

use crate::types::{MemoryRecord, RetrievalFilters, RetrievalResult, cosine_similarity};

/// Stores memory embeddings and answers nearest-neighbour queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite the memory with `record.id`.
    ///
    /// Overwriting keeps the original `created_at`.
    async fn upsert(&self, record: MemoryRecord, vector: Vec<f32>) -> Result<(), RecollectError>;

    /// Up to `top_k` matches for `vector`, by descending similarity.
    ///
    /// Entries whose dimensionality differs from `vector` are skipped.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: &RetrievalFilters,
    ) -> Result<Vec<RetrievalResult>, RecollectError>;

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, RecollectError>;

    async fn count(&self) -> Result<usize, RecollectError>;
}

/// Score `candidates` against `vector` and keep the best `top_k`.
///
/// Ties are broken by id so results are deterministic.
pub(crate) fn rank_candidates(
    vector: &[f32],
    top_k: usize,
    filters: &RetrievalFilters,
    candidates: impl IntoIterator<Item = (MemoryRecord, Vec<f32>)>,
) -> Vec<RetrievalResult> {
    if top_k == 0 || vector.is_empty() {
        return Vec::new();
    }
    let min_similarity = filters.min_similarity.unwrap_or(0.0);
    let mut results: Vec<RetrievalResult> = candidates
        .into_iter()
        .filter(|(record, embedding)| embedding.len() == vector.len() && filters.matches(record))
        .filter_map(|(memory, embedding)| {
            let similarity = cosine_similarity(vector, &embedding);
            (similarity >= min_similarity).then_some(RetrievalResult {
                memory,
                similarity,
                embedding,
            })
        })
        .collect();
    results.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
    results.truncate(top_k);
    results
}

/// Index held entirely in memory. Used in tests and for ephemeral runs.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<HashMap<String, (MemoryRecord, Vec<f32>)>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, mut record: MemoryRecord, vector: Vec<f32>) -> Result<(), RecollectError> {
        let mut entries = self.entries.write().await;
        if let Some((existing, _)) = entries.get(&record.id) {
            record.created_at = existing.created_at;
        }
        entries.insert(record.id.clone(), (record, vector));
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: &RetrievalFilters,
    ) -> Result<Vec<RetrievalResult>, RecollectError> {
        let entries = self.entries.read().await;
        Ok(rank_candidates(
            vector,
            top_k,
            filters,
            entries.values().cloned(),
        ))
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, RecollectError> {
        Ok(self.entries.read().await.get(id).map(|(r, _)| r.clone()))
    }

    async fn count(&self) -> Result<usize, RecollectError> {
        Ok(self.entries.read().await.len())
    }
}
