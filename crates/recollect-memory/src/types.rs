// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types.

use chrono::{DateTime, Utc};
use recollect_core::{ConfidenceLevel, MemoryCategory};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A memory produced by the extractor, not yet embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMemory {
    pub text: String,
    pub category: MemoryCategory,
    pub confidence_level: ConfidenceLevel,
    pub source_conversation_id: String,
}

impl ExtractedMemory {
    /// Deterministic id, so that indexing the same memory twice overwrites.
    pub fn memory_id(&self) -> String {
        memory_id(&self.source_conversation_id, &self.text)
    }
}

/// First 32 hex chars of `sha256(source_conversation_id 0x1f text)`.
pub fn memory_id(source_conversation_id: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_conversation_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(text.trim().as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(32);
    id
}

/// An indexed memory as returned by retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub text: String,
    pub category: MemoryCategory,
    pub confidence_level: ConfidenceLevel,
    pub source_conversation_id: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn from_extracted(memory: &ExtractedMemory, created_at: DateTime<Utc>) -> Self {
        Self {
            id: memory.memory_id(),
            text: memory.text.clone(),
            category: memory.category,
            confidence_level: memory.confidence_level,
            source_conversation_id: memory.source_conversation_id.clone(),
            created_at,
        }
    }
}

/// Optional narrowing of a retrieval query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalFilters {
    /// Only these categories. Empty means all.
    pub categories: Vec<MemoryCategory>,
    /// Drop candidates below this similarity.
    pub min_similarity: Option<f32>,
    /// Only memories extracted from this conversation.
    pub source_conversation_id: Option<String>,
}

impl RetrievalFilters {
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        (self.categories.is_empty() || self.categories.contains(&record.category))
            && self
                .source_conversation_id
                .as_ref()
                .is_none_or(|id| *id == record.source_conversation_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub text: String,
    pub top_k: usize,
    pub filters: RetrievalFilters,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            filters: RetrievalFilters::default(),
        }
    }

    pub fn with_filters(mut self, filters: RetrievalFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// One retrieval candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub memory: MemoryRecord,
    /// Similarity to the query, in `[0, 1]`.
    pub similarity: f32,
    /// The memory's stored embedding. Used for candidate-to-candidate comparison.
    pub embedding: Vec<f32>,
}

/// Results of one query, ordered by descending similarity.
///
/// A snapshot: it can be consumed once and is deliberately not `Clone`.
#[derive(Debug)]
pub struct RetrievalResponse {
    results: std::vec::IntoIter<RetrievalResult>,
}

impl RetrievalResponse {
    /// Sorts by descending similarity; equal similarities keep their input order.
    pub fn new(mut results: Vec<RetrievalResult>) -> Self {
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Self {
            results: results.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.results.len() == 0
    }
}

impl Iterator for RetrievalResponse {
    type Item = RetrievalResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.results.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.results.size_hint()
    }
}

impl ExactSizeIterator for RetrievalResponse {}

/// Usage aggregate for one memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMetadata {
    pub memory_id: String,
    /// `None` until the memory is first surfaced.
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

impl AccessMetadata {
    pub fn never(memory_id: impl Into<String>) -> Self {
        Self {
            memory_id: memory_id.into(),
            last_accessed_at: None,
            access_count: 0,
        }
    }
}

/// Cosine similarity clamped to `[0, 1]`.
///
/// Vectors of different length, or with zero norm, have similarity 0.
/// Opposed vectors are treated as unrelated rather than negatively related.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() {
        sim.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

/// Convert an f32 vector to little-endian bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a BLOB back into an f32 vector. `None` if the length is not a multiple of 4.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, category: MemoryCategory) -> MemoryRecord {
        MemoryRecord {
            id: id.into(),
            text: format!("memory {id}"),
            category,
            confidence_level: ConfidenceLevel::High,
            source_conversation_id: "c1".into(),
            created_at: Utc::now(),
        }
    }

    fn result(id: &str, similarity: f32) -> RetrievalResult {
        RetrievalResult {
            memory: record(id, MemoryCategory::Fact),
            similarity,
            embedding: vec![],
        }
    }

    #[test]
    fn memory_id_is_deterministic() {
        let a = memory_id("c1", "User likes tea");
        assert_eq!(a, memory_id("c1", "  User likes tea "));
        assert_ne!(a, memory_id("c2", "User likes tea"));
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn response_sorts_descending_with_stable_ties() {
        let response = RetrievalResponse::new(vec![
            result("a", 0.2),
            result("b", 0.9),
            result("c", 0.5),
            result("d", 0.9),
        ]);
        assert_eq!(response.len(), 4);
        let ids: Vec<_> = response.map(|r| r.memory.id).collect();
        assert_eq!(ids, vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn filters_match_category_and_source() {
        let filters = RetrievalFilters {
            categories: vec![MemoryCategory::Preference],
            min_similarity: None,
            source_conversation_id: Some("c1".into()),
        };
        assert!(filters.matches(&record("a", MemoryCategory::Preference)));
        assert!(!filters.matches(&record("b", MemoryCategory::Task)));
        assert!(RetrievalFilters::default().matches(&record("c", MemoryCategory::Task)));
    }

    #[test]
    fn cosine_is_clamped_to_unit_interval() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn blob_round_trip_and_rejects_ragged() {
        let original = vec![0.1_f32, -0.5, 1.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&original)).unwrap(), original);
        assert!(blob_to_vec(&[0, 1, 2]).is_none());
    }

    proptest::proptest! {
        #[test]
        fn cosine_stays_in_unit_interval_and_is_symmetric(
            pairs in proptest::collection::vec((-100.0f32..100.0, -100.0f32..100.0), 1..32)
        ) {
            let (a, b): (Vec<f32>, Vec<f32>) = pairs.into_iter().unzip();
            let ab = cosine_similarity(&a, &b);
            proptest::prop_assert!((0.0..=1.0).contains(&ab));
            proptest::prop_assert!((ab - cosine_similarity(&b, &a)).abs() < 1e-6);
        }
    }
}
