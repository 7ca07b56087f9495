// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Greedy near-duplicate clustering of retrieval candidates.

use std::collections::HashSet;

use recollect_memory::{RetrievalResponse, RetrievalResult, cosine_similarity};

/// A cluster of near-duplicates represented by its canonical member.
#[derive(Debug, Clone, PartialEq)]
pub struct DeduplicationResult {
    pub canonical: RetrievalResult,
    /// Absorbed candidates, in the order they were absorbed.
    pub merged: Vec<RetrievalResult>,
}

impl DeduplicationResult {
    fn open(canonical: RetrievalResult) -> Self {
        Self {
            canonical,
            merged: Vec::new(),
        }
    }

    /// Ids of the canonical followed by every merged member.
    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical.memory.id.as_str())
            .chain(self.merged.iter().map(|m| m.memory.id.as_str()))
    }
}

/// Similarity of two candidates: cosine of their embeddings when both have
/// one of the same dimension, otherwise word-set Jaccard of their texts.
pub fn candidate_similarity(a: &RetrievalResult, b: &RetrievalResult) -> f32 {
    if !a.embedding.is_empty() && a.embedding.len() == b.embedding.len() {
        return cosine_similarity(&a.embedding, &b.embedding);
    }
    jaccard(&a.memory.text, &b.memory.text)
}

fn jaccard(a: &str, b: &str) -> f32 {
    let words = |s: &str| -> HashSet<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect()
    };
    let (a, b) = (words(a), words(b));
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f32 / union as f32
}

/// Cluster `results` in one pass.
///
/// Candidates are visited by descending query similarity, earlier first on
/// ties. Each joins the most recently opened cluster whose canonical is at
/// least `threshold` similar to it, or opens a new cluster. No two canonicals
/// in the output are `threshold` similar or more.
pub fn deduplicate(results: RetrievalResponse, threshold: f32) -> Vec<DeduplicationResult> {
    let mut candidates: Vec<RetrievalResult> = results.collect();
    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    let mut clusters: Vec<DeduplicationResult> = Vec::new();
    for candidate in candidates {
        let home = clusters
            .iter()
            .rposition(|c| candidate_similarity(&c.canonical, &candidate) >= threshold);
        match home {
            Some(i) => clusters[i].merged.push(candidate),
            None => clusters.push(DeduplicationResult::open(candidate)),
        }
    }
    clusters
}
