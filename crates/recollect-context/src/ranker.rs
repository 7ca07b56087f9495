// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-factor relevance scoring.
//!
//! Each factor is normalized to `[0, 1]` and the weights sum to 1, so every
//! score is in `[0, 1]`:
//!
//! - similarity: the canonical's similarity to the query
//! - recency: `0.5^(age / half_life)`, age measured from the last access or,
//!   for never-accessed memories, from creation
//! - frequency: `n / (n + saturation)` over the cluster's summed access count
//! - category: a per-category importance table scaled so its maximum is 1

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use recollect_config::model::RankingConfig;
use recollect_core::{MemoryCategory, RecollectError};
use recollect_memory::AccessTracker;
use serde::Serialize;
use tracing::debug;

use crate::dedup::DeduplicationResult;

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Factor weights. Always non-negative and summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    similarity: f64,
    recency: f64,
    frequency: f64,
    category: f64,
}

impl ScoreWeights {
    pub fn new(
        similarity: f64,
        recency: f64,
        frequency: f64,
        category: f64,
    ) -> Result<Self, RecollectError> {
        let all = [similarity, recency, frequency, category];
        if let Some(bad) = all.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(RecollectError::InvariantViolation(format!(
                "score weights must be finite and non-negative, got {bad}"
            )));
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RecollectError::InvariantViolation(format!(
                "score weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(Self {
            similarity,
            recency,
            frequency,
            category,
        })
    }

    pub fn similarity(&self) -> f64 {
        self.similarity
    }

    pub fn recency(&self) -> f64 {
        self.recency
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn category(&self) -> f64 {
        self.category
    }

    pub fn sum(&self) -> f64 {
        self.similarity + self.recency + self.frequency + self.category
    }
}

impl TryFrom<&RankingConfig> for ScoreWeights {
    type Error = RecollectError;

    fn try_from(config: &RankingConfig) -> Result<Self, Self::Error> {
        Self::new(
            config.similarity_weight,
            config.recency_weight,
            config.frequency_weight,
            config.category_weight,
        )
    }
}

/// Normalized factor values behind a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FactorBreakdown {
    pub similarity: f64,
    pub recency: f64,
    pub frequency: f64,
    pub category: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevanceScore {
    pub memory_id: String,
    /// Weighted sum of the factors, in `[0, 1]`.
    pub value: f64,
    pub breakdown: FactorBreakdown,
}

/// A deduplicated candidate with its score and aggregated access data.
#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub score: RelevanceScore,
    pub candidate: DeduplicationResult,
    /// Latest access across the canonical and its merged members.
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

impl RankedMemory {
    pub fn text(&self) -> &str {
        &self.candidate.canonical.memory.text
    }

    pub fn category(&self) -> MemoryCategory {
        self.candidate.canonical.memory.category
    }
}

/// Default importance per category before normalization.
fn default_category_table() -> HashMap<MemoryCategory, f64> {
    HashMap::from([
        (MemoryCategory::Preference, 1.0),
        (MemoryCategory::Decision, 0.9),
        (MemoryCategory::Fact, 0.8),
        (MemoryCategory::Relationship, 0.7),
        (MemoryCategory::Task, 0.6),
    ])
}

#[derive(Debug, Clone)]
pub struct Ranker {
    weights: ScoreWeights,
    half_life_hours: f64,
    frequency_saturation: f64,
    /// Already scaled to `[0, 1]`.
    category_table: HashMap<MemoryCategory, f64>,
}

impl Ranker {
    pub fn new(
        weights: ScoreWeights,
        half_life_hours: f64,
        frequency_saturation: f64,
        category_table: HashMap<MemoryCategory, f64>,
    ) -> Result<Self, RecollectError> {
        if !(half_life_hours.is_finite() && half_life_hours > 0.0) {
            return Err(RecollectError::InvariantViolation(format!(
                "recency half-life must be positive, got {half_life_hours}"
            )));
        }
        if !(frequency_saturation.is_finite() && frequency_saturation > 0.0) {
            return Err(RecollectError::InvariantViolation(format!(
                "frequency saturation must be positive, got {frequency_saturation}"
            )));
        }
        if category_table.values().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(RecollectError::InvariantViolation(
                "category importance must be finite and non-negative".into(),
            ));
        }
        let max = category_table.values().copied().fold(0.0f64, f64::max);
        let category_table = category_table
            .into_iter()
            .map(|(k, v)| (k, if max > 0.0 { v / max } else { 0.0 }))
            .collect();
        Ok(Self {
            weights,
            half_life_hours,
            frequency_saturation,
            category_table,
        })
    }

    /// Builds a ranker from config. Table entries override the defaults.
    pub fn from_config(config: &RankingConfig) -> Result<Self, RecollectError> {
        let mut table = default_category_table();
        for (name, value) in &config.category_table {
            let category = MemoryCategory::from_str(name).map_err(|_| {
                RecollectError::Config(format!("unknown category `{name}` in ranking.category_table"))
            })?;
            table.insert(category, *value);
        }
        Self::new(
            ScoreWeights::try_from(config)?,
            config.recency_half_life_hours,
            config.frequency_saturation,
            table,
        )
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Score and order candidates, highest first. Ties go to the most
    /// recently accessed. Reads `access` without modifying it.
    pub fn rank(
        &self,
        candidates: Vec<DeduplicationResult>,
        access: &AccessTracker,
        now: DateTime<Utc>,
    ) -> Vec<RankedMemory> {
        let mut ranked: Vec<RankedMemory> = candidates
            .into_iter()
            .map(|candidate| self.score(candidate, access, now))
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .value
                .total_cmp(&a.score.value)
                .then_with(|| cmp_recent_first(a.last_accessed_at, b.last_accessed_at))
        });
        ranked
    }

    fn score(
        &self,
        candidate: DeduplicationResult,
        access: &AccessTracker,
        now: DateTime<Utc>,
    ) -> RankedMemory {
        let (mut access_count, mut last_accessed_at) = (0u64, None);
        for id in candidate.member_ids() {
            let meta = access.get(id);
            access_count = access_count.saturating_add(meta.access_count);
            last_accessed_at = last_accessed_at.max(meta.last_accessed_at);
        }

        let memory = &candidate.canonical.memory;
        let reference = last_accessed_at.unwrap_or(memory.created_at);
        let age_hours = (now - reference).num_milliseconds().max(0) as f64 / 3_600_000.0;

        let breakdown = FactorBreakdown {
            similarity: f64::from(candidate.canonical.similarity).clamp(0.0, 1.0),
            recency: 0.5f64.powf(age_hours / self.half_life_hours),
            frequency: access_count as f64 / (access_count as f64 + self.frequency_saturation),
            category: self
                .category_table
                .get(&memory.category)
                .copied()
                .unwrap_or(0.0),
        };
        let w = &self.weights;
        let value = (w.similarity * breakdown.similarity
            + w.recency * breakdown.recency
            + w.frequency * breakdown.frequency
            + w.category * breakdown.category)
            .clamp(0.0, 1.0);

        debug!(
            memory_id = %memory.id,
            value,
            similarity = breakdown.similarity,
            recency = breakdown.recency,
            frequency = breakdown.frequency,
            category = breakdown.category,
            "scored candidate"
        );

        RankedMemory {
            score: RelevanceScore {
                memory_id: memory.id.clone(),
                value,
                breakdown,
            },
            candidate,
            last_accessed_at,
            access_count,
        }
    }
}

/// `Some` sorts before `None`; later timestamps first.
fn cmp_recent_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    b.cmp(&a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use recollect_core::ConfidenceLevel;
    use recollect_memory::{MemoryRecord, RetrievalResult};

    fn candidate(
        id: &str,
        category: MemoryCategory,
        similarity: f32,
        created_at: DateTime<Utc>,
    ) -> DeduplicationResult {
        DeduplicationResult {
            canonical: RetrievalResult {
                memory: MemoryRecord {
                    id: id.into(),
                    text: format!("text {id}"),
                    category,
                    confidence_level: ConfidenceLevel::High,
                    source_conversation_id: "c".into(),
                    created_at,
                },
                similarity,
                embedding: vec![],
            },
            merged: vec![],
        }
    }

    fn default_ranker() -> Ranker {
        Ranker::from_config(&RankingConfig::default()).unwrap()
    }

    #[test]
    fn weights_must_sum_to_one() {
        assert!(ScoreWeights::new(0.55, 0.2, 0.1, 0.15).is_ok());
        assert!(ScoreWeights::new(0.5, 0.2, 0.1, 0.1).is_err());
        assert!(ScoreWeights::new(1.2, -0.2, 0.0, 0.0).is_err());
        assert!(ScoreWeights::new(f64::NAN, 0.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn higher_similarity_ranks_first() {
        let now = Utc::now();
        let ranked = default_ranker().rank(
            vec![
                candidate("low", MemoryCategory::Fact, 0.3, now),
                candidate("high", MemoryCategory::Fact, 0.9, now),
            ],
            &AccessTracker::new(),
            now,
        );
        assert_eq!(ranked[0].score.memory_id, "high");
        assert!(ranked[0].score.value > ranked[1].score.value);
    }

    #[test]
    fn recency_halves_after_half_life() {
        let now = Utc::now();
        let ranked = default_ranker().rank(
            vec![candidate("m", MemoryCategory::Fact, 0.5, now - Duration::hours(168))],
            &AccessTracker::new(),
            now,
        );
        assert!((ranked[0].score.breakdown.recency - 0.5).abs() < 1e-6);
        assert!((ranked[0].score.breakdown.category - 0.8).abs() < 1e-9);
    }

    #[test]
    fn access_is_aggregated_over_merged_members() {
        let now = Utc::now();
        let access = AccessTracker::new();
        access.record("dup", now - Duration::hours(1));
        access.record("dup", now - Duration::hours(2));
        access.record("canon", now - Duration::hours(5));

        let mut cluster = candidate("canon", MemoryCategory::Fact, 0.8, now - Duration::days(30));
        cluster
            .merged
            .push(candidate("dup", MemoryCategory::Fact, 0.7, now).canonical);

        let ranked = default_ranker().rank(vec![cluster], &access, now);
        assert_eq!(ranked[0].access_count, 3);
        assert_eq!(ranked[0].last_accessed_at, Some(now - Duration::hours(1)));
        assert!((ranked[0].score.breakdown.frequency - 3.0 / 8.0).abs() < 1e-9);
        // Ranking only reads access data.
        assert_eq!(access.get("dup").access_count, 2);
    }

    #[test]
    fn ties_go_to_most_recent_access() {
        let now = Utc::now();
        let created = now - Duration::days(1);
        let access = AccessTracker::new();
        access.record("older", now - Duration::hours(3));
        access.record("newer", now - Duration::hours(1));

        let ranker = Ranker::new(
            ScoreWeights::new(1.0, 0.0, 0.0, 0.0).unwrap(),
            24.0,
            5.0,
            default_category_table(),
        )
        .unwrap();
        let ranked = ranker.rank(
            vec![
                candidate("never", MemoryCategory::Fact, 0.5, created),
                candidate("older", MemoryCategory::Fact, 0.5, created),
                candidate("newer", MemoryCategory::Fact, 0.5, created),
            ],
            &access,
            now,
        );
        let ids: Vec<_> = ranked.iter().map(|r| r.score.memory_id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older", "never"]);
    }

    #[test]
    fn category_overrides_are_normalized() {
        let mut config = RankingConfig::default();
        config.category_table.insert("task".into(), 2.0);
        let ranker = Ranker::from_config(&config).unwrap();
        assert_eq!(ranker.category_table[&MemoryCategory::Task], 1.0);
        assert_eq!(ranker.category_table[&MemoryCategory::Preference], 0.5);
    }

    fn arb_category() -> impl Strategy<Value = MemoryCategory> {
        prop_oneof![
            Just(MemoryCategory::Preference),
            Just(MemoryCategory::Fact),
            Just(MemoryCategory::Task),
            Just(MemoryCategory::Relationship),
            Just(MemoryCategory::Decision),
        ]
    }

    proptest! {
        #[test]
        fn constructed_weights_sum_to_one(
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
            c in 0.0f64..1.0,
            d in 0.0f64..1.0,
        ) {
            match ScoreWeights::new(a, b, c, d) {
                Ok(w) => prop_assert!((w.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE),
                Err(_) => prop_assert!((a + b + c + d - 1.0).abs() > WEIGHT_SUM_TOLERANCE),
            }
            let total = a + b + c + d;
            if total > 0.0 {
                prop_assert!(ScoreWeights::new(a / total, b / total, c / total, 1.0 - (a + b + c) / total).is_ok());
            }
        }

        #[test]
        fn scores_are_in_unit_interval_and_sorted(
            items in prop::collection::vec(
                (0.0f32..=1.0, arb_category(), 0i64..10_000, 0u32..50),
                1..20,
            ),
            raw in prop::collection::vec(0.0f64..1.0, 4),
        ) {
            let total: f64 = raw.iter().sum::<f64>().max(1e-9);
            let w: Vec<f64> = raw.iter().map(|x| x / total).collect();
            let weights = match ScoreWeights::new(w[0], w[1], w[2], 1.0 - w[0] - w[1] - w[2]) {
                Ok(weights) => weights,
                Err(_) => ScoreWeights::new(0.25, 0.25, 0.25, 0.25).unwrap(),
            };
            let ranker = Ranker::new(weights, 168.0, 5.0, default_category_table()).unwrap();

            let now = Utc::now();
            let access = AccessTracker::new();
            let candidates: Vec<_> = items
                .iter()
                .enumerate()
                .map(|(i, (sim, category, age_hours, hits))| {
                    let id = format!("m{i}");
                    for _ in 0..*hits {
                        access.record(&id, now - Duration::hours(*age_hours));
                    }
                    candidate(&id, *category, *sim, now - Duration::hours(*age_hours))
                })
                .collect();

            let ranked = ranker.rank(candidates, &access, now);
            for r in &ranked {
                prop_assert!((0.0..=1.0).contains(&r.score.value));
            }
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].score.value >= pair[1].score.value);
            }
        }
    }
}
