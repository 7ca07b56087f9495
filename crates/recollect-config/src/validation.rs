// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Everything that would otherwise surface as an invariant violation at
//! request time is rejected here, at startup.

use std::str::FromStr;

use recollect_core::MemoryCategory;

use crate::diagnostic::ConfigError;
use crate::model::RecollectConfig;

/// Tolerance for the ranking weight sum.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &RecollectConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    // [boundary]
    if config.boundary.turn_limit == 0 {
        fail("boundary.turn_limit must be at least 1".to_string());
    }
    if config.boundary.idle_timeout_secs == 0 {
        fail("boundary.idle_timeout_secs must be at least 1".to_string());
    }
    if config.boundary.sweep_interval_secs == 0 {
        fail("boundary.sweep_interval_secs must be at least 1".to_string());
    }
    check_unit("boundary.topic_shift_threshold", config.boundary.topic_shift_threshold, &mut fail);
    if config.boundary.close_markers.iter().any(|m| m.trim().is_empty()) {
        fail("boundary.close_markers must not contain empty markers".to_string());
    }

    // [extraction]
    if config.extraction.max_memories_per_transcript == 0 {
        fail("extraction.max_memories_per_transcript must be at least 1".to_string());
    }
    if config.extraction.workers == 0 {
        fail("extraction.workers must be at least 1".to_string());
    }
    if config.extraction.queue_capacity == 0 {
        fail("extraction.queue_capacity must be at least 1".to_string());
    }

    // [retrieval]
    if config.retrieval.top_k == 0 {
        fail("retrieval.top_k must be at least 1".to_string());
    }
    check_unit("retrieval.min_similarity", config.retrieval.min_similarity, &mut fail);
    check_unit("retrieval.dedup_threshold", config.retrieval.dedup_threshold, &mut fail);

    // [ranking]
    let ranking = &config.ranking;
    let weights = [
        ("ranking.similarity_weight", ranking.similarity_weight),
        ("ranking.recency_weight", ranking.recency_weight),
        ("ranking.frequency_weight", ranking.frequency_weight),
        ("ranking.category_weight", ranking.category_weight),
    ];
    for (key, value) in weights {
        if !(value.is_finite() && value >= 0.0) {
            fail(format!("{key} must be a non-negative number, got {value}"));
        }
    }
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        fail(format!("ranking weights must sum to 1.0, got {sum}"));
    }
    if !(ranking.recency_half_life_hours.is_finite() && ranking.recency_half_life_hours > 0.0) {
        fail(format!(
            "ranking.recency_half_life_hours must be positive, got {}",
            ranking.recency_half_life_hours
        ));
    }
    if !(ranking.frequency_saturation.is_finite() && ranking.frequency_saturation > 0.0) {
        fail(format!(
            "ranking.frequency_saturation must be positive, got {}",
            ranking.frequency_saturation
        ));
    }
    for (name, value) in &ranking.category_table {
        if MemoryCategory::from_str(name).is_err() {
            fail(format!("ranking.category_table has unknown category `{name}`"));
        }
        if !(value.is_finite() && *value >= 0.0) {
            fail(format!(
                "ranking.category_table.{name} must be a non-negative number, got {value}"
            ));
        }
    }

    // [budget]
    if config.budget.max_tokens == 0 {
        fail("budget.max_tokens must be at least 1".to_string());
    }

    // [provider]
    if config.provider.base_url.trim().is_empty() {
        fail("provider.base_url must not be empty".to_string());
    }
    let retry = &config.provider.retry;
    if retry.max_attempts == 0 {
        fail("provider.retry.max_attempts must be at least 1".to_string());
    }
    if !(retry.multiplier.is_finite() && retry.multiplier >= 1.0) {
        fail(format!(
            "provider.retry.multiplier must be at least 1.0, got {}",
            retry.multiplier
        ));
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        fail(format!(
            "provider.retry.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
            retry.initial_backoff_ms, retry.max_backoff_ms
        ));
    }

    // [storage]
    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }
    if config.storage.transcripts_dir.trim().is_empty() {
        fail("storage.transcripts_dir must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_unit(key: &str, value: f64, fail: &mut impl FnMut(String)) {
    if !(0.0..=1.0).contains(&value) {
        fail(format!("{key} must be within [0.0, 1.0], got {value}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&RecollectConfig::default()).is_ok());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut config = RecollectConfig::default();
        config.ranking.similarity_weight = 0.9;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("sum to 1.0")));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = RecollectConfig::default();
        config.boundary.turn_limit = 0;
        config.budget.max_tokens = 0;
        config.retrieval.dedup_threshold = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn unknown_category_in_table_is_rejected() {
        let mut config = RecollectConfig::default();
        config.ranking.category_table.insert("gossip".into(), 1.0);
        config.ranking.category_table.insert("preference".into(), 1.0);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("gossip"));
    }
}
