// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation end detection.
//!
//! [`evaluate`] is a pure function of the transcript and the time since its
//! last turn. Triggers are checked in a fixed order and the first match wins:
//! explicit close, turn limit, idle timeout, topic shift.

use std::collections::HashMap;
use std::time::Duration;

use recollect_config::model::BoundaryConfig;
use recollect_core::{BoundaryDetectionResult, BoundaryTriggerReason, ConversationTranscript};

/// Thresholds for [`evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRules {
    pub idle_timeout: Duration,
    pub turn_limit: usize,
    /// `0.0` disables topic-shift detection.
    pub topic_shift_threshold: f64,
    pub topic_shift_min_messages: usize,
    pub close_markers: Vec<String>,
}

impl From<&BoundaryConfig> for BoundaryRules {
    fn from(config: &BoundaryConfig) -> Self {
        Self {
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            turn_limit: config.turn_limit,
            topic_shift_threshold: config.topic_shift_threshold,
            topic_shift_min_messages: config.topic_shift_min_messages,
            close_markers: config
                .close_markers
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl Default for BoundaryRules {
    fn default() -> Self {
        Self::from(&BoundaryConfig::default())
    }
}

/// Owns a set of rules and evaluates transcripts against them.
#[derive(Debug, Clone, Default)]
pub struct BoundaryDetector {
    rules: BoundaryRules,
}

impl BoundaryDetector {
    pub fn new(rules: BoundaryRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &BoundaryRules {
        &self.rules
    }

    pub fn evaluate(
        &self,
        transcript: &ConversationTranscript,
        elapsed_since_last_turn: Duration,
    ) -> BoundaryDetectionResult {
        evaluate(transcript, elapsed_since_last_turn, &self.rules)
    }
}

/// Decide whether the conversation has ended. Never fails.
pub fn evaluate(
    transcript: &ConversationTranscript,
    elapsed_since_last_turn: Duration,
    rules: &BoundaryRules,
) -> BoundaryDetectionResult {
    let Some(last) = transcript.last_message() else {
        return BoundaryDetectionResult::none();
    };

    if rules
        .close_markers
        .iter()
        .any(|marker| contains_marker(&last.content, marker))
    {
        return BoundaryDetectionResult::triggered(BoundaryTriggerReason::ExplicitClose, 1.0);
    }

    if transcript.message_count() >= rules.turn_limit {
        return BoundaryDetectionResult::triggered(BoundaryTriggerReason::TurnLimit, 1.0);
    }

    if elapsed_since_last_turn > rules.idle_timeout {
        return BoundaryDetectionResult::triggered(BoundaryTriggerReason::IdleTimeout, 1.0);
    }

    if let Some(similarity) = topic_similarity(transcript, rules)
        && similarity < rules.topic_shift_threshold
    {
        let confidence = (rules.topic_shift_threshold - similarity) / rules.topic_shift_threshold;
        return BoundaryDetectionResult::triggered(
            BoundaryTriggerReason::TopicShift,
            confidence as f32,
        );
    }

    BoundaryDetectionResult::none()
}

/// Case-insensitive match of `marker` in `content`, bounded by non-alphanumeric
/// characters so `/end` does not match `/endpoint`. `marker` must be lowercase.
fn contains_marker(content: &str, marker: &str) -> bool {
    let haystack = content.to_lowercase();
    haystack.match_indices(marker).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Similarity between the last message and the centroid of the ones before it.
///
/// `None` when the trigger is disabled, the transcript is too short, or either
/// side has no words.
fn topic_similarity(transcript: &ConversationTranscript, rules: &BoundaryRules) -> Option<f64> {
    if rules.topic_shift_threshold <= 0.0 {
        return None;
    }
    let messages = transcript.messages();
    let (last, prior) = messages.split_last()?;
    if prior.len() < rules.topic_shift_min_messages {
        return None;
    }

    let last_vec = bag_of_words(&last.content)?;
    let mut centroid: HashMap<String, f64> = HashMap::new();
    for v in prior.iter().filter_map(|msg| bag_of_words(&msg.content)) {
        for (word, weight) in v {
            *centroid.entry(word).or_default() += weight;
        }
    }

    let norm = centroid.values().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return None;
    }
    let dot: f64 = last_vec
        .iter()
        .filter_map(|(word, x)| centroid.get(word).map(|c| c * x))
        .sum();
    Some((dot / norm).clamp(0.0, 1.0))
}

/// L2-normalized term frequencies of lowercase alphanumeric words longer
/// than two characters.
fn bag_of_words(text: &str) -> Option<HashMap<String, f64>> {
    let mut v: HashMap<String, f64> = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
    {
        *v.entry(word.to_lowercase()).or_default() += 1.0;
    }
    if v.is_empty() {
        return None;
    }
    let norm = v.values().map(|x| x * x).sum::<f64>().sqrt();
    v.values_mut().for_each(|x| *x /= norm);
    Some(v)
}
