// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory conversation state and seal history.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use recollect_core::{
    BoundaryDetectionEvent, BoundaryDetectionResult, ConversationTranscript, RecollectError,
};
use serde::Serialize;
use strum::Display;
use tracing::{info, warn};

/// Lifecycle of a conversation's current transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Accepting turns.
    Active,
    /// Boundary fired; extraction in flight.
    Sealing,
    /// Extraction finished or failed. A new turn opens a fresh transcript.
    Sealed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SealOutcome {
    Indexed {
        memories: usize,
        index_failures: usize,
        /// Transcript store filename, if storing succeeded.
        transcript: Option<String>,
    },
    ExtractionFailed {
        reason: String,
    },
    /// A transcript with the same first-message hash was already processed.
    Duplicate {
        transcript: String,
    },
}

/// One sealing of one transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SealRecord {
    pub event: BoundaryDetectionEvent,
    pub first_message_hash: String,
    pub message_count: usize,
    /// `None` while extraction is in flight.
    pub outcome: Option<SealOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationStatus {
    pub conversation_id: String,
    pub state: ConversationState,
    /// Messages in the open transcript.
    pub open_messages: usize,
    pub last_turn_at: Option<DateTime<Utc>>,
    pub seals: Vec<SealRecord>,
}

/// A sealed transcript waiting for extraction.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub transcript: ConversationTranscript,
    pub event: BoundaryDetectionEvent,
    /// Position of this sealing in the conversation's history.
    pub seal_index: usize,
    /// Highest turn log id among the sealed messages. `None` when turns are
    /// not logged.
    pub through_turn_id: Option<i64>,
}

impl ExtractionJob {
    pub fn conversation_id(&self) -> &str {
        self.transcript.conversation_id()
    }

    pub fn first_message_hash(&self) -> &str {
        self.transcript.first_message_hash().unwrap_or_default()
    }
}

#[derive(Debug)]
pub(crate) struct ConversationEntry {
    pub(crate) transcript: ConversationTranscript,
    pub(crate) last_turn_at: Option<DateTime<Utc>>,
    /// Turn log ids of the open transcript's messages, in the same order.
    /// Empty when turns are not logged.
    pub(crate) turn_ids: Vec<i64>,
    pub(crate) seals: Vec<SealRecord>,
}

impl ConversationEntry {
    fn new(conversation_id: &str) -> Self {
        Self {
            transcript: ConversationTranscript::new(conversation_id),
            last_turn_at: None,
            turn_ids: Vec::new(),
            seals: Vec::new(),
        }
    }

    fn state(&self) -> ConversationState {
        if !self.transcript.is_empty() {
            return ConversationState::Active;
        }
        match self.seals.last() {
            Some(record) if record.outcome.is_none() => ConversationState::Sealing,
            Some(_) => ConversationState::Sealed,
            None => ConversationState::Active,
        }
    }

    /// Seal the first `keep` messages of the open transcript and carry the
    /// rest into a fresh one. `None` if there is nothing to seal.
    pub(crate) fn seal(
        &mut self,
        result: BoundaryDetectionResult,
        keep: usize,
        at: DateTime<Utc>,
    ) -> Option<ExtractionJob> {
        let keep = keep.min(self.transcript.message_count());
        if keep == 0 {
            return None;
        }
        let conversation_id = self.transcript.conversation_id().to_string();
        let mut messages = self.transcript.messages().to_vec();
        let carried = messages.split_off(keep);
        let through_turn_id = if self.turn_ids.len() == messages.len() + carried.len() {
            let carried_ids = self.turn_ids.split_off(keep);
            let through = self.turn_ids.iter().max().copied();
            self.turn_ids = carried_ids;
            through
        } else {
            self.turn_ids.clear();
            None
        };

        let mut sealed = ConversationTranscript::from_messages(&conversation_id, messages);
        sealed.seal(at);
        self.transcript = ConversationTranscript::from_messages(&conversation_id, carried);

        let event = BoundaryDetectionEvent {
            result,
            conversation_id: conversation_id.clone(),
            timestamp: at,
        };
        let first_message_hash = sealed.first_message_hash().unwrap_or_default().to_string();
        info!(
            conversation_id = %conversation_id,
            reason = ?result.reason,
            confidence = result.confidence,
            messages = sealed.message_count(),
            first_message_hash = %first_message_hash,
            "conversation sealed"
        );

        self.seals.push(SealRecord {
            event: event.clone(),
            first_message_hash,
            message_count: sealed.message_count(),
            outcome: None,
        });
        Some(ExtractionJob {
            transcript: sealed,
            event,
            seal_index: self.seals.len() - 1,
            through_turn_id,
        })
    }
}

/// Every known conversation, keyed by id.
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    conversations: DashMap<String, ConversationEntry>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the entry, creating it if needed. The entry stays locked
    /// for the duration of `f`.
    pub(crate) fn update<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut ConversationEntry) -> R,
    ) -> R {
        let mut entry = self
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| ConversationEntry::new(conversation_id));
        f(entry.value_mut())
    }

    /// Like [`Self::update`] but reports unknown ids as not found.
    pub(crate) fn update_existing<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut ConversationEntry) -> R,
    ) -> Result<R, RecollectError> {
        let mut entry = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| RecollectError::not_found("conversation", conversation_id))?;
        Ok(f(entry.value_mut()))
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.conversations.contains_key(conversation_id)
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.conversations.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Record the result of extraction for a sealing.
    pub fn complete(&self, conversation_id: &str, seal_index: usize, outcome: SealOutcome) {
        let Some(mut entry) = self.conversations.get_mut(conversation_id) else {
            warn!(conversation_id, "completed seal for unknown conversation");
            return;
        };
        match entry.seals.get_mut(seal_index) {
            Some(record) => record.outcome = Some(outcome),
            None => warn!(conversation_id, seal_index, "completed unknown seal"),
        }
    }

    pub fn status(&self, conversation_id: &str) -> Result<ConversationStatus, RecollectError> {
        let entry = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| RecollectError::not_found("conversation", conversation_id))?;
        Ok(ConversationStatus {
            conversation_id: conversation_id.to_string(),
            state: entry.state(),
            open_messages: entry.transcript.message_count(),
            last_turn_at: entry.last_turn_at,
            seals: entry.seals.clone(),
        })
    }

    /// Number of sealings whose extraction has not finished.
    pub fn in_flight(&self) -> usize {
        self.conversations
            .iter()
            .map(|e| e.seals.iter().filter(|s| s.outcome.is_none()).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use recollect_core::{BoundaryTriggerReason, ChatMessage};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn push(registry: &ConversationRegistry, id: &str, texts: &[&str]) {
        registry.update(id, |entry| {
            for (i, t) in texts.iter().enumerate() {
                entry
                    .transcript
                    .append(ChatMessage::user(*t, at(i as i64)))
                    .unwrap();
            }
        });
    }

    #[test]
    fn unknown_conversation_is_not_found() {
        let registry = ConversationRegistry::new();
        assert!(registry.status("nope").unwrap_err().is_not_found());
        assert!(registry.update_existing("nope", |_| ()).is_err());
    }

    #[test]
    fn sealing_moves_through_states() {
        let registry = ConversationRegistry::new();
        push(&registry, "c1", &["hello", "bye"]);
        assert_eq!(registry.status("c1").unwrap().state, ConversationState::Active);

        let result = BoundaryDetectionResult::triggered(BoundaryTriggerReason::ExplicitClose, 1.0);
        let job = registry
            .update("c1", |e| e.seal(result, usize::MAX, at(10)))
            .unwrap();
        assert!(job.transcript.is_sealed());
        assert_eq!(job.transcript.message_count(), 2);
        assert_eq!(job.seal_index, 0);

        let status = registry.status("c1").unwrap();
        assert_eq!(status.state, ConversationState::Sealing);
        assert_eq!(status.open_messages, 0);
        assert_eq!(registry.in_flight(), 1);

        registry.complete(
            "c1",
            0,
            SealOutcome::ExtractionFailed {
                reason: "provider down".into(),
            },
        );
        let status = registry.status("c1").unwrap();
        assert_eq!(status.state, ConversationState::Sealed);
        assert_eq!(registry.in_flight(), 0);
        assert!(matches!(
            status.seals[0].outcome,
            Some(SealOutcome::ExtractionFailed { .. })
        ));
    }

    #[test]
    fn partial_seal_carries_remaining_messages() {
        let registry = ConversationRegistry::new();
        push(&registry, "c1", &["a", "b", "c"]);
        let result = BoundaryDetectionResult::triggered(BoundaryTriggerReason::TopicShift, 0.5);
        let job = registry.update("c1", |e| e.seal(result, 2, at(5))).unwrap();
        assert_eq!(job.transcript.message_count(), 2);

        let status = registry.status("c1").unwrap();
        assert_eq!(status.open_messages, 1);
        assert_eq!(status.state, ConversationState::Active);
    }

    #[test]
    fn partial_seal_reports_highest_sealed_turn_id() {
        let registry = ConversationRegistry::new();
        push(&registry, "c1", &["a", "b", "c"]);
        registry.update("c1", |e| e.turn_ids = vec![7, 9, 12]);

        let result = BoundaryDetectionResult::triggered(BoundaryTriggerReason::TopicShift, 0.5);
        let job = registry.update("c1", |e| e.seal(result, 2, at(5))).unwrap();
        assert_eq!(job.through_turn_id, Some(9));

        let result = BoundaryDetectionResult::triggered(BoundaryTriggerReason::ExplicitClose, 1.0);
        let job = registry
            .update("c1", |e| e.seal(result, usize::MAX, at(6)))
            .unwrap();
        assert_eq!(job.through_turn_id, Some(12));
    }

    #[test]
    fn unlogged_turns_seal_without_turn_id() {
        let registry = ConversationRegistry::new();
        push(&registry, "c1", &["a"]);
        let result = BoundaryDetectionResult::triggered(BoundaryTriggerReason::ExplicitClose, 1.0);
        let job = registry
            .update("c1", |e| e.seal(result, usize::MAX, at(1)))
            .unwrap();
        assert_eq!(job.through_turn_id, None);
    }

    #[test]
    fn empty_transcript_does_not_seal() {
        let registry = ConversationRegistry::new();
        let result = BoundaryDetectionResult::triggered(BoundaryTriggerReason::IdleTimeout, 1.0);
        assert!(registry.update("c1", |e| e.seal(result, usize::MAX, at(0))).is_none());
        assert!(registry.status("c1").unwrap().seals.is_empty());
    }
}
