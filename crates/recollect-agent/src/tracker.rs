// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation orchestration: ingest turns, detect boundaries, and hand
//! sealed transcripts to the worker pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use recollect_core::{
    BoundaryDetectionEvent, BoundaryDetectionResult, BoundaryTriggerReason, ChatMessage,
    RecollectError, TurnLog,
};
use recollect_memory::BoundaryDetector;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{
    ConversationEntry, ConversationRegistry, ConversationStatus, ExtractionJob,
};
use crate::worker::WorkerPool;

/// What ingesting one turn did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnOutcome {
    /// Boundaries fired by this turn, oldest first. At most two: an idle
    /// timeout on the previous transcript, then one on the transcript that
    /// now holds the turn.
    pub sealed: Vec<BoundaryDetectionEvent>,
    /// Messages in the open transcript after the turn.
    pub open_messages: usize,
}

pub struct ConversationTracker {
    detector: BoundaryDetector,
    registry: Arc<ConversationRegistry>,
    pool: Arc<WorkerPool>,
    turn_log: Option<Arc<dyn TurnLog>>,
}

/// Time between two instants, zero if `later` is not after `earlier`.
fn gap(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// How many messages a boundary seals. Topic shifts leave the shifting
/// message to start the next transcript.
fn messages_to_seal(entry: &ConversationEntry, result: &BoundaryDetectionResult) -> usize {
    let count = entry.transcript.message_count();
    match result.reason {
        Some(BoundaryTriggerReason::TopicShift) => count.saturating_sub(1),
        _ => count,
    }
}

impl ConversationTracker {
    pub fn new(
        detector: BoundaryDetector,
        registry: Arc<ConversationRegistry>,
        pool: Arc<WorkerPool>,
        turn_log: Option<Arc<dyn TurnLog>>,
    ) -> Self {
        Self {
            detector,
            registry,
            pool,
            turn_log,
        }
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Append a turn and seal the conversation if a boundary fires.
    ///
    /// Returns without waiting for extraction. Time is measured with message
    /// timestamps: a gap longer than the idle timeout seals the previous
    /// transcript before the new turn is added.
    pub async fn ingest_turn(
        &self,
        conversation_id: &str,
        message: ChatMessage,
    ) -> Result<TurnOutcome, RecollectError> {
        let turn_id = match &self.turn_log {
            Some(turn_log) => Some(turn_log.append_turn(conversation_id, &message).await?),
            None => None,
        };

        let at = message.timestamp;
        let (jobs, open_messages) = self.registry.update(conversation_id, |entry| {
            let mut jobs = Vec::new();

            if let Some(last) = entry.last_turn_at {
                let result = self.detector.evaluate(&entry.transcript, gap(last, at));
                if result.is_boundary {
                    let keep = messages_to_seal(entry, &result);
                    jobs.extend(entry.seal(result, keep, at));
                }
            }

            entry.last_turn_at = Some(at);
            // The open transcript is never sealed, so this cannot fail.
            match entry.transcript.append(message) {
                Ok(()) => entry.turn_ids.extend(turn_id),
                Err(e) => warn!(conversation_id, error = %e, "dropping turn"),
            }

            let result = self.detector.evaluate(&entry.transcript, Duration::ZERO);
            if result.is_boundary {
                let keep = messages_to_seal(entry, &result);
                jobs.extend(entry.seal(result, keep, at));
            }
            (jobs, entry.transcript.message_count())
        });

        let sealed = self.dispatch(jobs);
        debug!(conversation_id, open_messages, sealed = sealed.len(), "turn ingested");
        Ok(TurnOutcome {
            sealed,
            open_messages,
        })
    }

    /// Seal a conversation on request. `Ok(None)` if it has no open turns.
    pub fn close(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<BoundaryDetectionEvent>, RecollectError> {
        let result = BoundaryDetectionResult::triggered(BoundaryTriggerReason::ExplicitClose, 1.0);
        let job = self.registry.update_existing(conversation_id, |entry| {
            let keep = entry.transcript.message_count();
            entry.seal(result, keep, at)
        })?;
        Ok(self.dispatch(job.into_iter().collect()).pop())
    }

    /// Seal every conversation whose last turn is older than the idle timeout.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> Vec<BoundaryDetectionEvent> {
        let mut jobs = Vec::new();
        for conversation_id in self.registry.conversation_ids() {
            let job = self.registry.update_existing(&conversation_id, |entry| {
                let last = entry.last_turn_at?;
                let result = self.detector.evaluate(&entry.transcript, gap(last, now));
                if !result.is_boundary {
                    return None;
                }
                let keep = messages_to_seal(entry, &result);
                entry.seal(result, keep, now)
            });
            if let Ok(Some(job)) = job {
                jobs.push(job);
            }
        }
        self.dispatch(jobs)
    }

    /// Run [`Self::sweep_idle`] every `interval` until `cancel` fires.
    pub fn spawn_idle_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let sealed = tracker.sweep_idle(Utc::now());
                        if !sealed.is_empty() {
                            info!(count = sealed.len(), "idle sweep sealed conversations");
                        }
                    }
                }
            }
            debug!("idle sweeper stopped");
        })
    }

    /// Rebuild open transcripts from the turn log after a restart.
    ///
    /// Conversations already known to the tracker are left alone. Returns the
    /// number restored.
    pub async fn restore(&self, limit: usize) -> Result<usize, RecollectError> {
        let Some(turn_log) = &self.turn_log else {
            return Ok(0);
        };
        let mut restored = 0;
        for conversation_id in turn_log.unsealed_conversations().await? {
            if self.registry.contains(&conversation_id) {
                continue;
            }
            let turns = turn_log.recent_turns(&conversation_id, limit).await?;
            let Some(last_at) = turns.last().map(|t| t.message.timestamp) else {
                continue;
            };
            let (turn_ids, messages): (Vec<_>, Vec<_>) =
                turns.into_iter().map(|t| (t.id, t.message)).unzip();
            self.registry.update(&conversation_id, |entry| {
                entry.transcript = recollect_core::ConversationTranscript::from_messages(
                    &conversation_id,
                    messages,
                );
                entry.last_turn_at = Some(last_at);
                entry.turn_ids = turn_ids;
            });
            restored += 1;
        }
        info!(restored, "conversations restored from turn log");
        Ok(restored)
    }

    pub fn status(&self, conversation_id: &str) -> Result<ConversationStatus, RecollectError> {
        self.registry.status(conversation_id)
    }

    /// Wait for all queued extraction to finish.
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    /// Drain the worker pool. Sealings after this are recorded as failed.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    fn dispatch(&self, jobs: Vec<ExtractionJob>) -> Vec<BoundaryDetectionEvent> {
        jobs.into_iter()
            .map(|job| {
                let event = job.event.clone();
                if let Err(e) = self.pool.submit(job) {
                    warn!(conversation_id = %event.conversation_id, error = %e, "sealed without extraction");
                }
                event
            })
            .collect()
    }
}
