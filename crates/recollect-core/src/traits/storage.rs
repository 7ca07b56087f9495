// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence traits for sealed transcripts and raw chat turns.

use async_trait::async_trait;

use crate::error::RecollectError;
use crate::transcript::ConversationTranscript;
use crate::types::ChatMessage;

/// Durable storage of sealed transcripts, keyed by filename.
///
/// `store` must be idempotent under the same `first_message_hash`: storing a
/// second transcript with an already-stored hash returns the existing filename.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Persists a transcript and returns its filename.
    async fn store(&self, transcript: &ConversationTranscript) -> Result<String, RecollectError>;

    /// Loads a transcript by filename. Unknown names yield [`RecollectError::NotFound`].
    async fn load(&self, filename: &str) -> Result<ConversationTranscript, RecollectError>;

    /// Lists up to `limit` filenames, newest first.
    async fn list(&self, limit: usize) -> Result<Vec<String>, RecollectError>;

    /// Returns the filename already holding a transcript with this hash, if any.
    async fn find_by_hash(&self, first_message_hash: &str)
    -> Result<Option<String>, RecollectError>;
}

/// A turn as recorded in the [`TurnLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedTurn {
    /// Log position. Increases with every append across all conversations.
    pub id: i64,
    pub message: ChatMessage,
}

/// Append-only log of raw chat turns per conversation.
///
/// Used to seed conversation state on process restart.
#[async_trait]
pub trait TurnLog: Send + Sync {
    /// Records a turn and returns its log id.
    async fn append_turn(
        &self,
        conversation_id: &str,
        message: &ChatMessage,
    ) -> Result<i64, RecollectError>;

    /// The last `limit` turns of a conversation not yet covered by a seal,
    /// in log order.
    async fn recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<LoggedTurn>, RecollectError>;

    /// Conversations with at least one unsealed turn.
    async fn unsealed_conversations(&self) -> Result<Vec<String>, RecollectError>;

    /// Marks every turn of the conversation with a log id up to and including
    /// `through_turn_id` as sealed. Returns the number of turns affected.
    async fn mark_sealed(
        &self,
        conversation_id: &str,
        through_turn_id: i64,
    ) -> Result<usize, RecollectError>;
}
