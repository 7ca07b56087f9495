// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-progress and sealed conversation transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RecollectError;
use crate::types::ChatMessage;

/// Ordered chat messages of one conversation.
///
/// Fields are private so that `message_count` always equals the number of
/// messages and `first_message_hash` always matches the first message.
/// Deserialization re-checks both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TranscriptRepr", into = "TranscriptRepr")]
pub struct ConversationTranscript {
    conversation_id: String,
    messages: Vec<ChatMessage>,
    first_message_hash: Option<String>,
    sealed_at: Option<DateTime<Utc>>,
}

impl ConversationTranscript {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            first_message_hash: None,
            sealed_at: None,
        }
    }

    /// Builds an unsealed transcript from already-ordered messages.
    pub fn from_messages(conversation_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        let first_message_hash = messages.first().map(hash_message);
        Self {
            conversation_id: conversation_id.into(),
            messages,
            first_message_hash,
            sealed_at: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Idempotency key of this transcript, `None` until the first message arrives.
    pub fn first_message_hash(&self) -> Option<&str> {
        self.first_message_hash.as_deref()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed_at.is_some()
    }

    pub fn sealed_at(&self) -> Option<DateTime<Utc>> {
        self.sealed_at
    }

    /// Appends a message. Fails once the transcript is sealed.
    pub fn append(&mut self, message: ChatMessage) -> Result<(), RecollectError> {
        if self.is_sealed() {
            return Err(RecollectError::Sealed {
                conversation_id: self.conversation_id.clone(),
            });
        }
        if self.messages.is_empty() {
            self.first_message_hash = Some(hash_message(&message));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Marks the transcript immutable. Sealing twice keeps the first timestamp.
    pub fn seal(&mut self, at: DateTime<Utc>) {
        if self.sealed_at.is_none() {
            self.sealed_at = Some(at);
        }
    }

    /// Plain-text rendering, one `role: content` line per message.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for msg in &self.messages {
            out.push_str(&msg.role.to_string());
            out.push_str(": ");
            out.push_str(&msg.content);
            out.push('\n');
        }
        out
    }
}

/// Deterministic digest of a message's content: SHA-256, hex encoded.
///
/// Role and timestamp are left out so that a reconnect re-sending the same
/// opening message under a new clock still maps to the same key.
pub fn hash_message(message: &ChatMessage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.content.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Serialize, Deserialize)]
struct TranscriptRepr {
    conversation_id: String,
    first_message_hash: Option<String>,
    message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sealed_at: Option<DateTime<Utc>>,
    messages: Vec<ChatMessage>,
}

impl From<ConversationTranscript> for TranscriptRepr {
    fn from(t: ConversationTranscript) -> Self {
        Self {
            message_count: t.messages.len(),
            conversation_id: t.conversation_id,
            first_message_hash: t.first_message_hash,
            sealed_at: t.sealed_at,
            messages: t.messages,
        }
    }
}

impl TryFrom<TranscriptRepr> for ConversationTranscript {
    type Error = String;

    fn try_from(repr: TranscriptRepr) -> Result<Self, Self::Error> {
        if repr.message_count != repr.messages.len() {
            return Err(format!(
                "message_count {} does not match {} messages",
                repr.message_count,
                repr.messages.len()
            ));
        }
        let expected = repr.messages.first().map(hash_message);
        if repr.first_message_hash != expected {
            return Err("first_message_hash does not match the first message".to_string());
        }
        Ok(Self {
            conversation_id: repr.conversation_id,
            messages: repr.messages,
            first_message_hash: expected,
            sealed_at: repr.sealed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn hash_is_set_by_first_append_only() {
        let mut t = ConversationTranscript::new("c1");
        assert!(t.first_message_hash().is_none());

        t.append(ChatMessage::user("hello", at(0))).unwrap();
        let first = t.first_message_hash().unwrap().to_string();
        t.append(ChatMessage::assistant("hi there", at(1))).unwrap();

        assert_eq!(t.first_message_hash(), Some(first.as_str()));
        assert_eq!(t.message_count(), 2);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn same_first_message_same_hash() {
        let a = ConversationTranscript::from_messages(
            "c1",
            vec![ChatMessage::user("I drink green tea every morning", at(0))],
        );
        // Reconnect: new conversation id, later client clock.
        let b = ConversationTranscript::from_messages(
            "c1-reconnect",
            vec![ChatMessage::user("I drink green tea every morning", at(30))],
        );
        let c = ConversationTranscript::from_messages(
            "c1",
            vec![ChatMessage::user("I drink black coffee", at(0))],
        );
        assert_eq!(a.first_message_hash(), b.first_message_hash());
        assert_ne!(a.first_message_hash(), c.first_message_hash());
    }

    #[test]
    fn hash_covers_content_only() {
        let user = ChatMessage::user("hello", at(0));
        let assistant = ChatMessage::assistant("hello", at(7));
        assert_eq!(hash_message(&user), hash_message(&assistant));
        // sha256("hello")
        assert_eq!(
            hash_message(&user),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn sealed_transcript_rejects_appends() {
        let mut t = ConversationTranscript::new("c1");
        t.append(ChatMessage::user("hello", at(0))).unwrap();
        t.seal(at(5));
        t.seal(at(10));
        assert_eq!(t.sealed_at(), Some(at(5)));

        let err = t.append(ChatMessage::user("again", at(11))).unwrap_err();
        assert!(matches!(err, RecollectError::Sealed { .. }));
        assert_eq!(t.message_count(), 1);
    }

    #[test]
    fn json_round_trip_preserves_invariants() {
        let mut t = ConversationTranscript::new("c1");
        t.append(ChatMessage::user("I live in Lisbon", at(0))).unwrap();
        t.seal(at(60));

        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"message_count\":1"));
        let back: ConversationTranscript = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn deserialization_rejects_count_mismatch() {
        let json = r#"{"conversation_id":"c1","first_message_hash":null,"message_count":3,"messages":[]}"#;
        let err = serde_json::from_str::<ConversationTranscript>(json).unwrap_err();
        assert!(err.to_string().contains("message_count"));
    }

    #[test]
    fn deserialization_rejects_forged_hash() {
        let json = r#"{"conversation_id":"c1","first_message_hash":"abc","message_count":1,
            "messages":[{"role":"user","content":"hi","timestamp":"2024-01-01T00:00:00Z"}]}"#;
        assert!(serde_json::from_str::<ConversationTranscript>(json).is_err());
    }

    #[test]
    fn render_lists_roles() {
        let t = ConversationTranscript::from_messages(
            "c1",
            vec![
                ChatMessage::user("I prefer tea", at(0)),
                ChatMessage::assistant("Noted.", at(1)),
            ],
        );
        assert_eq!(t.render(), "user: I prefer tea\nassistant: Noted.\n");
    }
}
