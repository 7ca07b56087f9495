// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the pipeline stages and adapter traits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Embedding,
    Storage,
}

// --- Conversation types ---

/// Author of a chat message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat turn. Immutable once appended to a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, content, timestamp)
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, content, timestamp)
    }
}

// --- Memory types ---

/// Domain tag attached to every extracted memory.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Preference,
    Fact,
    Task,
    Relationship,
    Decision,
}

/// How sure the extractor was about a memory. Ordered `Low < Medium < High`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Lowest numeric confidence that maps to this level.
    pub fn floor(self) -> f64 {
        match self {
            Self::Low => 0.0,
            Self::Medium => 0.5,
            Self::High => 0.8,
        }
    }

    /// Maps a numeric confidence in `[0, 1]` to the highest level whose floor it reaches.
    pub fn from_score(score: f64) -> Self {
        if score >= Self::High.floor() {
            Self::High
        } else if score >= Self::Medium.floor() {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// What the budget manager does with the first candidate that does not fit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Skip it and keep trying lower-ranked candidates.
    #[default]
    DropLowestRank,
    /// Cut its text to the remaining budget, then stop.
    TruncateText,
    /// Stop taking full items and add one summary line for everything left.
    SummarizeOverflow,
}

// --- Boundary types ---

/// Why a conversation was considered finished.
///
/// Variant order is the detector's precedence order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BoundaryTriggerReason {
    ExplicitClose,
    TurnLimit,
    IdleTimeout,
    TopicShift,
}

/// Outcome of a single boundary evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryDetectionResult {
    pub is_boundary: bool,
    pub reason: Option<BoundaryTriggerReason>,
    /// How certain the detector is, in `[0, 1]`. Zero when no trigger matched.
    pub confidence: f32,
}

impl BoundaryDetectionResult {
    /// No trigger matched.
    pub fn none() -> Self {
        Self {
            is_boundary: false,
            reason: None,
            confidence: 0.0,
        }
    }

    pub fn triggered(reason: BoundaryTriggerReason, confidence: f32) -> Self {
        Self {
            is_boundary: true,
            reason: Some(reason),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A boundary result bound to the conversation it sealed.
///
/// Emitted exactly once per sealing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryDetectionEvent {
    pub result: BoundaryDetectionResult,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

// --- Provider types ---

/// A message sent to an LLM provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

/// A single-shot completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A completed provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Texts to embed in a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

impl EmbeddingInput {
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            texts: vec![text.into()],
        }
    }
}

/// One vector per input text, all of the same dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}
