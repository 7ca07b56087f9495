// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Recollect memory pipeline.
//!
//! This crate provides the error taxonomy, the conversation and provider
//! types, and the adapter traits implemented by the storage and provider
//! crates.

pub mod error;
pub mod traits;
pub mod transcript;
pub mod types;

pub use error::{ProviderError, ProviderErrorKind, RecollectError};
pub use transcript::ConversationTranscript;
pub use types::{
    AdapterType, BoundaryDetectionEvent, BoundaryDetectionResult, BoundaryTriggerReason,
    ChatMessage, ConfidenceLevel, EmbeddingInput, EmbeddingOutput, HealthStatus, MemoryCategory,
    ProviderMessage, ProviderRequest, ProviderResponse, Role, TokenUsage, TruncationStrategy,
};

pub use traits::{
    EmbeddingAdapter, LoggedTurn, PluginAdapter, ProviderAdapter, TranscriptStore, TurnLog,
};
