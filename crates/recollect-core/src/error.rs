// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Recollect memory pipeline.
//!
//! Provider failures are a tagged [`ProviderError`] rather than a message
//! string so that retry policy can branch on [`ProviderErrorKind`] and logs
//! can carry the provider name and correlation id as structured fields.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Failure classes reported by LLM and embedding providers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Credentials were rejected (HTTP 401/403).
    Authentication,
    /// The provider asked us to slow down (HTTP 429).
    RateLimited,
    /// The request did not complete within its deadline.
    Timeout,
    /// The provider is down or returned a server error.
    Unavailable,
    /// The provider answered, but the body could not be interpreted.
    MalformedOutput,
}

impl ProviderErrorKind {
    /// Whether a request failing with this kind may succeed on a later attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Unavailable)
    }
}

/// A single failed provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider} {kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub correlation_id: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            correlation_id: None,
            message: message.into(),
        }
    }

    /// Attaches the provider-assigned request id, when the provider sent one.
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// The primary error type used across all Recollect crates.
#[derive(Debug, Error)]
pub enum RecollectError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database, filesystem, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A single provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A provider call kept failing until the retry budget ran out.
    #[error("provider {provider} unavailable after {attempts} attempts: {last}")]
    ProviderUnavailable {
        provider: String,
        attempts: u32,
        last: Box<ProviderError>,
    },

    /// A transcript, conversation, or memory that the caller named does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A value broke a construction-time invariant (weights, budgets, thresholds).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A turn was appended to a transcript that has already been sealed.
    #[error("conversation {conversation_id} is sealed")]
    Sealed { conversation_id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RecollectError {
    /// Wraps any error as a storage failure.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for a single provider failure that the retry policy should try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
