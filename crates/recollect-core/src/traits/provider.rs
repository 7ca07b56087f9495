// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM provider adapter trait, consumed by memory extraction.

use async_trait::async_trait;

use crate::error::RecollectError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse};

/// Adapter for an LLM completion API.
///
/// Implementations report failures as [`RecollectError::Provider`] with the
/// matching [`crate::ProviderErrorKind`] so callers can decide whether to retry.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, RecollectError>;
}
