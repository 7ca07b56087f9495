// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Recollect integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Mock LLM provider with scripted extraction responses
//! - [`KeywordEmbedder`] - Deterministic bag-of-words embedder
//! - [`TestHarness`] - The full pipeline over temp storage

pub mod harness;
pub mod mock_embedder;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder, at};
pub use mock_embedder::KeywordEmbedder;
pub use mock_provider::{MockProvider, memories_json};
