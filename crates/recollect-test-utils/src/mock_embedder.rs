// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic bag-of-words embedder.
//!
//! Each lowercase word longer than two characters is hashed (FNV-1a) into one
//! of [`DIMENSIONS`] buckets. Texts sharing words get a positive cosine
//! similarity; texts with no words in common score zero.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use recollect_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, PluginAdapter,
    ProviderError, ProviderErrorKind, RecollectError,
};
use tokio::sync::Mutex;

pub const DIMENSIONS: usize = 256;

pub struct KeywordEmbedder {
    failures: Mutex<VecDeque<ProviderErrorKind>>,
    fail_all: AtomicBool,
    calls: AtomicU32,
}

fn bucket(word: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % DIMENSIONS as u64) as usize
}

/// Embeds `text` without going through the adapter.
pub fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSIONS];
    let lower = text.to_lowercase();
    for word in lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
    {
        vector[bucket(word)] += 1.0;
    }
    vector
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            fail_all: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    /// The next call fails with `kind`. Queued failures are used in order.
    pub async fn fail_next(&self, kind: ProviderErrorKind) {
        self.failures.lock().await.push_back(kind);
    }

    /// While set, every call fails as unavailable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_all.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecollectError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RecollectError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for KeywordEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecollectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ProviderError::new(
                ProviderErrorKind::Unavailable,
                "keyword-embedder",
                "embedder switched off",
            )
            .into());
        }
        if let Some(kind) = self.failures.lock().await.pop_front() {
            return Err(ProviderError::new(kind, "keyword-embedder", "scripted failure").into());
        }
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| embed_text(t)).collect(),
            dimensions: DIMENSIONS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recollect_memory::cosine_similarity;

    #[test]
    fn shared_words_are_similar() {
        let a = embed_text("User drinks green tea");
        let b = embed_text("green tea please");
        let c = embed_text("deploy the kubernetes cluster");
        assert!(cosine_similarity(&a, &b) > 0.5);
        assert_eq!(cosine_similarity(&a, &c), 0.0);
    }

    #[test]
    fn short_words_are_ignored() {
        assert!(embed_text("a an to").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn scripted_failures_then_success() {
        let embedder = KeywordEmbedder::new();
        embedder.fail_next(ProviderErrorKind::Timeout).await;
        assert!(embedder.embed(EmbeddingInput::single("tea")).await.is_err());
        let out = embedder.embed(EmbeddingInput::single("tea")).await.unwrap();
        assert_eq!(out.dimensions, DIMENSIONS);
        assert_eq!(embedder.calls(), 2);

        embedder.set_unavailable(true);
        assert!(embedder.embed(EmbeddingInput::single("tea")).await.is_err());
    }
}
