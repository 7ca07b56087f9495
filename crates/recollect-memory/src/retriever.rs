// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding and similarity retrieval over a [`VectorIndex`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use recollect_core::{
    EmbeddingAdapter, EmbeddingInput, ProviderError, ProviderErrorKind, RecollectError,
};
use recollect_resilience::{RetryPolicy, retry};
use tracing::debug;

use crate::index::VectorIndex;
use crate::types::{ExtractedMemory, MemoryRecord, RetrievalQuery, RetrievalResponse};

/// Embeds memories into the index and answers retrieval queries.
pub struct EmbeddingRetrievalService {
    embedder: Arc<dyn EmbeddingAdapter>,
    index: Arc<dyn VectorIndex>,
    retry: RetryPolicy,
}

impl EmbeddingRetrievalService {
    pub fn new(
        embedder: Arc<dyn EmbeddingAdapter>,
        index: Arc<dyn VectorIndex>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            index,
            retry,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Embed `memory` and upsert it under its deterministic id.
    ///
    /// Indexing the same memory again overwrites the stored vector.
    pub async fn embed_and_index(
        &self,
        memory: &ExtractedMemory,
        created_at: DateTime<Utc>,
    ) -> Result<String, RecollectError> {
        let vector = self.embed_one(&memory.text, "embed_memory").await?;
        let record = MemoryRecord::from_extracted(memory, created_at);
        let id = record.id.clone();
        self.index.upsert(record, vector).await?;
        debug!(memory_id = %id, "memory indexed");
        Ok(id)
    }

    /// Embed the query text and return the nearest memories.
    ///
    /// An empty response means nothing relevant was found. A failure to embed
    /// is an error, never an empty response.
    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<RetrievalResponse, RecollectError> {
        if query.top_k == 0 || query.text.trim().is_empty() {
            return Ok(RetrievalResponse::empty());
        }
        let vector = self.embed_one(&query.text, "embed_query").await?;
        let results = self
            .index
            .query(&vector, query.top_k, &query.filters)
            .await?;
        debug!(candidates = results.len(), top_k = query.top_k, "retrieval complete");
        Ok(RetrievalResponse::new(results))
    }

    async fn embed_one(&self, text: &str, operation: &str) -> Result<Vec<f32>, RecollectError> {
        let provider = self.embedder.name().to_string();
        retry(&self.retry, &provider, operation, |_| {
            let embedder = self.embedder.clone();
            let input = EmbeddingInput::single(text);
            let provider = provider.clone();
            async move {
                let output = embedder.embed(input).await?;
                single_vector(output.embeddings).map_err(|detail| {
                    RecollectError::from(ProviderError::new(
                        ProviderErrorKind::MalformedOutput,
                        provider,
                        detail,
                    ))
                })
            }
        })
        .await
    }
}

/// The embedder must return exactly one non-empty, finite vector.
fn single_vector(mut embeddings: Vec<Vec<f32>>) -> Result<Vec<f32>, String> {
    if embeddings.len() != 1 {
        return Err(format!("expected 1 embedding, got {}", embeddings.len()));
    }
    let vector = embeddings.remove(0);
    if vector.is_empty() {
        return Err("embedding is empty".to_string());
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err("embedding contains non-finite values".to_string());
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryVectorIndex;
    use async_trait::async_trait;
    use recollect_core::{
        AdapterType, ConfidenceLevel, EmbeddingOutput, HealthStatus, MemoryCategory,
        PluginAdapter,
    };
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Maps each text to counts of a fixed vocabulary.
    struct VocabEmbedder {
        failures: Mutex<Vec<ProviderErrorKind>>,
        calls: AtomicU32,
        malformed: bool,
    }

    const VOCAB: [&str; 4] = ["coffee", "tea", "dog", "rust"];

    impl VocabEmbedder {
        fn new() -> Self {
            Self {
                failures: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
                malformed: false,
            }
        }
    }

    #[async_trait]
    impl PluginAdapter for VocabEmbedder {
        fn name(&self) -> &str {
            "vocab"
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
    impl EmbeddingAdapter for VocabEmbedder {
        async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecollectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(kind) = self.failures.lock().unwrap().pop() {
                return Err(ProviderError::new(kind, "vocab", "scripted").into());
            }
            if self.malformed {
                return Ok(EmbeddingOutput {
                    embeddings: vec![],
                    dimensions: 0,
                });
            }
            let embeddings = input
                .texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    VOCAB
                        .iter()
                        .map(|w| lower.matches(w).count() as f32)
                        .collect()
                })
                .collect();
            Ok(EmbeddingOutput {
                embeddings,
                dimensions: VOCAB.len(),
            })
        }
    }

    fn memory(text: &str) -> ExtractedMemory {
        ExtractedMemory {
            text: text.into(),
            category: MemoryCategory::Preference,
            confidence_level: ConfidenceLevel::High,
            source_conversation_id: "conv".into(),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    fn service(embedder: VocabEmbedder) -> (EmbeddingRetrievalService, Arc<VocabEmbedder>) {
        let embedder = Arc::new(embedder);
        let service = EmbeddingRetrievalService::new(
            embedder.clone(),
            Arc::new(InMemoryVectorIndex::new()),
            fast_retry(),
        );
        (service, embedder)
    }

    #[tokio::test]
    async fn index_then_retrieve_in_similarity_order() {
        let (service, _) = service(VocabEmbedder::new());
        let now = Utc::now();
        service.embed_and_index(&memory("User drinks coffee"), now).await.unwrap();
        service.embed_and_index(&memory("User has a dog"), now).await.unwrap();
        service
            .embed_and_index(&memory("User likes coffee and tea"), now)
            .await
            .unwrap();

        let response = service
            .retrieve(&RetrievalQuery::new("coffee please", 10))
            .await
            .unwrap();
        let results: Vec<_> = response.collect();
        assert_eq!(results[0].memory.text, "User drinks coffee");
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn reindexing_is_idempotent() {
        let (service, _) = service(VocabEmbedder::new());
        let m = memory("User writes Rust");
        let id1 = service.embed_and_index(&m, Utc::now()).await.unwrap();
        let id2 = service.embed_and_index(&m, Utc::now()).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(service.index().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_index_is_empty_not_error() {
        let (service, _) = service(VocabEmbedder::new());
        let response = service
            .retrieve(&RetrievalQuery::new("anything about tea", 5))
            .await
            .unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let embedder = VocabEmbedder::new();
        embedder
            .failures
            .lock()
            .unwrap()
            .extend([ProviderErrorKind::RateLimited, ProviderErrorKind::Timeout]);
        let (service, embedder) = service(embedder);
        service.embed_and_index(&memory("tea time"), Utc::now()).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_is_provider_unavailable() {
        let embedder = VocabEmbedder::new();
        embedder
            .failures
            .lock()
            .unwrap()
            .extend([ProviderErrorKind::Unavailable; 3]);
        let (service, _) = service(embedder);
        let err = service
            .retrieve(&RetrievalQuery::new("dog", 5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecollectError::ProviderUnavailable { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn malformed_embedding_is_not_retried() {
        let mut embedder = VocabEmbedder::new();
        embedder.malformed = true;
        let (service, embedder) = service(embedder);
        let err = service
            .embed_and_index(&memory("dog"), Utc::now())
            .await
            .unwrap_err();
        match err {
            RecollectError::Provider(e) => assert_eq!(e.kind, ProviderErrorKind::MalformedOutput),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn single_vector_validation() {
        assert!(single_vector(vec![]).is_err());
        assert!(single_vector(vec![vec![1.0], vec![2.0]]).is_err());
        assert!(single_vector(vec![vec![]]).is_err());
        assert!(single_vector(vec![vec![f32::NAN]]).is_err());
        assert_eq!(single_vector(vec![vec![0.5, 0.5]]).unwrap(), vec![0.5, 0.5]);
    }
}
