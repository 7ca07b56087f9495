// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end context assembly over an in-memory index.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use recollect_core::{
    AdapterType, ConfidenceLevel, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput,
    HealthStatus, MemoryCategory, PluginAdapter, ProviderError, ProviderErrorKind,
    RecollectError, TruncationStrategy,
};
use recollect_context::{
    AssemblyOutcome, AssemblySettings, BudgetManager, ContextAssembler, HeuristicCounter,
    Ranker, TokenBudget,
};
use recollect_config::model::RankingConfig;
use recollect_memory::{
    AccessStore, AccessTracker, EmbeddingRetrievalService, ExtractedMemory, InMemoryVectorIndex,
    SqliteAccessStore,
};
use recollect_resilience::RetryPolicy;
use recollect_storage::Database;

const VOCAB: [&str; 6] = ["coffee", "tea", "dog", "cat", "rust", "porto"];

/// Counts vocabulary words. Can be switched into failure or stall mode.
#[derive(Default)]
struct VocabEmbedder {
    failing: AtomicBool,
    stalling: AtomicBool,
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
        if self.stalling.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::new(ProviderErrorKind::Unavailable, "vocab", "down").into());
        }
        let embeddings = input
            .texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                VOCAB.iter().map(|w| lower.matches(w).count() as f32).collect()
            })
            .collect();
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: VOCAB.len(),
        })
    }
}

struct Fixture {
    embedder: Arc<VocabEmbedder>,
    retrieval: Arc<EmbeddingRetrievalService>,
    assembler: ContextAssembler,
}

fn fixture(max_tokens: usize) -> Fixture {
    let embedder = Arc::new(VocabEmbedder::default());
    let retrieval = Arc::new(EmbeddingRetrievalService::new(
        embedder.clone(),
        Arc::new(InMemoryVectorIndex::new()),
        RetryPolicy::no_retry(),
    ));
    let assembler = assembler(retrieval.clone(), AccessTracker::new(), max_tokens);
    Fixture {
        embedder,
        retrieval,
        assembler,
    }
}

fn assembler(
    retrieval: Arc<EmbeddingRetrievalService>,
    access: AccessTracker,
    max_tokens: usize,
) -> ContextAssembler {
    ContextAssembler::new(
        retrieval,
        Arc::new(access),
        Ranker::from_config(&RankingConfig::default()).unwrap(),
        BudgetManager::new(Arc::new(HeuristicCounter)),
        AssemblySettings {
            top_k: 10,
            min_similarity: 0.1,
            dedup_threshold: 0.9,
            deadline: Duration::from_millis(200),
            budget: TokenBudget::new(max_tokens).unwrap(),
            strategy: TruncationStrategy::DropLowestRank,
        },
    )
}

async fn index(fixture: &Fixture, conv: &str, text: &str, category: MemoryCategory) -> String {
    fixture
        .retrieval
        .embed_and_index(
            &ExtractedMemory {
                text: text.into(),
                category,
                confidence_level: ConfidenceLevel::High,
                source_conversation_id: conv.into(),
            },
            Utc::now(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn assembles_deduplicated_ranked_context_and_records_access() {
    let f = fixture(200);
    let a = index(&f, "c1", "User drinks coffee every morning", MemoryCategory::Preference).await;
    let b = index(&f, "c2", "User loves coffee", MemoryCategory::Preference).await;
    let dog = index(&f, "c1", "User has a dog named Max", MemoryCategory::Fact).await;

    let context = f.assembler.assemble("how do I like my coffee?").await;

    assert_eq!(context.outcome, AssemblyOutcome::Complete);
    // The two coffee memories embed identically and collapse into one entry.
    assert_eq!(context.selected.len(), 1);
    let rendered = context.render();
    assert!(rendered.starts_with("## Relevant Memories\n"));
    assert!(rendered.contains("(preference)"));
    assert!(!rendered.contains("dog"));

    let access = f.assembler.access();
    assert_eq!(access.get(&a).access_count, 1);
    assert_eq!(access.get(&b).access_count, 1);
    assert_eq!(access.get(&dog).access_count, 0);
    assert!(context.total_tokens <= 200);
}

#[tokio::test]
async fn access_counts_persist_across_trackers() {
    let f = fixture(200);
    let tea = index(&f, "c1", "User likes tea", MemoryCategory::Preference).await;
    let db = Database::open_in_memory().await.unwrap();
    let store: Arc<dyn AccessStore> = Arc::new(SqliteAccessStore::new(db));

    // Two assemblers with their own trackers, as two processes would have.
    for _ in 0..2 {
        let access = AccessTracker::with_store(store.clone());
        let assembler = assembler(f.retrieval.clone(), access, 200);
        let context = assembler.assemble("tea").await;
        assert_eq!(context.outcome, AssemblyOutcome::Complete);
    }

    let stored = store.load(std::slice::from_ref(&tea)).await.unwrap();
    assert_eq!(stored[0].access_count, 2);

    // A fresh tracker ranks with the stored history.
    let fresh = AccessTracker::with_store(store);
    fresh.load(std::slice::from_ref(&tea)).await.unwrap();
    assert_eq!(fresh.get(&tea).access_count, 2);
}

#[tokio::test]
async fn no_relevant_memories_is_empty_not_degraded() {
    let f = fixture(200);
    index(&f, "c1", "User has a cat", MemoryCategory::Fact).await;
    let context = f.assembler.assemble("tell me about rust").await;
    assert_eq!(context.outcome, AssemblyOutcome::Empty);
    assert!(context.render().is_empty());
}

#[tokio::test]
async fn provider_failure_degrades_to_empty_context() {
    let f = fixture(200);
    index(&f, "c1", "User likes tea", MemoryCategory::Preference).await;
    f.embedder.failing.store(true, Ordering::SeqCst);

    let context = f.assembler.assemble("tea").await;
    assert!(context.is_degraded());
    assert!(context.selected.is_empty());
    assert!(f.assembler.access().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retrieval_deadline_degrades_instead_of_hanging() {
    let f = fixture(200);
    index(&f, "c1", "User lives in Porto", MemoryCategory::Fact).await;
    f.embedder.stalling.store(true, Ordering::SeqCst);

    let context = f.assembler.assemble("porto").await;
    match context.outcome {
        AssemblyOutcome::Degraded(reason) => assert!(reason.contains("timed out")),
        other => panic!("expected degraded outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn budget_limits_selection() {
    let f = fixture(8);
    index(&f, "c1", "User drinks coffee and tea", MemoryCategory::Preference).await;
    index(&f, "c1", "User drinks tea", MemoryCategory::Preference).await;
    let context = f.assembler.assemble("coffee tea").await;
    assert!(context.total_tokens <= 8);
    assert_eq!(context.selected.len(), 1);
}
