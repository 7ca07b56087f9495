// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` wires the full stack with mock adapters, a temp SQLite
//! database, and a temp transcript directory. Time is driven by message
//! timestamps, so tests pick their own clock with [`at`].

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use recollect_agent::{
    ConversationRegistry, ConversationTracker, SealPipeline, TurnOutcome, WorkerPool,
};
use recollect_config::model::{RecollectConfig, TokenizerKind};
use recollect_context::{AssembledContext, ContextAssembler};
use recollect_core::{ChatMessage, RecollectError, TranscriptStore, TurnLog};
use recollect_memory::{
    AccessTracker, BoundaryDetector, BoundaryRules, EmbeddingRetrievalService,
    InMemoryVectorIndex, MemoryExtractor, SqliteAccessStore, SqliteVectorIndex, VectorIndex,
};
use recollect_resilience::RetryPolicy;
use recollect_storage::{Database, FileTranscriptStore, SqliteTurnLog};

use crate::mock_embedder::KeywordEmbedder;
use crate::mock_provider::MockProvider;

/// `2026-01-01T00:00:00Z` plus `seconds`.
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        + Duration::seconds(seconds)
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    config: RecollectConfig,
    in_memory_index: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = RecollectConfig::default();
        config.provider.retry.max_attempts = 2;
        config.provider.retry.initial_backoff_ms = 1;
        config.provider.retry.max_backoff_ms = 1;
        config.budget.tokenizer = TokenizerKind::Heuristic;
        config.extraction.workers = 2;
        Self {
            responses: Vec::new(),
            config,
            in_memory_index: false,
        }
    }

    /// Set mock provider responses, consumed one per extraction attempt.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Adjust the config before the stack is wired.
    pub fn with_config(mut self, edit: impl FnOnce(&mut RecollectConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Index memories in memory instead of in SQLite.
    pub fn with_in_memory_index(mut self) -> Self {
        self.in_memory_index = true;
        self
    }

    pub async fn build(self) -> Result<TestHarness, RecollectError> {
        let temp_dir = tempfile::TempDir::new().map_err(RecollectError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path.to_string_lossy()).await?;

        let turn_log = Arc::new(SqliteTurnLog::new(db.clone()));
        let transcripts = Arc::new(FileTranscriptStore::new(temp_dir.path().join("transcripts")));
        let index: Arc<dyn VectorIndex> = if self.in_memory_index {
            Arc::new(InMemoryVectorIndex::new())
        } else {
            Arc::new(SqliteVectorIndex::new(db.clone()))
        };

        let provider = Arc::new(if self.responses.is_empty() {
            MockProvider::new()
        } else {
            MockProvider::with_responses(self.responses)
        });
        let embedder = Arc::new(KeywordEmbedder::new());

        let retry = RetryPolicy::from_config(&self.config.provider.retry, None);
        let retrieval = Arc::new(EmbeddingRetrievalService::new(
            embedder.clone(),
            index.clone(),
            retry.clone(),
        ));
        let extractor = Arc::new(MemoryExtractor::new(
            provider.clone(),
            retry,
            (&self.config.extraction).into(),
        ));

        let access = Arc::new(AccessTracker::with_store(Arc::new(SqliteAccessStore::new(
            db.clone(),
        ))));
        let assembler =
            ContextAssembler::from_config(&self.config, retrieval.clone(), access.clone())?;

        let tracker = wire_tracker(
            &self.config,
            extractor.clone(),
            retrieval.clone(),
            turn_log.clone(),
            transcripts.clone(),
        );

        Ok(TestHarness {
            provider,
            embedder,
            index,
            turn_log,
            transcripts,
            retrieval,
            access,
            assembler,
            tracker,
            config: self.config,
            extractor,
            _temp_dir: temp_dir,
        })
    }
}

fn wire_tracker(
    config: &RecollectConfig,
    extractor: Arc<MemoryExtractor>,
    retrieval: Arc<EmbeddingRetrievalService>,
    turn_log: Arc<SqliteTurnLog>,
    transcripts: Arc<FileTranscriptStore>,
) -> Arc<ConversationTracker> {
    let registry = Arc::new(ConversationRegistry::new());
    let turn_log: Arc<dyn TurnLog> = turn_log;
    let transcripts: Arc<dyn TranscriptStore> = transcripts;
    let pipeline = Arc::new(SealPipeline::new(
        extractor,
        retrieval,
        transcripts,
        Some(turn_log.clone()),
        registry.clone(),
    ));
    let pool = Arc::new(WorkerPool::spawn(
        pipeline,
        config.extraction.workers,
        config.extraction.queue_capacity,
    ));
    let detector = BoundaryDetector::new(BoundaryRules::from(&config.boundary));
    Arc::new(ConversationTracker::new(
        detector,
        registry,
        pool,
        Some(turn_log),
    ))
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// The mock LLM provider used for extraction.
    pub provider: Arc<MockProvider>,
    /// The deterministic embedder.
    pub embedder: Arc<KeywordEmbedder>,
    pub index: Arc<dyn VectorIndex>,
    pub turn_log: Arc<SqliteTurnLog>,
    pub transcripts: Arc<FileTranscriptStore>,
    pub retrieval: Arc<EmbeddingRetrievalService>,
    pub access: Arc<AccessTracker>,
    pub assembler: ContextAssembler,
    pub config: RecollectConfig,
    extractor: Arc<MemoryExtractor>,
    tracker: Arc<ConversationTracker>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default settings.
    pub async fn new() -> Result<Self, RecollectError> {
        Self::builder().build().await
    }

    pub fn tracker(&self) -> &Arc<ConversationTracker> {
        &self.tracker
    }

    /// A tracker over the same storage with fresh in-process state, as after
    /// a restart. The harness keeps using its original tracker.
    pub fn new_tracker(&self) -> Arc<ConversationTracker> {
        wire_tracker(
            &self.config,
            self.extractor.clone(),
            self.retrieval.clone(),
            self.turn_log.clone(),
            self.transcripts.clone(),
        )
    }

    /// Ingest a user turn at `seconds` past the harness epoch.
    pub async fn say(
        &self,
        conversation_id: &str,
        text: &str,
        seconds: i64,
    ) -> Result<TurnOutcome, RecollectError> {
        self.tracker()
            .ingest_turn(conversation_id, ChatMessage::user(text, at(seconds)))
            .await
    }

    /// Ingest an assistant turn at `seconds` past the harness epoch.
    pub async fn reply(
        &self,
        conversation_id: &str,
        text: &str,
        seconds: i64,
    ) -> Result<TurnOutcome, RecollectError> {
        self.tracker()
            .ingest_turn(conversation_id, ChatMessage::assistant(text, at(seconds)))
            .await
    }

    /// Wait until every queued extraction has finished.
    pub async fn wait_idle(&self) {
        self.tracker().wait_idle().await;
    }

    /// Assemble context for `query` with the configured settings.
    pub async fn context(&self, query: &str) -> AssembledContext {
        self.assembler.assemble(query).await
    }

    pub async fn memory_count(&self) -> usize {
        self.index.count().await.unwrap_or(0)
    }

    pub async fn transcript_count(&self) -> usize {
        self.transcripts
            .list(usize::MAX)
            .await
            .map(|names| names.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_provider::memories_json;

    #[tokio::test]
    async fn close_extracts_and_context_finds_memory() {
        let harness = TestHarness::builder()
            .with_mock_responses(vec![memories_json(&[(
                "User drinks green tea every morning",
                "preference",
                "high",
            )])])
            .build()
            .await
            .unwrap();

        harness.say("c1", "I drink green tea every morning", 0).await.unwrap();
        harness.reply("c1", "Noted!", 5).await.unwrap();
        assert!(harness.tracker().close("c1", at(10)).unwrap().is_some());
        harness.wait_idle().await;

        assert_eq!(harness.memory_count().await, 1);
        assert_eq!(harness.transcript_count().await, 1);

        let context = harness.context("green tea").await;
        assert_eq!(context.selected.len(), 1);
        assert!(context.render().contains("green tea"));
    }

    #[test]
    fn epoch_is_fixed() {
        assert_eq!(at(60).to_rfc3339(), "2026-01-01T00:01:00+00:00");
    }
}
