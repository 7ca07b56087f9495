// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wires the memory pipeline from configuration.
//!
//! One SQLite database holds every table. Transcripts live as JSON files in
//! their own directory. The chat and embedding adapters talk to an
//! OpenAI-compatible endpoint.

use std::sync::Arc;
use std::time::Duration;

use recollect_agent::{ConversationRegistry, ConversationTracker, SealPipeline, WorkerPool};
use recollect_config::model::RecollectConfig;
use recollect_context::ContextAssembler;
use recollect_core::{RecollectError, TranscriptStore, TurnLog};
use recollect_memory::{
    AccessTracker, BoundaryDetector, BoundaryRules, EmbeddingRetrievalService, MemoryExtractor,
    SqliteAccessStore, SqliteVectorIndex, VectorIndex,
};
use recollect_openai::{OpenAiEmbedder, OpenAiProvider};
use recollect_resilience::RetryPolicy;
use recollect_storage::{Database, FileTranscriptStore, SqliteTurnLog};
use tracing::info;

/// Everything a command needs, built once per process.
pub struct Pipeline {
    pub db: Database,
    pub index: Arc<dyn VectorIndex>,
    pub tracker: Arc<ConversationTracker>,
    pub assembler: ContextAssembler,
}

impl Pipeline {
    pub async fn open(config: &RecollectConfig) -> Result<Self, RecollectError> {
        let db = Database::open(&config.storage.database_path).await?;
        let turn_log: Arc<dyn TurnLog> = Arc::new(SqliteTurnLog::new(db.clone()));
        let transcripts: Arc<dyn TranscriptStore> =
            Arc::new(FileTranscriptStore::new(&config.storage.transcripts_dir));
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::new(db.clone()));

        let provider = Arc::new(OpenAiProvider::new(&config.provider)?);
        let embedder = Arc::new(OpenAiEmbedder::new(&config.provider)?);

        // Retries wrap each HTTP call; the client enforces the same timeout.
        let retry = RetryPolicy::from_config(
            &config.provider.retry,
            Some(Duration::from_millis(config.provider.request_timeout_ms)),
        );
        let retrieval = Arc::new(EmbeddingRetrievalService::new(
            embedder,
            index.clone(),
            retry.clone(),
        ));
        let extractor = Arc::new(MemoryExtractor::new(
            provider,
            retry,
            (&config.extraction).into(),
        ));

        let registry = Arc::new(ConversationRegistry::new());
        let seal_pipeline = Arc::new(SealPipeline::new(
            extractor,
            retrieval.clone(),
            transcripts,
            Some(turn_log.clone()),
            registry.clone(),
        ));
        let pool = Arc::new(WorkerPool::spawn(
            seal_pipeline,
            config.extraction.workers,
            config.extraction.queue_capacity,
        ));
        let detector = BoundaryDetector::new(BoundaryRules::from(&config.boundary));
        let tracker = Arc::new(ConversationTracker::new(
            detector,
            registry,
            pool,
            Some(turn_log),
        ));

        let access = AccessTracker::with_store(Arc::new(SqliteAccessStore::new(db.clone())));
        let assembler = ContextAssembler::from_config(config, retrieval, Arc::new(access))?;

        info!(
            database = %config.storage.database_path,
            transcripts = %config.storage.transcripts_dir,
            workers = config.extraction.workers,
            "pipeline ready"
        );
        Ok(Self {
            db,
            index,
            tracker,
            assembler,
        })
    }
}
