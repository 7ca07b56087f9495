// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background extraction and indexing of sealed transcripts.
//!
//! Turn handlers enqueue [`ExtractionJob`]s and return immediately. A fixed
//! number of workers drain the bounded queue through a [`SealPipeline`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use recollect_core::{RecollectError, TranscriptStore, TurnLog};
use recollect_memory::{EmbeddingRetrievalService, MemoryExtractor};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::lease::ExtractionLeases;
use crate::registry::{ConversationRegistry, ExtractionJob, SealOutcome};

/// Extract, index, and persist one sealed transcript.
pub struct SealPipeline {
    extractor: Arc<MemoryExtractor>,
    retrieval: Arc<EmbeddingRetrievalService>,
    transcripts: Arc<dyn TranscriptStore>,
    turn_log: Option<Arc<dyn TurnLog>>,
    leases: ExtractionLeases,
    registry: Arc<ConversationRegistry>,
}

impl SealPipeline {
    pub fn new(
        extractor: Arc<MemoryExtractor>,
        retrieval: Arc<EmbeddingRetrievalService>,
        transcripts: Arc<dyn TranscriptStore>,
        turn_log: Option<Arc<dyn TurnLog>>,
        registry: Arc<ConversationRegistry>,
    ) -> Self {
        Self {
            extractor,
            retrieval,
            transcripts,
            turn_log,
            leases: ExtractionLeases::new(),
            registry,
        }
    }

    pub fn leases(&self) -> &ExtractionLeases {
        &self.leases
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }

    /// Process a job and record its outcome in the registry.
    ///
    /// Always records an outcome: the sealing never stays in flight.
    pub async fn run(&self, job: ExtractionJob) -> SealOutcome {
        let conversation_id = job.conversation_id().to_string();
        let hash = job.first_message_hash().to_string();
        let lease = self.leases.acquire(&conversation_id, &hash).await;

        let outcome = match self.find_processed(&hash).await {
            Some(transcript) => {
                info!(conversation_id = %conversation_id, first_message_hash = %hash, transcript = %transcript, "transcript already processed");
                SealOutcome::Duplicate { transcript }
            }
            None => self.process(&job).await,
        };

        if let Some(turn_log) = &self.turn_log
            && let Some(through) = job.through_turn_id
            && let Err(e) = turn_log.mark_sealed(&conversation_id, through).await
        {
            warn!(conversation_id = %conversation_id, error = %e, "failed to mark turns sealed");
        }

        self.registry
            .complete(&conversation_id, job.seal_index, outcome.clone());
        drop(lease);
        outcome
    }

    async fn find_processed(&self, hash: &str) -> Option<String> {
        match self.transcripts.find_by_hash(hash).await {
            Ok(found) => found,
            Err(e) => {
                warn!(first_message_hash = hash, error = %e, "transcript lookup failed");
                None
            }
        }
    }

    async fn process(&self, job: &ExtractionJob) -> SealOutcome {
        let conversation_id = job.conversation_id();
        let extraction = self.extractor.extract(&job.transcript).await;

        let mut indexed = 0;
        let mut index_failures = 0;
        if extraction.failure.is_none() {
            for memory in &extraction.memories {
                match self
                    .retrieval
                    .embed_and_index(memory, job.event.timestamp)
                    .await
                {
                    Ok(memory_id) => {
                        debug!(conversation_id, memory_id = %memory_id, "memory indexed");
                        indexed += 1;
                    }
                    Err(e) => {
                        warn!(conversation_id, error = %e, "failed to index memory");
                        index_failures += 1;
                    }
                }
            }
        }

        // Stored even when extraction failed so a replay is recognized.
        let transcript = match self.transcripts.store(&job.transcript).await {
            Ok(filename) => Some(filename),
            Err(e) => {
                warn!(conversation_id, error = %e, "failed to store transcript");
                None
            }
        };

        match extraction.failure {
            Some(reason) => {
                warn!(conversation_id, reason = %reason, "extraction failed, conversation sealed without memories");
                SealOutcome::ExtractionFailed { reason }
            }
            None => {
                info!(
                    conversation_id,
                    memories = indexed,
                    index_failures,
                    dropped = extraction.dropped,
                    "transcript processed"
                );
                SealOutcome::Indexed {
                    memories: indexed,
                    index_failures,
                    transcript,
                }
            }
        }
    }
}

/// Bounded queue plus a fixed set of workers.
pub struct WorkerPool {
    sender: std::sync::Mutex<Option<mpsc::Sender<ExtractionJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pipeline: Arc<SealPipeline>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl WorkerPool {
    /// Start `workers` workers reading from a queue of `capacity` jobs.
    pub fn spawn(pipeline: Arc<SealPipeline>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<ExtractionJob>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let pipeline = pipeline.clone();
                let pending = pending.clone();
                let idle = idle.clone();
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };
                        debug!(worker, conversation_id = job.conversation_id(), "extraction job started");
                        pipeline.run(job).await;
                        if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                            idle.notify_waiters();
                        }
                    }
                    debug!(worker, "extraction worker stopped");
                })
            })
            .collect();

        Self {
            sender: std::sync::Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            pipeline,
            pending,
            idle,
        }
    }

    pub fn pipeline(&self) -> &Arc<SealPipeline> {
        &self.pipeline
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn sender(&self) -> Option<mpsc::Sender<ExtractionJob>> {
        self.sender.lock().ok().and_then(|s| s.clone())
    }

    /// Queue a job without waiting for it to run.
    ///
    /// A full queue hands the job to a task that waits for room. After
    /// shutdown the job is recorded as failed so the conversation does not
    /// stay in flight.
    pub fn submit(&self, job: ExtractionJob) -> Result<(), RecollectError> {
        let Some(sender) = self.sender() else {
            return Err(self.reject(job, "worker pool is shut down"));
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(conversation_id = job.conversation_id(), "extraction queue full, deferring job");
                let pipeline = self.pipeline.clone();
                let pending = self.pending.clone();
                let idle = self.idle.clone();
                tokio::spawn(async move {
                    if let Err(mpsc::error::SendError(job)) = sender.send(job).await {
                        pipeline.registry().complete(
                            job.conversation_id(),
                            job.seal_index,
                            SealOutcome::ExtractionFailed {
                                reason: "worker pool is shut down".into(),
                            },
                        );
                        if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                            idle.notify_waiters();
                        }
                    }
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.finish_one();
                Err(self.reject(job, "worker pool is shut down"))
            }
        }
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn reject(&self, job: ExtractionJob, reason: &str) -> RecollectError {
        warn!(conversation_id = job.conversation_id(), reason, "extraction job rejected");
        self.pipeline.registry().complete(
            job.conversation_id(),
            job.seal_index,
            SealOutcome::ExtractionFailed {
                reason: reason.to_string(),
            },
        );
        RecollectError::Internal(format!(
            "cannot extract conversation {}: {reason}",
            job.conversation_id()
        ))
    }

    /// Wait until every submitted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting jobs, let the workers drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "extraction worker panicked");
            }
        }
        info!(workers = count, "worker pool drained");
    }
}
