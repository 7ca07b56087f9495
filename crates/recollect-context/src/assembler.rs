// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval, deduplication, ranking, and packing for a single turn.
//!
//! Assembly never fails the caller. A retrieval error or a blown deadline
//! produces an empty, degraded context.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use recollect_config::model::RecollectConfig;
use recollect_core::{RecollectError, TruncationStrategy};
use recollect_memory::{
    AccessTracker, EmbeddingRetrievalService, RetrievalFilters, RetrievalQuery,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::budget::{BudgetManager, SelectedMemory, TokenBudget, total_tokens};
use crate::dedup::deduplicate;
use crate::ranker::Ranker;
use crate::tokens::counter_for;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum AssemblyOutcome {
    /// At least one memory was selected.
    Complete,
    /// Retrieval worked but nothing relevant was found or nothing fit.
    Empty,
    /// Retrieval failed or timed out. The context is empty.
    Degraded(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub selected: Vec<SelectedMemory>,
    pub total_tokens: usize,
    pub outcome: AssemblyOutcome,
}

impl AssembledContext {
    fn empty(outcome: AssemblyOutcome) -> Self {
        Self {
            selected: Vec::new(),
            total_tokens: 0,
            outcome,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, AssemblyOutcome::Degraded(_))
    }

    /// Markdown block for prompt injection. Empty when nothing was selected.
    pub fn render(&self) -> String {
        if self.selected.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Relevant Memories\n");
        for entry in &self.selected {
            match entry.category {
                Some(category) => {
                    let _ = writeln!(out, "- ({category}) {}", entry.text);
                }
                None => {
                    let _ = writeln!(out, "- {}", entry.text);
                }
            }
        }
        out
    }
}

/// Settings that do not belong to a single stage.
#[derive(Debug, Clone)]
pub struct AssemblySettings {
    pub top_k: usize,
    pub min_similarity: f32,
    pub dedup_threshold: f32,
    pub deadline: Duration,
    pub budget: TokenBudget,
    pub strategy: TruncationStrategy,
}

impl AssemblySettings {
    pub fn from_config(config: &RecollectConfig) -> Result<Self, RecollectError> {
        Ok(Self {
            top_k: config.retrieval.top_k,
            min_similarity: config.retrieval.min_similarity as f32,
            dedup_threshold: config.retrieval.dedup_threshold as f32,
            deadline: Duration::from_millis(config.retrieval.deadline_ms),
            budget: TokenBudget::new(config.budget.max_tokens)?,
            strategy: config.budget.strategy,
        })
    }
}

pub struct ContextAssembler {
    retrieval: Arc<EmbeddingRetrievalService>,
    access: Arc<AccessTracker>,
    ranker: Ranker,
    budget: BudgetManager,
    settings: AssemblySettings,
}

impl ContextAssembler {
    pub fn new(
        retrieval: Arc<EmbeddingRetrievalService>,
        access: Arc<AccessTracker>,
        ranker: Ranker,
        budget: BudgetManager,
        settings: AssemblySettings,
    ) -> Self {
        Self {
            retrieval,
            access,
            ranker,
            budget,
            settings,
        }
    }

    /// Wires an assembler from config. Fails on invalid weights or budget.
    pub fn from_config(
        config: &RecollectConfig,
        retrieval: Arc<EmbeddingRetrievalService>,
        access: Arc<AccessTracker>,
    ) -> Result<Self, RecollectError> {
        Ok(Self::new(
            retrieval,
            access,
            Ranker::from_config(&config.ranking)?,
            BudgetManager::new(counter_for(config.budget.tokenizer)?),
            AssemblySettings::from_config(config)?,
        ))
    }

    pub fn settings(&self) -> &AssemblySettings {
        &self.settings
    }

    pub fn access(&self) -> &Arc<AccessTracker> {
        &self.access
    }

    pub async fn assemble(&self, text: &str) -> AssembledContext {
        let query = RetrievalQuery::new(text, self.settings.top_k).with_filters(RetrievalFilters {
            min_similarity: Some(self.settings.min_similarity),
            ..RetrievalFilters::default()
        });
        self.assemble_query(&query, Utc::now()).await
    }

    /// Full pipeline for an explicit query. `now` drives recency and is the
    /// timestamp recorded for every included memory.
    pub async fn assemble_query(&self, query: &RetrievalQuery, now: DateTime<Utc>) -> AssembledContext {
        let retrieved =
            match tokio::time::timeout(self.settings.deadline, self.retrieval.retrieve(query)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(error = %e, "retrieval failed, continuing without memories");
                    return AssembledContext::empty(AssemblyOutcome::Degraded(e.to_string()));
                }
                Err(_) => {
                    let e = RecollectError::Timeout {
                        duration: self.settings.deadline,
                    };
                    warn!(error = %e, "retrieval deadline exceeded, continuing without memories");
                    return AssembledContext::empty(AssemblyOutcome::Degraded(e.to_string()));
                }
            };

        let retrieved_count = retrieved.len();
        let clusters = deduplicate(retrieved, self.settings.dedup_threshold);

        let candidate_ids: Vec<String> = clusters
            .iter()
            .flat_map(|c| c.member_ids().map(str::to_string))
            .collect();
        if let Err(e) = self.access.load(&candidate_ids).await {
            warn!(error = %e, "failed to load access history, ranking with local counts");
        }

        let ranked = self.ranker.rank(clusters, &self.access, now);
        let selected = self
            .budget
            .pack(&ranked, self.settings.budget, self.settings.strategy);

        let included: Vec<String> = selected
            .iter()
            .flat_map(|s| s.member_ids.iter().cloned())
            .collect();
        if let Err(e) = self.access.persist(&included, now).await {
            warn!(error = %e, "failed to persist access history");
        }

        let total_tokens = total_tokens(&selected);
        debug!(
            retrieved = retrieved_count,
            ranked = ranked.len(),
            selected = selected.len(),
            total_tokens,
            "context assembled"
        );

        let outcome = if selected.is_empty() {
            AssemblyOutcome::Empty
        } else {
            AssemblyOutcome::Complete
        };
        AssembledContext {
            selected,
            total_tokens,
            outcome,
        }
    }
}
