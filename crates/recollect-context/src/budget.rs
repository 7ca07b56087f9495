// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Greedy packing of ranked memories into a token budget.
//!
//! Costs cover the memory text itself. The total cost of the returned
//! selection never exceeds the budget, whatever the strategy.

use std::sync::Arc;

use recollect_core::{MemoryCategory, RecollectError, TruncationStrategy};
use serde::Serialize;
use tracing::debug;

use crate::ranker::RankedMemory;
use crate::tokens::{TokenCounter, truncate_to_tokens};

const SUMMARY_PREFIX: &str = "Also relevant: ";
const SUMMARY_SEPARATOR: &str = "; ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenBudget {
    max_tokens: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize) -> Result<Self, RecollectError> {
        if max_tokens == 0 {
            return Err(RecollectError::InvariantViolation(
                "token budget must be at least 1".into(),
            ));
        }
        Ok(Self { max_tokens })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SelectionKind {
    Full,
    Truncated,
    /// Synthetic line standing in for `covered` lower-ranked memories.
    Summary { covered: usize },
}

/// One entry of the packed context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedMemory {
    /// Canonical memory id. `None` for a summary.
    pub memory_id: Option<String>,
    /// Canonical and merged ids to report as accessed. Empty for a summary.
    pub member_ids: Vec<String>,
    pub category: Option<MemoryCategory>,
    pub text: String,
    pub tokens: usize,
    #[serde(flatten)]
    pub kind: SelectionKind,
}

impl SelectedMemory {
    fn from_ranked(ranked: &RankedMemory, text: String, tokens: usize, kind: SelectionKind) -> Self {
        Self {
            memory_id: Some(ranked.score.memory_id.clone()),
            member_ids: ranked.candidate.member_ids().map(str::to_string).collect(),
            category: Some(ranked.category()),
            text,
            tokens,
            kind,
        }
    }
}

pub struct BudgetManager {
    counter: Arc<dyn TokenCounter>,
}

impl BudgetManager {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    /// Select from `ranked`, in rank order, until the budget is spent.
    pub fn pack(
        &self,
        ranked: &[RankedMemory],
        budget: TokenBudget,
        strategy: TruncationStrategy,
    ) -> Vec<SelectedMemory> {
        let max = budget.max_tokens();
        let mut used = 0usize;
        let mut selected = Vec::new();

        for (i, item) in ranked.iter().enumerate() {
            let cost = self.counter.count(item.text());
            if used + cost <= max {
                used += cost;
                selected.push(SelectedMemory::from_ranked(
                    item,
                    item.text().to_string(),
                    cost,
                    SelectionKind::Full,
                ));
                continue;
            }

            let remaining = max - used;
            match strategy {
                TruncationStrategy::DropLowestRank => {
                    debug!(memory_id = %item.score.memory_id, cost, remaining, "skipping oversized memory");
                }
                TruncationStrategy::TruncateText => {
                    if let Some(entry) = self.truncated(item, remaining) {
                        used += entry.tokens;
                        selected.push(entry);
                    }
                    break;
                }
                TruncationStrategy::SummarizeOverflow => {
                    if let Some(entry) = self.summary(&ranked[i..], remaining) {
                        used += entry.tokens;
                        selected.push(entry);
                    }
                    break;
                }
            }
        }

        debug!(selected = selected.len(), used, max, %strategy, "packed memories");
        selected
    }

    fn truncated(&self, item: &RankedMemory, remaining: usize) -> Option<SelectedMemory> {
        let text = truncate_to_tokens(self.counter.as_ref(), item.text(), remaining);
        let tokens = self.counter.count(text);
        (!text.is_empty() && tokens <= remaining).then(|| {
            SelectedMemory::from_ranked(item, text.to_string(), tokens, SelectionKind::Truncated)
        })
    }

    /// One line naming as many of `rest` as fit in `remaining`, skipping
    /// those that do not fit whole. If none fits whole, the first is cut.
    fn summary(&self, rest: &[RankedMemory], remaining: usize) -> Option<SelectedMemory> {
        let mut text = String::from(SUMMARY_PREFIX);
        let mut covered = 0;
        for item in rest {
            let candidate = if covered == 0 {
                format!("{text}{}", item.text())
            } else {
                format!("{text}{SUMMARY_SEPARATOR}{}", item.text())
            };
            if self.counter.count(&candidate) <= remaining {
                text = candidate;
                covered += 1;
            }
        }

        if covered == 0 {
            let first = rest.first()?;
            let full = format!("{SUMMARY_PREFIX}{}", first.text());
            let cut = truncate_to_tokens(self.counter.as_ref(), &full, remaining);
            if cut.len() <= SUMMARY_PREFIX.trim_end().len() {
                return None;
            }
            text = cut.to_string();
            covered = 1;
        }

        let tokens = self.counter.count(&text);
        (tokens <= remaining).then_some(SelectedMemory {
            memory_id: None,
            member_ids: Vec::new(),
            category: None,
            text,
            tokens,
            kind: SelectionKind::Summary { covered },
        })
    }
}

/// Sum of the token costs of a selection.
pub fn total_tokens(selection: &[SelectedMemory]) -> usize {
    selection.iter().map(|s| s.tokens).sum()
}
