// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context side of the Recollect pipeline.
//!
//! Turns a retrieval response into a token-bounded block of memories:
//! near-duplicates are collapsed, the survivors scored and ordered, and the
//! best of them packed into the budget.

pub mod assembler;
pub mod budget;
pub mod dedup;
pub mod ranker;
pub mod tokens;

pub use assembler::{AssembledContext, AssemblySettings, AssemblyOutcome, ContextAssembler};
pub use budget::{BudgetManager, SelectedMemory, SelectionKind, TokenBudget};
pub use dedup::{DeduplicationResult, deduplicate};
pub use ranker::{FactorBreakdown, RankedMemory, Ranker, RelevanceScore, ScoreWeights};
pub use tokens::{HeuristicCounter, TiktokenCounter, TokenCounter, counter_for};
