// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle for Recollect.
//!
//! The [`ConversationTracker`] owns per-conversation state and runs the
//! boundary detector on every turn. Sealed transcripts go to a
//! [`WorkerPool`] that extracts and indexes memories in the background, at
//! most once per transcript.

pub mod lease;
pub mod registry;
pub mod shutdown;
pub mod tracker;
pub mod worker;

pub use lease::{ExtractionLeases, Lease};
pub use registry::{
    ConversationRegistry, ConversationState, ConversationStatus, ExtractionJob, SealOutcome,
    SealRecord,
};
pub use shutdown::{drain_extractions, install_signal_handler};
pub use tracker::{ConversationTracker, TurnOutcome};
pub use worker::{SealPipeline, WorkerPool};
