// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory side of the Recollect pipeline.
//!
//! Decides when a conversation has ended, extracts structured memories from
//! the closed transcript, embeds them into a vector index, retrieves them by
//! similarity, and keeps per-memory access counters for ranking.

pub mod access;
pub mod boundary;
pub mod extractor;
pub mod index;
pub mod retriever;
pub mod store;
pub mod types;

pub use access::{AccessStore, AccessTracker, SqliteAccessStore};
pub use boundary::{BoundaryDetector, BoundaryRules};
pub use extractor::{ExtractionOutcome, ExtractionSettings, MemoryExtractor};
pub use index::{InMemoryVectorIndex, VectorIndex};
pub use retriever::EmbeddingRetrievalService;
pub use store::SqliteVectorIndex;
pub use types::{
    AccessMetadata, ExtractedMemory, MemoryRecord, RetrievalFilters, RetrievalQuery,
    RetrievalResponse, RetrievalResult, cosine_similarity,
};
