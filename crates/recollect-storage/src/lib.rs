// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for Recollect: the SQLite database (turn log and memory
//! table schema) and the file-based transcript store.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;
pub mod transcript_store;

pub use adapter::SqliteTurnLog;
pub use database::Database;
pub use transcript_store::FileTranscriptStore;
