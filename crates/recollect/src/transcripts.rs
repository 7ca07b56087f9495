// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `recollect transcripts` command implementation.

use recollect_config::model::RecollectConfig;
use recollect_core::{RecollectError, TranscriptStore};
use recollect_storage::FileTranscriptStore;

/// Prints stored transcript filenames, newest first.
pub async fn run_list(config: &RecollectConfig, limit: usize) -> Result<(), RecollectError> {
    let store = FileTranscriptStore::new(&config.storage.transcripts_dir);
    for name in store.list(limit).await? {
        println!("{name}");
    }
    Ok(())
}

/// Prints one transcript as JSON.
pub async fn run_show(config: &RecollectConfig, filename: &str) -> Result<(), RecollectError> {
    let store = FileTranscriptStore::new(&config.storage.transcripts_dir);
    let transcript = store.load(filename).await?;
    let body = serde_json::to_string_pretty(&transcript).map_err(RecollectError::storage)?;
    println!("{body}");
    Ok(())
}
