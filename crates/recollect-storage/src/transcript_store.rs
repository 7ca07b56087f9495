// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sealed transcripts as JSON files in a directory.
//!
//! Filenames are `transcript-<sealed_at millis, 13 digits>-<hash prefix>.json`,
//! so lexical order is chronological and the idempotency key is visible
//! without opening the file.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use recollect_core::{ConversationTranscript, RecollectError, TranscriptStore};
use tokio::sync::Mutex;
use tracing::{debug, info};

const PREFIX: &str = "transcript-";
const SUFFIX: &str = ".json";
const HASH_PREFIX_LEN: usize = 16;

/// File-backed [`TranscriptStore`].
pub struct FileTranscriptStore {
    dir: PathBuf,
    // Serializes the check-then-write in `store`.
    write_lock: Mutex<()>,
}

impl FileTranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    async fn filenames(&self) -> Result<Vec<String>, RecollectError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RecollectError::storage(e)),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(RecollectError::storage)? {
            if let Some(name) = entry.file_name().to_str()
                && is_transcript_name(name)
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn find_existing(&self, hash: &str) -> Result<Option<String>, RecollectError> {
        let Some(prefix) = hash.get(..HASH_PREFIX_LEN) else {
            return Ok(None);
        };
        let marker = format!("-{prefix}{SUFFIX}");
        for name in self.filenames().await? {
            if !name.ends_with(&marker) {
                continue;
            }
            // Prefix collisions are possible; confirm against the full hash.
            let transcript = self.load(&name).await?;
            if transcript.first_message_hash() == Some(hash) {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }
}

fn is_transcript_name(name: &str) -> bool {
    name.starts_with(PREFIX)
        && name.ends_with(SUFFIX)
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn store(&self, transcript: &ConversationTranscript) -> Result<String, RecollectError> {
        let hash = transcript.first_message_hash().ok_or_else(|| {
            RecollectError::InvariantViolation(format!(
                "cannot store empty transcript for conversation {}",
                transcript.conversation_id()
            ))
        })?;

        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.find_existing(hash).await? {
            debug!(filename = %existing, "transcript already stored");
            return Ok(existing);
        }

        let sealed_at = transcript.sealed_at().unwrap_or_else(Utc::now);
        let filename = format!(
            "{PREFIX}{:013}-{}{SUFFIX}",
            sealed_at.timestamp_millis().max(0),
            &hash[..HASH_PREFIX_LEN.min(hash.len())]
        );
        let body = serde_json::to_vec_pretty(transcript).map_err(RecollectError::storage)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(RecollectError::storage)?;
        let tmp = self.dir.join(format!(".{filename}.tmp"));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(RecollectError::storage)?;
        tokio::fs::rename(&tmp, self.dir.join(&filename))
            .await
            .map_err(RecollectError::storage)?;

        info!(
            conversation_id = transcript.conversation_id(),
            filename = %filename,
            messages = transcript.message_count(),
            "transcript stored"
        );
        Ok(filename)
    }

    async fn load(&self, filename: &str) -> Result<ConversationTranscript, RecollectError> {
        if !is_transcript_name(filename) {
            return Err(RecollectError::not_found("transcript", filename));
        }
        let bytes = match tokio::fs::read(self.dir.join(filename)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RecollectError::not_found("transcript", filename));
            }
            Err(e) => return Err(RecollectError::storage(e)),
        };
        serde_json::from_slice(&bytes).map_err(RecollectError::storage)
    }

    async fn list(&self, limit: usize) -> Result<Vec<String>, RecollectError> {
        let mut names = self.filenames().await?;
        names.sort_unstable_by(|a, b| b.cmp(a));
        names.truncate(limit);
        Ok(names)
    }

    async fn find_by_hash(
        &self,
        first_message_hash: &str,
    ) -> Result<Option<String>, RecollectError> {
        self.find_existing(first_message_hash).await
    }
}
