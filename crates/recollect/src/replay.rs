// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `recollect replay` command implementation.
//!
//! Feeds chat turns from a JSONL file through the conversation tracker, then
//! waits for background extraction before printing what was sealed.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use recollect_agent::{ConversationStatus, drain_extractions, install_signal_handler};
use recollect_config::model::RecollectConfig;
use recollect_core::{ChatMessage, RecollectError, Role};
use serde::Deserialize;
use tracing::{info, warn};

use crate::pipeline::Pipeline;

/// How long to wait for in-flight extraction before giving up.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Turns restored per conversation from the turn log.
const RESTORE_LIMIT: usize = 500;

/// One line of a replay file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayTurn {
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// Defaults to the time the line is read.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Parses a JSONL replay file. Blank lines are skipped.
pub fn parse_turns(source: &str, content: &str) -> Result<Vec<ReplayTurn>, RecollectError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                RecollectError::Config(format!("{source}:{}: invalid turn: {e}", i + 1))
            })
        })
        .collect()
}

pub async fn run_replay(
    config: &RecollectConfig,
    path: &Path,
    close: bool,
    json: bool,
) -> Result<(), RecollectError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(RecollectError::storage)?;
    let turns = parse_turns(&path.display().to_string(), &content)?;

    let pipeline = Pipeline::open(config).await?;
    let tracker = pipeline.tracker.clone();
    let restored = tracker.restore(RESTORE_LIMIT).await?;
    if restored > 0 {
        info!(restored, "resuming open conversations");
    }

    // Replayed timestamps are historical, so there is no idle sweeper here:
    // idle gaps are detected between consecutive turns instead.
    let cancel = install_signal_handler();

    // Conversation id to the time of its last replayed turn.
    let mut seen: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    let mut ingested = 0usize;
    for turn in turns {
        if cancel.is_cancelled() {
            warn!(ingested, "replay interrupted");
            break;
        }
        let timestamp = turn.timestamp.unwrap_or_else(Utc::now);
        let message = ChatMessage::new(turn.role, turn.content, timestamp);
        let outcome = tracker.ingest_turn(&turn.conversation_id, message).await?;
        for event in &outcome.sealed {
            info!(
                conversation_id = %event.conversation_id,
                reason = ?event.result.reason,
                "boundary detected"
            );
        }
        seen.insert(turn.conversation_id, timestamp);
        ingested += 1;
    }

    if close && !cancel.is_cancelled() {
        for (conversation_id, last) in &seen {
            tracker.close(conversation_id, *last)?;
        }
    }

    let drained = drain_extractions(&tracker, DRAIN_TIMEOUT).await;
    pipeline.db.checkpoint().await?;

    let statuses: Vec<ConversationStatus> = seen
        .keys()
        .filter_map(|id| tracker.status(id).ok())
        .collect();
    print_statuses(&statuses, ingested, json)?;

    if !drained {
        return Err(RecollectError::Timeout {
            duration: DRAIN_TIMEOUT,
        });
    }
    Ok(())
}

fn print_statuses(
    statuses: &[ConversationStatus],
    ingested: usize,
    json: bool,
) -> Result<(), RecollectError> {
    if json {
        let body = serde_json::to_string_pretty(statuses).map_err(RecollectError::storage)?;
        println!("{body}");
        return Ok(());
    }

    println!("replayed {ingested} turns across {} conversations", statuses.len());
    for status in statuses {
        println!(
            "{}: {} ({} open messages, {} seals)",
            status.conversation_id,
            status.state,
            status.open_messages,
            status.seals.len()
        );
        for seal in &status.seals {
            let reason = seal
                .event
                .result
                .reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let outcome = match &seal.outcome {
                Some(outcome) => serde_json::to_string(outcome).map_err(RecollectError::storage)?,
                None => "in flight".to_string(),
            };
            println!("  {reason}, {} messages: {outcome}", seal.message_count);
        }
    }
    Ok(())
}
