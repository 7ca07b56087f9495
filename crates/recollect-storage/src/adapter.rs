// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`TurnLog`] trait.

use async_trait::async_trait;
use recollect_core::{ChatMessage, LoggedTurn, RecollectError, TurnLog};
use tracing::debug;

use crate::database::Database;
use crate::queries::turns;

/// Turn log backed by the `turns` table.
#[derive(Clone)]
pub struct SqliteTurnLog {
    db: Database,
}

impl SqliteTurnLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TurnLog for SqliteTurnLog {
    async fn append_turn(
        &self,
        conversation_id: &str,
        message: &ChatMessage,
    ) -> Result<i64, RecollectError> {
        let id = turns::insert_turn(&self.db, conversation_id, message).await?;
        debug!(conversation_id, turn_id = id, "turn appended");
        Ok(id)
    }

    async fn recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<LoggedTurn>, RecollectError> {
        turns::recent_unsealed_turns(&self.db, conversation_id, limit).await
    }

    async fn unsealed_conversations(&self) -> Result<Vec<String>, RecollectError> {
        turns::unsealed_conversation_ids(&self.db).await
    }

    async fn mark_sealed(
        &self,
        conversation_id: &str,
        through_turn_id: i64,
    ) -> Result<usize, RecollectError> {
        let count = turns::seal_turns_through(&self.db, conversation_id, through_turn_id).await?;
        debug!(conversation_id, through_turn_id, count, "turns sealed");
        Ok(count)
    }
}
