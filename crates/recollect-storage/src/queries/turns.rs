// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn log queries.

use std::str::FromStr;

use recollect_core::{ChatMessage, LoggedTurn, RecollectError, Role};
use rusqlite::params;

use crate::database::{Database, format_timestamp, map_tr_err, parse_timestamp};

/// Append one turn. Returns the row id.
pub async fn insert_turn(
    db: &Database,
    conversation_id: &str,
    message: &ChatMessage,
) -> Result<i64, RecollectError> {
    let conversation_id = conversation_id.to_string();
    let role = message.role.to_string();
    let content = message.content.clone();
    let created_at = format_timestamp(&message.timestamp);
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO turns (conversation_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![conversation_id, role, content, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Last `limit` unsealed turns of a conversation, oldest first.
pub async fn recent_unsealed_turns(
    db: &Database,
    conversation_id: &str,
    limit: usize,
) -> Result<Vec<LoggedTurn>, RecollectError> {
    let conversation_id = conversation_id.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<LoggedTurn>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, role, content, created_at FROM (
                     SELECT id, role, content, created_at FROM turns
                     WHERE conversation_id = ?1 AND sealed = 0
                     ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id, limit], |row| {
                let role: String = row.get(1)?;
                let created_at: String = row.get(3)?;
                let message = ChatMessage {
                    role: Role::from_str(&role).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    content: row.get(2)?,
                    timestamp: parse_timestamp(3, &created_at)?,
                };
                Ok(LoggedTurn {
                    id: row.get(0)?,
                    message,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Conversation ids that still have unsealed turns, by first appearance.
pub async fn unsealed_conversation_ids(db: &Database) -> Result<Vec<String>, RecollectError> {
    db.connection()
        .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT conversation_id FROM turns WHERE sealed = 0
                 GROUP BY conversation_id ORDER BY MIN(id) ASC",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Flag every unsealed turn with a row id up to `through_id` as sealed.
///
/// Row ids follow append order, so turns logged after the sealed transcript
/// stay open even when their timestamps are equal or earlier.
pub async fn seal_turns_through(
    db: &Database,
    conversation_id: &str,
    through_id: i64,
) -> Result<usize, RecollectError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE turns SET sealed = 1
                 WHERE conversation_id = ?1 AND sealed = 0 AND id <= ?2",
                params![conversation_id, through_id],
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn recent_turns_are_chronological_and_limited() {
        let db = Database::open_in_memory().await.unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            let id = insert_turn(&db, "c1", &ChatMessage::user(format!("m{i}"), at(i)))
                .await
                .unwrap();
            ids.push(id);
        }
        insert_turn(&db, "c2", &ChatMessage::user("other", at(0)))
            .await
            .unwrap();

        let turns = recent_unsealed_turns(&db, "c1", 3).await.unwrap();
        let contents: Vec<_> = turns.iter().map(|t| t.message.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert_eq!(turns[0].message.timestamp, at(2));
        assert_eq!(turns[0].id, ids[2]);
    }

    #[tokio::test]
    async fn sealing_hides_turns_and_conversations() {
        let db = Database::open_in_memory().await.unwrap();
        insert_turn(&db, "c1", &ChatMessage::user("a", at(0))).await.unwrap();
        let b = insert_turn(&db, "c1", &ChatMessage::assistant("b", at(1))).await.unwrap();
        let c = insert_turn(&db, "c1", &ChatMessage::user("c", at(10))).await.unwrap();
        insert_turn(&db, "c2", &ChatMessage::user("x", at(2))).await.unwrap();

        assert_eq!(seal_turns_through(&db, "c1", b).await.unwrap(), 2);

        let remaining = recent_unsealed_turns(&db, "c1", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message.content, "c");

        seal_turns_through(&db, "c1", c).await.unwrap();
        assert_eq!(unsealed_conversation_ids(&db).await.unwrap(), vec!["c2"]);
    }

    #[tokio::test]
    async fn sealing_by_id_leaves_later_turn_with_same_timestamp_open() {
        let db = Database::open_in_memory().await.unwrap();
        let first = insert_turn(&db, "c1", &ChatMessage::user("first", at(5)))
            .await
            .unwrap();
        insert_turn(&db, "c1", &ChatMessage::user("second", at(5)))
            .await
            .unwrap();
        // Logged later but stamped earlier.
        insert_turn(&db, "c1", &ChatMessage::user("late", at(1)))
            .await
            .unwrap();

        assert_eq!(seal_turns_through(&db, "c1", first).await.unwrap(), 1);

        let remaining = recent_unsealed_turns(&db, "c1", 10).await.unwrap();
        let contents: Vec<_> = remaining.iter().map(|t| t.message.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "late"]);
    }
}
