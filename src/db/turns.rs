//! Users, sessions and ordered message turns

use super::{
    metadata_to_sql, parse_datetime, parse_metadata, Database, DbError, DbResult, Message,
    NewMessage, Session, SessionStatus, User,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

const MESSAGE_COLUMNS: &str = "message_id, session_id, user_id, role, content, agent_name, \
     turn_number, parent_message_id, created_at, metadata";

const SESSION_COLUMNS: &str =
    "session_id, user_id, status, created_at, updated_at, last_message_at, metadata";

impl Database {
    // ==================== User Operations ====================

    /// Fetch a user, creating the row on first sight.
    ///
    /// Metadata is only written on creation; an existing user keeps theirs.
    pub async fn get_or_create_user(
        &self,
        user_id: &str,
        metadata: Option<Value>,
    ) -> DbResult<User> {
        let user_id = user_id.to_string();
        self.with_tx(move |tx| {
            let now = Utc::now();
            tx.execute(
                "INSERT INTO users (user_id, created_at, last_active, metadata)
                 VALUES (?1, ?2, ?2, ?3)
                 ON CONFLICT(user_id) DO NOTHING",
                params![user_id, now.to_rfc3339(), metadata_to_sql(metadata.as_ref())],
            )?;
            load_user(tx, &user_id)
        })
        .await
    }

    // ==================== Session Operations ====================

    /// Return the session, creating or reopening it for `user_id`.
    ///
    /// Fails with [`DbError::SessionOwnershipConflict`] when the id is
    /// already owned by a different user.
    pub async fn get_or_create_session(&self, session_id: &str, user_id: &str) -> DbResult<Session> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.with_tx(move |tx| ensure_session(tx, &session_id, &user_id, Utc::now()))
            .await
    }

    pub async fn get_session(&self, session_id: &str) -> DbResult<Option<Session>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| find_session(conn, &session_id)).await
    }

    /// Explicitly change a session's status. Returns `None` for an unknown id.
    pub async fn set_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> DbResult<Option<Session>> {
        let session_id = session_id.to_string();
        self.with_tx(move |tx| {
            let changed = tx.execute(
                "UPDATE chat_sessions SET status = ?1, updated_at = ?2 WHERE session_id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), session_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            tracing::info!(session_id = %session_id, status = %status, "Session status changed");
            find_session(tx, &session_id)
        })
        .await
    }

    // ==================== Message Operations ====================

    /// Append a turn to its session.
    ///
    /// Runs as one immediate transaction: the user and session rows are
    /// ensured, the next turn number is taken as `max + 1`, the message is
    /// inserted under a fresh id and the session's `last_message_at` moves.
    /// Either all of that commits or none of it does.
    pub async fn save_message(&self, message: NewMessage) -> DbResult<Message> {
        if message.content.trim().is_empty() {
            return Err(DbError::InvalidMessage(
                "message content must not be empty".to_string(),
            ));
        }

        self.with_tx(move |tx| {
            let now = Utc::now();
            let now_str = now.to_rfc3339();

            tx.execute(
                "INSERT INTO users (user_id, created_at, last_active)
                 VALUES (?1, ?2, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET last_active = excluded.last_active",
                params![message.user_id, now_str],
            )?;
            ensure_session(tx, &message.session_id, &message.user_id, now)?;

            let turn_number: i64 = tx.query_row(
                "SELECT COALESCE(MAX(turn_number), 0) + 1 FROM chat_messages WHERE session_id = ?1",
                params![message.session_id],
                |row| row.get(0),
            )?;

            let message_id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO chat_messages (message_id, session_id, user_id, role, content, agent_name,
                                            turn_number, parent_message_id, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message_id,
                    message.session_id,
                    message.user_id,
                    message.role.as_str(),
                    message.content,
                    message.agent_name,
                    turn_number,
                    message.parent_message_id,
                    now_str,
                    metadata_to_sql(message.metadata.as_ref()),
                ],
            )?;

            tx.execute(
                "UPDATE chat_sessions SET last_message_at = ?1, updated_at = ?1 WHERE session_id = ?2",
                params![now_str, message.session_id],
            )?;

            tracing::debug!(
                session_id = %message.session_id,
                turn_number,
                role = %message.role,
                "Saved message"
            );

            Ok(Message {
                message_id,
                session_id: message.session_id,
                user_id: message.user_id,
                role: message.role,
                content: message.content,
                agent_name: message.agent_name,
                turn_number,
                parent_message_id: message.parent_message_id,
                created_at: now,
                metadata: message.metadata,
            })
        })
        .await
    }

    /// The first `limit` turns of a session, oldest first.
    /// An unknown session yields an empty list.
    pub async fn get_session_messages(&self, session_id: &str, limit: usize) -> DbResult<Vec<Message>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_messages
                 WHERE session_id = ?1 ORDER BY turn_number ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![session_id, sql_limit(limit)], parse_message_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })
        .await
    }

    /// The last `limit` turns of a session, still oldest first
    pub async fn get_recent_messages(&self, session_id: &str, limit: usize) -> DbResult<Vec<Message>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                     SELECT {MESSAGE_COLUMNS} FROM chat_messages
                     WHERE session_id = ?1 ORDER BY turn_number DESC LIMIT ?2
                 ) ORDER BY turn_number ASC"
            ))?;
            let rows = stmt.query_map(params![session_id, sql_limit(limit)], parse_message_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })
        .await
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn load_user(conn: &Connection, user_id: &str) -> DbResult<User> {
    conn.query_row(
        "SELECT user_id, created_at, last_active, metadata FROM users WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(User {
                user_id: row.get(0)?,
                created_at: parse_datetime(&row.get::<_, String>(1)?),
                last_active: parse_datetime(&row.get::<_, String>(2)?),
                metadata: parse_metadata(row.get(3)?),
            })
        },
    )
    .map_err(DbError::from)
}

fn find_session(conn: &Connection, session_id: &str) -> DbResult<Option<Session>> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE session_id = ?1"),
        params![session_id],
        parse_session_row,
    )
    .optional()
    .map_err(DbError::from)
}

/// Get, reopen or create a session inside an open transaction
fn ensure_session(
    conn: &Connection,
    session_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> DbResult<Session> {
    let now_str = now.to_rfc3339();

    match find_session(conn, session_id)? {
        Some(session) if session.user_id != user_id => {
            tracing::warn!(
                session_id = %session_id,
                requested_by = %user_id,
                "Rejected session owned by another user"
            );
            Err(DbError::SessionOwnershipConflict {
                session_id: session_id.to_string(),
            })
        }
        Some(session) if session.status == SessionStatus::Active => Ok(session),
        Some(mut session) => {
            conn.execute(
                "UPDATE chat_sessions SET status = 'active', updated_at = ?1 WHERE session_id = ?2",
                params![now_str, session_id],
            )?;
            tracing::info!(
                session_id = %session_id,
                previous = %session.status,
                "Reopened session"
            );
            session.status = SessionStatus::Active;
            session.updated_at = now;
            Ok(session)
        }
        None => {
            conn.execute(
                "INSERT INTO users (user_id, created_at, last_active) VALUES (?1, ?2, ?2)
                 ON CONFLICT(user_id) DO NOTHING",
                params![user_id, now_str],
            )?;
            conn.execute(
                "INSERT INTO chat_sessions (session_id, user_id, status, created_at, updated_at, last_message_at)
                 VALUES (?1, ?2, 'active', ?3, ?3, ?3)",
                params![session_id, user_id, now_str],
            )?;
            tracing::info!(session_id = %session_id, user_id = %user_id, "Created session");
            Ok(Session {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                status: SessionStatus::Active,
                created_at: now,
                updated_at: now,
                last_message_at: now,
                metadata: None,
            })
        }
    }
}

fn text_conversion_error(idx: usize, err: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_session_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(2)?;
    Ok(Session {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        status: status.parse().map_err(|e| text_conversion_error(2, e))?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
        last_message_at: parse_datetime(&row.get::<_, String>(5)?),
        metadata: parse_metadata(row.get(6)?),
    })
}

fn parse_message_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(3)?;
    Ok(Message {
        message_id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        role: role.parse().map_err(|e| text_conversion_error(3, e))?,
        content: row.get(4)?,
        agent_name: row.get(5)?,
        turn_number: row.get(6)?,
        parent_message_id: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        metadata: parse_metadata(row.get(9)?),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_db;
    use super::*;
    use crate::db::Role;
    use tokio::task::JoinSet;

    #[tokio::test]
    async fn test_get_or_create_user_keeps_first_metadata() {
        let (_dir, db) = test_db().await;

        let first = db
            .get_or_create_user("user-1", Some(serde_json::json!({"source": "web"})))
            .await
            .unwrap();
        let second = db
            .get_or_create_user("user-1", Some(serde_json::json!({"source": "phone"})))
            .await
            .unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.metadata, Some(serde_json::json!({"source": "web"})));
    }

    #[tokio::test]
    async fn test_get_or_create_session_is_idempotent() {
        let (_dir, db) = test_db().await;

        let first = db.get_or_create_session("sess-1", "user-1").await.unwrap();
        let second = db.get_or_create_session("sess-1", "user-1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.status, SessionStatus::Active);
        assert_eq!(second.user_id, "user-1");
    }

    #[tokio::test]
    async fn test_session_owned_by_other_user_is_rejected() {
        let (_dir, db) = test_db().await;
        db.get_or_create_session("sess-1", "alice").await.unwrap();

        let err = db.get_or_create_session("sess-1", "mallory").await.unwrap_err();
        assert!(matches!(err, DbError::SessionOwnershipConflict { .. }));

        let err = db
            .save_message(NewMessage::user("sess-1", "mallory", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::SessionOwnershipConflict { .. }));

        // Nothing was written for the rejected user
        assert!(db.get_session_messages("sess-1", 10).await.unwrap().is_empty());
        let session = db.get_session("sess-1").await.unwrap().unwrap();
        assert_eq!(session.user_id, "alice");
    }

    #[tokio::test]
    async fn test_message_reopens_inactive_session() {
        let (_dir, db) = test_db().await;
        db.get_or_create_session("sess-1", "user-1").await.unwrap();

        let closed = db
            .set_session_status("sess-1", SessionStatus::Inactive)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Inactive);

        db.save_message(NewMessage::user("sess-1", "user-1", "back again"))
            .await
            .unwrap();

        let session = db.get_session("sess-1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_set_status_on_unknown_session() {
        let (_dir, db) = test_db().await;
        let result = db
            .set_session_status("missing", SessionStatus::Completed)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_save_and_retrieve_round_trip() {
        let (_dir, db) = test_db().await;

        let user = db
            .save_message(NewMessage::user("sess-1", "user-1", "Check this number"))
            .await
            .unwrap();
        let reply = db
            .save_message(
                NewMessage::assistant("sess-1", "user-1", "checker", "No reports found")
                    .with_parent(&user.message_id)
                    .with_metadata(serde_json::json!({"phone": "15551234567"})),
            )
            .await
            .unwrap();

        assert_eq!(user.turn_number, 1);
        assert_eq!(reply.turn_number, 2);
        assert_ne!(user.message_id, reply.message_id);

        let messages = db.get_session_messages("sess-1", 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Check this number");
        assert_eq!(messages[0].agent_name, None);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].agent_name.as_deref(), Some("checker"));
        assert_eq!(messages[1].turn_number, 2);
        assert_eq!(
            messages[1].parent_message_id.as_deref(),
            Some(user.message_id.as_str())
        );
        assert_eq!(
            messages[1].metadata,
            Some(serde_json::json!({"phone": "15551234567"}))
        );
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let (_dir, db) = test_db().await;
        let err = db
            .save_message(NewMessage::user("sess-1", "user-1", "   \n"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidMessage(_)));
        assert!(db.get_session("sess-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dangling_parent_rolls_back() {
        let (_dir, db) = test_db().await;

        let err = db
            .save_message(
                NewMessage::assistant("sess-1", "user-1", "greeter", "hi").with_parent("nope"),
            )
            .await
            .unwrap_err();
        assert!(!err.is_unavailable());

        // Session creation from the failed transaction did not commit
        assert!(db.get_session("sess-1").await.unwrap().is_none());

        let first = db
            .save_message(NewMessage::user("sess-1", "user-1", "hello"))
            .await
            .unwrap();
        assert_eq!(first.turn_number, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_has_no_messages() {
        let (_dir, db) = test_db().await;
        assert!(db.get_session_messages("ghost", 5).await.unwrap().is_empty());
        assert!(db.get_recent_messages("ghost", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_and_recent_windows_are_ascending() {
        let (_dir, db) = test_db().await;
        for i in 1..=5 {
            db.save_message(NewMessage::user("sess-1", "user-1", format!("turn {i}")))
                .await
                .unwrap();
        }

        let first: Vec<i64> = db
            .get_session_messages("sess-1", 3)
            .await
            .unwrap()
            .iter()
            .map(|m| m.turn_number)
            .collect();
        assert_eq!(first, vec![1, 2, 3]);

        let recent: Vec<i64> = db
            .get_recent_messages("sess-1", 2)
            .await
            .unwrap()
            .iter()
            .map(|m| m.turn_number)
            .collect();
        assert_eq!(recent, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_save_updates_activity_timestamps() {
        let (_dir, db) = test_db().await;
        let session = db.get_or_create_session("sess-1", "user-1").await.unwrap();
        let user = db.get_or_create_user("user-1", None).await.unwrap();

        let msg = db
            .save_message(NewMessage::user("sess-1", "user-1", "ping"))
            .await
            .unwrap();

        let session_after = db.get_session("sess-1").await.unwrap().unwrap();
        let user_after = db.get_or_create_user("user-1", None).await.unwrap();
        assert!(session_after.last_message_at >= session.last_message_at);
        assert_eq!(session_after.last_message_at, msg.created_at);
        assert!(user_after.last_active >= user.last_active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_produce_gapless_turns() {
        let (_dir, db) = test_db().await;
        let mut tasks = JoinSet::new();

        for i in 0..20 {
            let db = db.clone();
            tasks.spawn(async move {
                db.save_message(NewMessage::user("sess-1", "user-1", format!("message {i}")))
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let turns: Vec<i64> = db
            .get_session_messages("sess-1", 100)
            .await
            .unwrap()
            .iter()
            .map(|m| m.turn_number)
            .collect();
        assert_eq!(turns, (1..=20).collect::<Vec<i64>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sessions_number_independently() {
        let (_dir, db) = test_db().await;
        let mut tasks = JoinSet::new();

        for s in 0..4 {
            for t in 0..3 {
                let db = db.clone();
                tasks.spawn(async move {
                    db.save_message(NewMessage::user(
                        format!("sess-{s}"),
                        format!("user-{s}"),
                        format!("turn {t}"),
                    ))
                    .await
                });
            }
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        for s in 0..4 {
            let turns: Vec<i64> = db
                .get_session_messages(&format!("sess-{s}"), 10)
                .await
                .unwrap()
                .iter()
                .map(|m| m.turn_number)
                .collect();
            assert_eq!(turns, vec![1, 2, 3]);
        }
    }
}
