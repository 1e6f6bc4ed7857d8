//! Chat messages. Append-only, writable while the session is confirmed.

use sqlx::PgPool;
use uuid::Uuid;

use super::ChatError;
use super::sessions::{find_session, get_for_participant};
use crate::models::chat::ChatMessageRecord;
use crate::uuid::uuidv7;

pub const MAX_MESSAGE_LEN: usize = 2000;

/// Trim and bound a message body.
pub fn validate_message(text: &str) -> Result<&str, ChatError> {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > MAX_MESSAGE_LEN {
        return Err(ChatError::Validation("invalid_message"));
    }
    Ok(text)
}

/// Append a message. The insert is guarded on participant and status in the
/// same statement, so a concurrent end or cancel cannot slip a message in.
pub async fn send_message(
    pool: &PgPool,
    session_id: Uuid,
    sender: Uuid,
    text: &str,
) -> Result<ChatMessageRecord, ChatError> {
    let text = validate_message(text)?;

    let inserted = sqlx::query_as::<_, ChatMessageRecord>(
        r#"
        INSERT INTO chat_messages (id, chat_session_id, sender_user_id, message_text)
        SELECT $1, s.id, $3, $4
        FROM chat_sessions s
        WHERE s.id = $2
          AND (s.consumer_id = $3 OR s.astrologer_id = $3)
          AND s.status IN ('accepted', 'active')
        RETURNING id, chat_session_id, sender_user_id, message_text, created_at
        "#,
    )
    .bind(uuidv7())
    .bind(session_id)
    .bind(sender)
    .bind(text)
    .fetch_optional(pool)
    .await?;

    if let Some(message) = inserted {
        return Ok(message);
    }
    Err(match find_session(pool, session_id).await? {
        None => ChatError::SessionNotFound,
        Some(s) if !s.is_participant(sender) => ChatError::NotParticipant,
        Some(s) => ChatError::NotAcceptingMessages(s.status),
    })
}

/// Messages of a session, oldest first.
pub async fn list_messages(
    pool: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
    take: i64,
) -> Result<Vec<ChatMessageRecord>, ChatError> {
    get_for_participant(pool, session_id, user_id).await?;
    let rows = sqlx::query_as::<_, ChatMessageRecord>(
        r#"
        SELECT id, chat_session_id, sender_user_id, message_text, created_at
        FROM chat_messages
        WHERE chat_session_id = $1
        ORDER BY created_at, id
        LIMIT $2
        "#,
    )
    .bind(session_id)
    .bind(take)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
