//! Database query functions for the `messages` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Message, MessageRole};

/// Parameters for inserting a transcript message.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: &'a str,
    pub is_error: bool,
}

/// Append a message to a conversation. The timestamp comes from
/// `clock_timestamp()`, so sequential inserts never go backwards.
pub async fn insert_message(pool: &PgPool, new: &NewMessage<'_>) -> Result<Message> {
    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages (conversation_id, role, content, is_error) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(new.conversation_id)
    .bind(new.role)
    .bind(new.content)
    .bind(new.is_error)
    .fetch_one(pool)
    .await
    .with_context(|| {
        format!(
            "failed to insert {} message for conversation {}",
            new.role, new.conversation_id
        )
    })?;

    Ok(message)
}

/// All messages of a conversation in transcript order.
pub async fn list_messages(pool: &PgPool, conversation_id: Uuid) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages \
         WHERE conversation_id = $1 \
         ORDER BY timestamp ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list messages for conversation {conversation_id}"))?;

    Ok(messages)
}
