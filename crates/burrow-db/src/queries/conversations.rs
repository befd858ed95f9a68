//! Database query functions for the `conversations` table.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::Conversation;

/// Conversation row plus its message count, for list views.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub cluster_id: Option<String>,
    pub message_count: i64,
}

/// Insert a new conversation under `project_id`.
pub async fn insert_conversation(
    pool: &PgPool,
    project_id: Uuid,
    title: &str,
) -> Result<Conversation> {
    let conversation = sqlx::query_as::<_, Conversation>(
        "INSERT INTO conversations (project_id, title) \
         VALUES ($1, $2) \
         RETURNING *",
    )
    .bind(project_id)
    .bind(title)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert conversation for project {project_id}"))?;

    Ok(conversation)
}

/// Fetch a conversation by ID, but only if it belongs to `project_id`.
pub async fn get_conversation(
    pool: &PgPool,
    project_id: Uuid,
    id: Uuid,
) -> Result<Option<Conversation>> {
    let conversation = sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE id = $1 AND project_id = $2",
    )
    .bind(id)
    .bind(project_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch conversation {id}"))?;

    Ok(conversation)
}

/// Fetch a conversation by ID regardless of project.
pub async fn get_conversation_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Conversation>> {
    let conversation = sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch conversation {id}"))?;

    Ok(conversation)
}

/// List conversations in a project, newest first, with message counts.
pub async fn list_conversations_for_project(
    pool: &PgPool,
    project_id: Uuid,
) -> Result<Vec<ConversationSummary>> {
    let rows = sqlx::query_as::<_, ConversationSummary>(
        "SELECT c.id, c.project_id, c.title, c.created_at, c.cluster_id, \
                COUNT(m.id) AS message_count \
         FROM conversations c \
         LEFT JOIN messages m ON m.conversation_id = c.id \
         WHERE c.project_id = $1 \
         GROUP BY c.id \
         ORDER BY c.created_at DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list conversations for project {project_id}"))?;

    Ok(rows)
}

/// Replace the stored runtime session token.
pub async fn update_session_id(pool: &PgPool, id: Uuid, session_id: &str) -> Result<()> {
    let result = sqlx::query("UPDATE conversations SET session_id = $1 WHERE id = $2")
        .bind(session_id)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update conversation session id")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("conversation {id} not found");
    }

    Ok(())
}

/// Replace the stored cluster id.
pub async fn update_cluster_id(pool: &PgPool, id: Uuid, cluster_id: &str) -> Result<()> {
    let result = sqlx::query("UPDATE conversations SET cluster_id = $1 WHERE id = $2")
        .bind(cluster_id)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update conversation cluster id")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("conversation {id} not found");
    }

    Ok(())
}
