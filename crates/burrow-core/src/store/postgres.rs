//! Postgres-backed stores, delegating to `burrow_db::queries`.

use anyhow::Result;
use async_trait::async_trait;
use burrow_db::models::{Conversation, Message, MessageRole, Project};
use burrow_db::queries::conversations::{self as conv_db, ConversationSummary};
use burrow_db::queries::messages::{self as msg_db, NewMessage};
use burrow_db::queries::projects as project_db;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ConversationStore, ProjectStore};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<Project>> {
        project_db::get_project(&self.pool, id).await
    }

    async fn create(&self, name: &str, owner_email: &str) -> Result<Project> {
        project_db::insert_project(&self.pool, name, owner_email).await
    }

    async fn list_for_owner(&self, owner_email: &str) -> Result<Vec<Project>> {
        project_db::list_projects_for_owner(&self.pool, owner_email).await
    }

    async fn get_owned(&self, id: Uuid, owner_email: &str) -> Result<Option<Project>> {
        project_db::get_owned_project(&self.pool, id, owner_email).await
    }
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn create(&self, project_id: Uuid, title: &str) -> Result<Conversation> {
        conv_db::insert_conversation(&self.pool, project_id, title).await
    }

    async fn get(&self, project_id: Uuid, id: Uuid) -> Result<Option<Conversation>> {
        conv_db::get_conversation(&self.pool, project_id, id).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Conversation>> {
        conv_db::get_conversation_by_id(&self.pool, id).await
    }

    async fn list(&self, project_id: Uuid) -> Result<Vec<ConversationSummary>> {
        conv_db::list_conversations_for_project(&self.pool, project_id).await
    }

    async fn add_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        is_error: bool,
    ) -> Result<()> {
        msg_db::insert_message(
            &self.pool,
            &NewMessage {
                conversation_id,
                role,
                content,
                is_error,
            },
        )
        .await?;
        Ok(())
    }

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        msg_db::list_messages(&self.pool, conversation_id).await
    }

    async fn update_session_token(&self, id: Uuid, token: &str) -> Result<()> {
        conv_db::update_session_id(&self.pool, id, token).await
    }

    async fn update_cluster_id(&self, id: Uuid, cluster_id: &str) -> Result<()> {
        conv_db::update_cluster_id(&self.pool, id, cluster_id).await
    }
}
