//! Storage collaborators used by the session orchestrator and the HTTP
//! read views.
//!
//! Both traits are object safe; the server holds them as `Arc<dyn ..>`.
//! Errors are plain `anyhow` errors: the orchestrator logs them and moves on.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use burrow_db::models::{Conversation, Message, MessageRole, Project};
use burrow_db::queries::conversations::ConversationSummary;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Project>>;

    async fn create(&self, name: &str, owner_email: &str) -> Result<Project>;

    async fn list_for_owner(&self, owner_email: &str) -> Result<Vec<Project>>;

    /// Fetch a project owned by `owner_email`. A project that exists but
    /// belongs to someone else is reported as absent.
    async fn get_owned(&self, id: Uuid, owner_email: &str) -> Result<Option<Project>> {
        Ok(self.get(id).await?.filter(|p| p.user_email == owner_email))
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, project_id: Uuid, title: &str) -> Result<Conversation>;

    /// Fetch a conversation of `project_id`. A conversation that exists but
    /// belongs to another project is reported as absent.
    async fn get(&self, project_id: Uuid, id: Uuid) -> Result<Option<Conversation>>;

    /// Fetch by id alone, for read-only views.
    async fn find(&self, id: Uuid) -> Result<Option<Conversation>>;

    async fn list(&self, project_id: Uuid) -> Result<Vec<ConversationSummary>>;

    async fn add_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        is_error: bool,
    ) -> Result<()>;

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    /// Replace the stored session token. Never called with an empty token.
    async fn update_session_token(&self, id: Uuid, token: &str) -> Result<()>;

    async fn update_cluster_id(&self, id: Uuid, cluster_id: &str) -> Result<()>;
}
