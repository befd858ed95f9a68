use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use burrow_db::models::{Conversation, Message, MessageRole, Project};
use burrow_db::queries::conversations::ConversationSummary;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConversationStore, ProjectStore};

#[derive(Default)]
struct MemoryState {
    projects: HashMap<Uuid, Project>,
    conversations: HashMap<Uuid, Conversation>,
    /// Insertion order is transcript order.
    messages: Vec<Message>,
}

/// In-memory storage for testing and local development.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Project>> {
        Ok(self.state.read().await.projects.get(&id).cloned())
    }

    async fn create(&self, name: &str, owner_email: &str) -> Result<Project> {
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            user_email: owner_email.to_string(),
            created_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .projects
            .insert(project.id, project.clone());
        Ok(project)
    }

    async fn list_for_owner(&self, owner_email: &str) -> Result<Vec<Project>> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state
            .projects
            .values()
            .filter(|p| p.user_email == owner_email)
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create(&self, project_id: Uuid, title: &str) -> Result<Conversation> {
        let mut state = self.state.write().await;
        if !state.projects.contains_key(&project_id) {
            bail!("project {project_id} not found");
        }
        let conversation = Conversation {
            id: Uuid::new_v4(),
            project_id,
            title: title.to_string(),
            created_at: Utc::now(),
            session_id: None,
            cluster_id: None,
        };
        state.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, project_id: Uuid, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self
            .state
            .read()
            .await
            .conversations
            .get(&id)
            .filter(|c| c.project_id == project_id)
            .cloned())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn list(&self, project_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let state = self.state.read().await;
        let mut rows: Vec<ConversationSummary> = state
            .conversations
            .values()
            .filter(|c| c.project_id == project_id)
            .map(|c| ConversationSummary {
                id: c.id,
                project_id: c.project_id,
                title: c.title.clone(),
                created_at: c.created_at,
                cluster_id: c.cluster_id.clone(),
                message_count: state
                    .messages
                    .iter()
                    .filter(|m| m.conversation_id == c.id)
                    .count() as i64,
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn add_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        is_error: bool,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&conversation_id) {
            bail!("conversation {conversation_id} not found");
        }
        // Keep timestamps non-decreasing even if the wall clock steps back.
        let now = Utc::now();
        let timestamp = state
            .messages
            .iter()
            .rev()
            .find(|m| m.conversation_id == conversation_id)
            .map_or(now, |last| last.timestamp.max(now));
        state.messages.push(Message {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.to_string(),
            timestamp,
            is_error,
        });
        Ok(())
    }

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn update_session_token(&self, id: Uuid, token: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(conversation) = state.conversations.get_mut(&id) else {
            bail!("conversation {id} not found");
        };
        conversation.session_id = Some(token.to_string());
        Ok(())
    }

    async fn update_cluster_id(&self, id: Uuid, cluster_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(conversation) = state.conversations.get_mut(&id) else {
            bail!("conversation {id} not found");
        };
        conversation.cluster_id = Some(cluster_id.to_string());
        Ok(())
    }
}
