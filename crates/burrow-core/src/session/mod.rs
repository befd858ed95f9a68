//! Session orchestration: one agent turn per [`InvokeRequest`].
//!
//! `invoke` returns a lazy stream; nothing happens until it is first polled.
//! The first poll resolves the project and conversation. Resolution
//! failures short-circuit to a two-frame error stream. Otherwise the turn
//! runs on its own task, feeding frames through a bounded channel:
//!
//! 1. `conversation.created`
//! 2. normalized runtime events (plus at most one error frame)
//! 3. persistence of the transcript and session token, then a backup signal
//! 4. `stream.completed` and `[DONE]`
//!
//! If the client goes away, frame emission stops and the runtime stream is
//! dropped (which kills the agent process), but step 3 still runs.

mod turn;

use std::sync::Arc;

use burrow_db::models::{Conversation, MessageRole};
use futures::{StreamExt, stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backup::BackupSignal;
use crate::events::StreamEvent;
use crate::normalize::normalize;
use crate::prompt::{SkillCatalog, build_system_prompt};
use crate::runtime::{AgentRuntime, InvocationRequest, McpServerConfig, PermissionMode};
use crate::store::{ConversationStore, ProjectStore};
use crate::tools::ToolCatalog;
use crate::transport::{Frame, FrameStream, error_stream};
use crate::workspace::ProjectWorkspaces;

pub use turn::TurnAccumulator;

/// Characters of the first message kept in a new conversation's title.
pub const TITLE_MAX_CHARS: usize = 50;

pub const DEFAULT_FRAME_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvokeRequest {
    pub project_id: Uuid,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    pub message: String,
    #[serde(default)]
    pub cluster_id: Option<String>,
    /// Caller identity. When set, the project must belong to this owner.
    /// Never read from the request body; the server fills it from the
    /// authenticated identity. `None` is a trusted local caller.
    #[serde(skip)]
    pub owner: Option<String>,
}

impl InvokeRequest {
    pub fn new(project_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            project_id,
            conversation_id: None,
            message: message.into(),
            cluster_id: None,
            owner: None,
        }
    }
}

/// Resolution failures; all of them end the turn before the runtime is called.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl SessionError {
    /// Optional human hint carried in the error frame's `message` field.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::ProjectNotFound(_) => Some("Please verify the project exists".to_string()),
            Self::ConversationNotFound(_) | Self::Storage(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub permission_mode: PermissionMode,
    pub mcp_servers: Vec<McpServerConfig>,
    pub skills: SkillCatalog,
    pub frame_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            permission_mode: PermissionMode::default(),
            mcp_servers: Vec::new(),
            skills: SkillCatalog::default(),
            frame_buffer: DEFAULT_FRAME_BUFFER,
        }
    }
}

/// The collaborators a [`SessionOrchestrator`] drives.
#[derive(Clone)]
pub struct Collaborators {
    pub projects: Arc<dyn ProjectStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub runtime: Arc<dyn AgentRuntime>,
    pub tools: Arc<ToolCatalog>,
    pub backup: Arc<dyn BackupSignal>,
    pub workspaces: ProjectWorkspaces,
}

/// Cheap to clone; every clone shares the same collaborators.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    deps: Collaborators,
    config: SessionConfig,
}

/// New-conversation title: the first 50 characters, plus `...` if cut.
pub fn derive_title(message: &str) -> String {
    let mut chars = message.chars();
    let mut title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        title.push_str("...");
    }
    title
}

impl SessionOrchestrator {
    pub fn new(deps: Collaborators, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner { deps, config }),
        }
    }

    pub fn tools(&self) -> &Arc<ToolCatalog> {
        &self.inner.deps.tools
    }

    /// The frame stream of one turn.
    ///
    /// Lazy: resolution, conversation creation and the runtime call start
    /// on the first poll, so a stream dropped unpolled has no effect. Once
    /// the turn is running, dropping the stream stops frame emission but
    /// not persistence.
    ///
    /// The stream always ends with exactly one [`Frame::Done`] unless the
    /// consumer drops it first.
    pub fn invoke(&self, request: InvokeRequest) -> FrameStream {
        let inner = self.inner.clone();
        Box::pin(stream::once(inner.start(request)).flatten())
    }
}

impl Inner {
    async fn start(self: Arc<Self>, request: InvokeRequest) -> FrameStream {
        let conversation = match self.resolve(&request).await {
            Ok(conversation) => conversation,
            Err(e) => {
                warn!(project_id = %request.project_id, error = %e, "rejecting agent invocation");
                return error_stream(e.to_string(), e.hint());
            }
        };

        info!(
            project_id = %request.project_id,
            conversation_id = %conversation.id,
            resumed = conversation.session_id.is_some(),
            "starting agent turn"
        );

        let (tx, rx) = mpsc::channel(self.config.frame_buffer.max(1));
        tokio::spawn(async move {
            self.run_turn(request, conversation, FrameSink::new(tx)).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn resolve(&self, request: &InvokeRequest) -> Result<Conversation, SessionError> {
        let projects = &self.deps.projects;
        let project = match request.owner.as_deref() {
            Some(owner) => projects.get_owned(request.project_id, owner).await?,
            None => projects.get(request.project_id).await?,
        }
        .ok_or(SessionError::ProjectNotFound(request.project_id))?;

        match request.conversation_id {
            None => {
                let conversation = self
                    .deps
                    .conversations
                    .create(project.id, &derive_title(&request.message))
                    .await?;
                info!(conversation_id = %conversation.id, "created conversation");
                Ok(conversation)
            }
            Some(id) => self
                .deps
                .conversations
                .get(project.id, id)
                .await?
                .ok_or(SessionError::ConversationNotFound(id)),
        }
    }

    async fn run_turn(&self, request: InvokeRequest, conversation: Conversation, mut sink: FrameSink) {
        let mut turn = TurnAccumulator::default();

        sink.send(StreamEvent::ConversationCreated {
            conversation_id: conversation.id,
        })
        .await;

        if sink.is_connected() {
            self.drive_runtime(&request, &conversation, &mut sink, &mut turn).await;
        } else {
            debug!(conversation_id = %conversation.id, "client gone before runtime call");
        }

        self.persist(&request, conversation.id, &turn).await;
        self.deps.backup.mark_dirty(request.project_id);

        sink.send(StreamEvent::StreamCompleted {
            is_error: turn.is_error(),
        })
        .await;
        sink.finish().await;

        info!(
            conversation_id = %conversation.id,
            is_error = turn.is_error(),
            client_connected = sink.is_connected(),
            "agent turn finished"
        );
    }

    async fn drive_runtime(
        &self,
        request: &InvokeRequest,
        conversation: &Conversation,
        sink: &mut FrameSink,
        turn: &mut TurnAccumulator,
    ) {
        let cwd = match self.deps.workspaces.ensure(request.project_id).await {
            Ok(dir) => dir,
            Err(e) => {
                let message = format!("{e:#}");
                error!(project_id = %request.project_id, error = %message, "project directory unavailable");
                fail_turn(sink, turn, message).await;
                return;
            }
        };

        if let Err(e) = self.config.skills.install_into(&cwd).await {
            warn!(project_id = %request.project_id, error = %format!("{e:#}"), "failed to install skills");
        }

        let invocation = InvocationRequest {
            prompt: request.message.clone(),
            cwd,
            allowed_tools: self.deps.tools.allowed_tools().await,
            permission_mode: self.config.permission_mode,
            resume_token: conversation.session_id.clone(),
            mcp_servers: self.config.mcp_servers.clone(),
            system_prompt: build_system_prompt(
                request.cluster_id.as_deref(),
                self.config.skills.skills(),
            ),
        };

        let mut stream = match self.deps.runtime.invoke(&invocation).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(conversation_id = %conversation.id, error = %e, "agent invocation failed");
                fail_turn(sink, turn, e.to_string()).await;
                return;
            }
        };

        while let Some(item) = stream.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    error!(conversation_id = %conversation.id, error = %e, "agent stream failed");
                    fail_turn(sink, turn, e.to_string()).await;
                    break;
                }
            };

            let normalized = normalize(message);
            if let Some(candidate) = normalized.token {
                turn.observe_token(candidate);
            }
            for event in normalized.events {
                turn.observe_event(&event);
                if !sink.send(event).await {
                    info!(conversation_id = %conversation.id, "client disconnected; stopping agent");
                    return;
                }
            }
        }
    }

    /// Persist the transcript and session state. Failures are logged only.
    async fn persist(&self, request: &InvokeRequest, conversation_id: Uuid, turn: &TurnAccumulator) {
        let conversations = &self.deps.conversations;

        match conversations
            .add_message(conversation_id, MessageRole::User, &request.message, false)
            .await
        {
            Ok(()) => {
                if let Some((content, is_error)) = turn.assistant_message() {
                    if let Err(e) = conversations
                        .add_message(conversation_id, MessageRole::Assistant, &content, is_error)
                        .await
                    {
                        error!(conversation_id = %conversation_id, error = %e, "failed to persist assistant message");
                    }
                }
            }
            Err(e) => {
                error!(conversation_id = %conversation_id, error = %e, "failed to persist user message");
            }
        }

        // Same-conversation turns are not serialized; the last writer's token wins.
        if let Some(token) = turn.token() {
            if let Err(e) = conversations.update_session_token(conversation_id, token).await {
                error!(conversation_id = %conversation_id, error = %e, "failed to store session token");
            }
        }

        if let Some(cluster_id) = request.cluster_id.as_deref().filter(|c| !c.is_empty()) {
            if let Err(e) = conversations.update_cluster_id(conversation_id, cluster_id).await {
                error!(conversation_id = %conversation_id, error = %e, "failed to store cluster id");
            }
        }
    }
}

async fn fail_turn(sink: &mut FrameSink, turn: &mut TurnAccumulator, message: String) {
    turn.record_error(message.clone());
    sink.send(StreamEvent::error(message)).await;
}

/// Sending half of a turn's frame stream. Remembers when the receiver is gone.
struct FrameSink {
    tx: mpsc::Sender<Frame>,
    connected: bool,
}

impl FrameSink {
    fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx, connected: true }
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.tx.is_closed()
    }

    /// Returns whether the client is still connected.
    async fn send(&mut self, event: StreamEvent) -> bool {
        if !self.connected {
            return false;
        }
        if self.tx.send(Frame::Event(event)).await.is_err() {
            debug!("frame receiver dropped");
            self.connected = false;
        }
        self.connected
    }

    async fn finish(&mut self) {
        if self.connected && self.tx.send(Frame::Done).await.is_err() {
            self.connected = false;
        }
    }
}
