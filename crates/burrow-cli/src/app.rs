//! Wiring of the session orchestrator and its collaborators from a resolved
//! [`BurrowConfig`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use burrow_core::backup::{
    BackupQueue, BackupStats, BackupWorker, DEFAULT_QUEUE_CAPACITY, LoggingArchiver,
};
use burrow_core::prompt::SkillCatalog;
use burrow_core::runtime::ClaudeCodeRuntime;
use burrow_core::session::{Collaborators, SessionConfig, SessionOrchestrator};
use burrow_core::store::{ConversationStore, MemoryStore, PgStore, ProjectStore};
use burrow_core::tools::{McpToolDiscovery, ToolCatalog, ToolDiscovery};
use burrow_core::workspace::ProjectWorkspaces;
use burrow_db::pool;

use crate::config::BurrowConfig;

/// Project and conversation storage, shared by the orchestrator and the
/// read-only HTTP views.
#[derive(Clone)]
pub struct Stores {
    pub projects: Arc<dyn ProjectStore>,
    pub conversations: Arc<dyn ConversationStore>,
}

impl Stores {
    /// Connect to PostgreSQL and apply pending migrations.
    pub async fn postgres(config: &BurrowConfig) -> Result<Self> {
        let db_pool = pool::create_pool(&config.db_config)
            .await
            .context("failed to connect to database; run `burrow db-init` first")?;
        pool::run_migrations(&db_pool).await?;
        let store = Arc::new(PgStore::new(db_pool));
        Ok(Self {
            projects: store.clone(),
            conversations: store,
        })
    }

    /// Process-local storage, lost on exit.
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            projects: store.clone(),
            conversations: store,
        }
    }
}

/// Tool allow-list backed by MCP discovery when an MCP server is configured.
pub fn tool_catalog(config: &BurrowConfig) -> Arc<ToolCatalog> {
    let discovery = config
        .mcp
        .clone()
        .map(|server| Arc::new(McpToolDiscovery::new(server)) as Arc<dyn ToolDiscovery>);
    Arc::new(ToolCatalog::new(discovery))
}

/// The running backup worker and the queue feeding it.
pub struct BackupHandle {
    pub queue: Arc<BackupQueue>,
    cancel: CancellationToken,
    task: JoinHandle<BackupStats>,
}

impl BackupHandle {
    pub fn spawn(config: &BurrowConfig) -> Self {
        let (queue, rx) = BackupQueue::channel(DEFAULT_QUEUE_CAPACITY);
        let worker = BackupWorker::new(rx, Arc::new(LoggingArchiver), config.backup_debounce);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));
        Self {
            queue: Arc::new(queue),
            cancel,
            task,
        }
    }

    /// Stop the worker after it flushes pending projects.
    pub async fn shutdown(self) -> Result<BackupStats> {
        self.cancel.cancel();
        let stats = self.task.await.context("backup worker panicked")?;
        tracing::info!(
            archived = stats.archived,
            failed = stats.failed,
            "backup worker stopped"
        );
        Ok(stats)
    }
}

/// Everything a command needs to run agent turns.
pub struct App {
    pub stores: Stores,
    pub workspaces: ProjectWorkspaces,
    pub tools: Arc<ToolCatalog>,
    pub orchestrator: SessionOrchestrator,
    pub backup: BackupHandle,
}

impl App {
    pub async fn build(config: &BurrowConfig, stores: Stores) -> Result<Self> {
        tokio::fs::create_dir_all(&config.projects_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create projects directory {}",
                    config.projects_dir.display()
                )
            })?;

        let skills = SkillCatalog::load(&config.skills_dir);
        tracing::info!(
            count = skills.skills().len(),
            dir = %config.skills_dir.display(),
            "skills loaded"
        );

        let workspaces = ProjectWorkspaces::new(&config.projects_dir);
        let tools = tool_catalog(config);
        let backup = BackupHandle::spawn(config);

        let orchestrator = SessionOrchestrator::new(
            Collaborators {
                projects: stores.projects.clone(),
                conversations: stores.conversations.clone(),
                runtime: Arc::new(ClaudeCodeRuntime::with_binary(config.claude_binary.as_str())),
                tools: tools.clone(),
                backup: backup.queue.clone(),
                workspaces: workspaces.clone(),
            },
            SessionConfig {
                permission_mode: config.permission_mode,
                mcp_servers: config.mcp.iter().cloned().collect(),
                skills,
                ..SessionConfig::default()
            },
        );

        Ok(Self {
            stores,
            workspaces,
            tools,
            orchestrator,
            backup,
        })
    }
}
