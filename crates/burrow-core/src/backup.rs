//! Project backup signaling.
//!
//! The session path only ever calls [`BackupSignal::mark_dirty`], which
//! enqueues without waiting. A [`BackupWorker`] owns the other end of the
//! queue, coalesces repeated ids, and hands each dirty project to a
//! [`ProjectArchiver`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Fire-and-forget notification that a project's files changed.
pub trait BackupSignal: Send + Sync {
    fn mark_dirty(&self, project_id: Uuid);
}

/// Bounded-queue [`BackupSignal`].
#[derive(Debug, Clone)]
pub struct BackupQueue {
    tx: mpsc::Sender<Uuid>,
}

impl BackupQueue {
    /// Create the queue and the receiver to hand to a [`BackupWorker`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl BackupSignal for BackupQueue {
    fn mark_dirty(&self, project_id: Uuid) {
        match self.tx.try_send(project_id) {
            Ok(()) => tracing::debug!(project_id = %project_id, "project marked for backup"),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(project_id = %project_id, "backup queue full, dropping signal");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(project_id = %project_id, "backup worker stopped, dropping signal");
            }
        }
    }
}

/// Archival mechanics for one project.
#[async_trait]
pub trait ProjectArchiver: Send + Sync {
    async fn archive(&self, project_id: Uuid) -> anyhow::Result<()>;
}

/// Archiver that only records the request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingArchiver;

#[async_trait]
impl ProjectArchiver for LoggingArchiver {
    async fn archive(&self, project_id: Uuid) -> anyhow::Result<()> {
        tracing::info!(project_id = %project_id, "project backup requested");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackupStats {
    pub archived: usize,
    pub failed: usize,
}

pub struct BackupWorker {
    rx: mpsc::Receiver<Uuid>,
    archiver: Arc<dyn ProjectArchiver>,
    debounce: Duration,
}

impl BackupWorker {
    pub fn new(rx: mpsc::Receiver<Uuid>, archiver: Arc<dyn ProjectArchiver>, debounce: Duration) -> Self {
        Self {
            rx,
            archiver,
            debounce,
        }
    }

    /// Run until cancelled or until every [`BackupQueue`] is dropped.
    /// Pending ids are flushed before returning.
    pub async fn run(mut self, cancel: CancellationToken) -> BackupStats {
        let mut stats = BackupStats::default();
        let mut pending = BTreeSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    while let Ok(id) = self.rx.try_recv() {
                        pending.insert(id);
                    }
                    self.flush(&mut pending, &mut stats).await;
                    break;
                }
                received = self.rx.recv() => {
                    let Some(id) = received else {
                        self.flush(&mut pending, &mut stats).await;
                        break;
                    };
                    pending.insert(id);

                    // Coalesce bursts within the debounce window.
                    let deadline = tokio::time::Instant::now() + self.debounce;
                    while let Ok(Some(id)) = tokio::time::timeout_at(deadline, self.rx.recv()).await {
                        pending.insert(id);
                    }
                    self.flush(&mut pending, &mut stats).await;
                }
            }
        }

        tracing::info!(
            archived = stats.archived,
            failed = stats.failed,
            "backup worker stopped"
        );
        stats
    }

    async fn flush(&self, pending: &mut BTreeSet<Uuid>, stats: &mut BackupStats) {
        for project_id in std::mem::take(pending) {
            match self.archiver.archive(project_id).await {
                Ok(()) => stats.archived += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!(project_id = %project_id, error = %e, "project backup failed");
                }
            }
        }
    }
}
