//! Tool allow-list assembly.
//!
//! The allow-list is the builtin tools followed by whatever the configured
//! MCP server advertises. Discovery runs at most once per cache generation;
//! a failed discovery leaves the cache empty and the turn gets builtins only.

pub mod mcp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

pub use mcp::McpToolDiscovery;

/// Builtin tools, in the order they are offered to the runtime.
pub const BUILTIN_TOOLS: [&str; 6] = ["Read", "Write", "Edit", "Glob", "Grep", "Skill"];

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MCP server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP server did not answer within {0:?}")]
    Timeout(Duration),

    #[error("MCP server returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("MCP protocol error: {0}")]
    Protocol(String),
}

/// Source of remotely provided tool names.
#[async_trait]
pub trait ToolDiscovery: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// Process-wide cache of the allow-list.
pub struct ToolCatalog {
    discovery: Option<Arc<dyn ToolDiscovery>>,
    // Swapping the cell invalidates; callers holding the old cell finish
    // against it undisturbed.
    cache: RwLock<Arc<OnceCell<Vec<String>>>>,
}

impl ToolCatalog {
    pub fn new(discovery: Option<Arc<dyn ToolDiscovery>>) -> Self {
        Self {
            discovery,
            cache: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    /// A catalog that never discovers anything.
    pub fn builtin_only() -> Self {
        Self::new(None)
    }

    pub fn builtin_tools() -> Vec<String> {
        BUILTIN_TOOLS.iter().map(|t| t.to_string()).collect()
    }

    /// Builtins followed by discovered tools. Never fails.
    pub async fn allowed_tools(&self) -> Vec<String> {
        let mut tools = Self::builtin_tools();

        let Some(discovery) = &self.discovery else {
            return tools;
        };

        let cell = self.cache.read().await.clone();
        let discovered = cell
            .get_or_try_init(|| async {
                let names = discovery.list_tools().await?;
                info!(count = names.len(), "discovered MCP tools");
                Ok::<_, DiscoveryError>(names)
            })
            .await;

        match discovered {
            Ok(names) => tools.extend(names.iter().cloned()),
            Err(e) => warn!(error = %e, "tool discovery failed; using builtin tools only"),
        }

        tools
    }

    /// Drop the cached discovery result; the next caller re-discovers.
    pub async fn invalidate(&self) {
        *self.cache.write().await = Arc::new(OnceCell::new());
        info!("tool cache invalidated");
    }

    pub async fn is_cached(&self) -> bool {
        self.cache.read().await.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls; fails while `fail` is set.
    struct CountingDiscovery {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
        delay: Duration,
    }

    impl CountingDiscovery {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
                delay,
            }
        }
    }

    #[async_trait]
    impl ToolDiscovery for CountingDiscovery {
        async fn list_tools(&self) -> Result<Vec<String>, DiscoveryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(DiscoveryError::Protocol("server down".to_string()));
            }
            Ok(vec![format!("mcp__warehouse__tool_v{n}")])
        }
    }

    #[tokio::test]
    async fn builtin_only_catalog() {
        let catalog = ToolCatalog::builtin_only();
        assert_eq!(
            catalog.allowed_tools().await,
            vec!["Read", "Write", "Edit", "Glob", "Grep", "Skill"]
        );
        assert!(!catalog.is_cached().await);
    }

    #[tokio::test]
    async fn discovered_tools_follow_builtins_and_are_cached() {
        let discovery = Arc::new(CountingDiscovery::new(Duration::ZERO));
        let catalog = ToolCatalog::new(Some(discovery.clone()));

        let first = catalog.allowed_tools().await;
        let second = catalog.allowed_tools().await;

        assert_eq!(first.len(), 7);
        assert_eq!(&first[..6], &BUILTIN_TOOLS.map(String::from));
        assert_eq!(first[6], "mcp__warehouse__tool_v1");
        assert_eq!(first, second);
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_access_is_single_flight() {
        let discovery = Arc::new(CountingDiscovery::new(Duration::from_millis(50)));
        let catalog = Arc::new(ToolCatalog::new(Some(discovery.clone())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = catalog.clone();
                tokio::spawn(async move { catalog.allowed_tools().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().len(), 7);
        }

        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_degrades_and_is_not_cached() {
        let discovery = Arc::new(CountingDiscovery::new(Duration::ZERO));
        discovery.fail.store(true, Ordering::SeqCst);
        let catalog = ToolCatalog::new(Some(discovery.clone()));

        assert_eq!(catalog.allowed_tools().await, ToolCatalog::builtin_tools());
        assert!(!catalog.is_cached().await);

        discovery.fail.store(false, Ordering::SeqCst);
        let tools = catalog.allowed_tools().await;
        assert_eq!(tools.len(), 7);
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_rediscovery() {
        let discovery = Arc::new(CountingDiscovery::new(Duration::ZERO));
        let catalog = ToolCatalog::new(Some(discovery.clone()));

        assert_eq!(catalog.allowed_tools().await[6], "mcp__warehouse__tool_v1");
        catalog.invalidate().await;
        assert!(!catalog.is_cached().await);
        assert_eq!(catalog.allowed_tools().await[6], "mcp__warehouse__tool_v2");
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 2);
    }
}
