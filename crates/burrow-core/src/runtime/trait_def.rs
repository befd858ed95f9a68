//! The `AgentRuntime` trait -- the adapter interface for agent runtimes.
//!
//! The trait is object-safe so the orchestrator can hold an
//! `Arc<dyn AgentRuntime>` and tests can substitute scripted runtimes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::types::{InvocationRequest, NativeMessage};

/// A failure of the agent runtime, either while starting a turn or while the
/// turn's message stream is being consumed.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to start agent runtime '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading agent output: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent runtime exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },

    #[error("agent protocol error: {0}")]
    Protocol(String),
}

/// Lazy, non-restartable sequence of native messages for one turn. An `Err`
/// item ends the turn.
pub type NativeStream = Pin<Box<dyn Stream<Item = Result<NativeMessage, RuntimeError>> + Send>>;

/// Adapter interface for one agent runtime.
///
/// Implementations perform exactly one runtime call per `invoke`; they never
/// retry. Timeouts, if any, are the implementation's concern.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Human-readable name for this runtime (e.g. "claude-code").
    fn name(&self) -> &str;

    /// Start one turn. Errors returned here mean the turn never started;
    /// errors yielded by the stream mean it failed part-way.
    async fn invoke(&self, request: &InvocationRequest) -> Result<NativeStream, RuntimeError>;
}

// Compile-time assertion: AgentRuntime must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn AgentRuntime) {}
};

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::path::PathBuf;

    use crate::runtime::types::PermissionMode;

    /// Runtime that yields nothing.
    struct SilentRuntime;

    #[async_trait]
    impl AgentRuntime for SilentRuntime {
        fn name(&self) -> &str {
            "silent"
        }

        async fn invoke(&self, _request: &InvocationRequest) -> Result<NativeStream, RuntimeError> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    #[tokio::test]
    async fn runtime_is_object_safe() {
        let runtime: Box<dyn AgentRuntime> = Box::new(SilentRuntime);
        assert_eq!(runtime.name(), "silent");

        let request = InvocationRequest {
            prompt: "hi".to_string(),
            cwd: PathBuf::from("/tmp"),
            allowed_tools: vec![],
            permission_mode: PermissionMode::AcceptEdits,
            resume_token: None,
            mcp_servers: vec![],
            system_prompt: String::new(),
        };
        let items: Vec<_> = runtime.invoke(&request).await.unwrap().collect().await;
        assert!(items.is_empty());
    }

    #[test]
    fn exited_error_message_includes_stderr() {
        let err = RuntimeError::Exited {
            status: "exit status: 2".to_string(),
            stderr: "No conversation found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "agent runtime exited with exit status: 2: No conversation found"
        );
    }
}
