//! Agent runtime adapter interface.
//!
//! The runtime is an opaque black box: one [`AgentRuntime::invoke`] call per
//! turn yields a lazy stream of [`NativeMessage`] values, which the session
//! orchestrator normalizes into wire events.
//!
//! ```text
//! SessionOrchestrator
//!     |
//!     |  invoke(InvocationRequest { prompt, cwd, allowed_tools, resume_token, .. })
//!     v
//! &dyn AgentRuntime --> NativeStream = Stream<Result<NativeMessage, RuntimeError>>
//! ```

pub mod claude_code;
pub mod trait_def;
pub mod types;

pub use claude_code::ClaudeCodeRuntime;
pub use trait_def::{AgentRuntime, NativeStream, RuntimeError};
pub use types::{
    ContentBlock, InvocationRequest, McpServerConfig, NativeMessage, PermissionMode,
    ResultMessage,
};
