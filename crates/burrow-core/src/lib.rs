//! Core of burrow: runs one coding-agent turn per request inside a
//! per-project sandbox directory and streams the result to the client.
//!
//! ```text
//! SessionOrchestrator
//!     | resolve project + conversation (store)
//!     | allow-list (tools) + system prompt (prompt)
//!     v
//! AgentRuntime::invoke --> NativeMessage stream
//!     |                        |
//!     |                   normalize() --> StreamEvent --> transport::Frame
//!     v
//! persist transcript (store) --> BackupSignal::mark_dirty --> [DONE]
//! ```

pub mod backup;
pub mod events;
pub mod normalize;
pub mod prompt;
pub mod runtime;
pub mod session;
pub mod store;
pub mod tools;
pub mod transport;
pub mod workspace;
