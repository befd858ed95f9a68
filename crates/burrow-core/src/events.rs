//! Client-facing stream events.
//!
//! Each event serializes to a JSON object with a `type` discriminator. The
//! set is closed; the transport appends the terminal `[DONE]` frame itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// First frame of every turn that resolved its conversation.
    #[serde(rename = "conversation.created")]
    ConversationCreated { conversation_id: Uuid },

    Text { text: String },

    Thinking { thinking: String },

    ToolUse {
        tool_id: String,
        tool_name: String,
        tool_input: Value,
    },

    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
    },

    Result {
        session_id: String,
        duration_ms: u64,
        total_cost_usd: Option<f64>,
        is_error: bool,
        num_turns: u32,
    },

    System { subtype: String, data: Value },

    /// Raw low-level fragment, forwarded for observability only.
    StreamEvent {
        event: Value,
        session_id: Option<String>,
    },

    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    #[serde(rename = "stream.completed")]
    StreamCompleted { is_error: bool },
}

impl StreamEvent {
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            message: None,
        }
    }

    /// Wire name of this event's `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConversationCreated { .. } => "conversation.created",
            Self::Text { .. } => "text",
            Self::Thinking { .. } => "thinking",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Result { .. } => "result",
            Self::System { .. } => "system",
            Self::StreamEvent { .. } => "stream_event",
            Self::Error { .. } => "error",
            Self::StreamCompleted { .. } => "stream.completed",
        }
    }
}
