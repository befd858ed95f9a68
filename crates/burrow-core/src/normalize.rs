//! Maps native runtime messages onto [`StreamEvent`]s.
//!
//! The mapping is total: every [`NativeMessage`] produces zero or more
//! events, and variants without a wire counterpart are logged and dropped.

use serde_json::Value;
use tracing::warn;

use crate::events::StreamEvent;
use crate::runtime::{ContentBlock, NativeMessage};

/// A session token observed while normalizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCandidate {
    /// From a `system/init` message. Only used if nothing was captured yet.
    Init(String),
    /// From the terminal result message. Always wins.
    Result(String),
}

impl TokenCandidate {
    /// Fold this candidate into the token captured so far.
    pub fn apply(self, current: &mut Option<String>) {
        match self {
            Self::Init(token) => {
                if current.is_none() {
                    *current = Some(token);
                }
            }
            Self::Result(token) => *current = Some(token),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct Normalized {
    pub events: Vec<StreamEvent>,
    pub token: Option<TokenCandidate>,
}

pub fn normalize(message: NativeMessage) -> Normalized {
    let mut out = Normalized::default();

    match message {
        NativeMessage::Assistant { content } => {
            out.events = content.into_iter().filter_map(normalize_block).collect();
        }
        NativeMessage::UserEcho => {}
        NativeMessage::System { subtype, data } => {
            if subtype == "init" {
                out.token = data
                    .get("session_id")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(|s| TokenCandidate::Init(s.to_string()));
            }
            out.events.push(StreamEvent::System { subtype, data });
        }
        NativeMessage::Result(result) => {
            if !result.session_id.is_empty() {
                out.token = Some(TokenCandidate::Result(result.session_id.clone()));
            }
            out.events.push(StreamEvent::Result {
                session_id: result.session_id,
                duration_ms: result.duration_ms,
                total_cost_usd: result.total_cost_usd,
                is_error: result.is_error,
                num_turns: result.num_turns,
            });
        }
        NativeMessage::StreamEvent { event, session_id } => {
            out.events.push(StreamEvent::StreamEvent { event, session_id });
        }
        NativeMessage::Unknown { kind } => {
            warn!(kind = %kind, "dropping unrecognized runtime message");
        }
    }

    out
}

fn normalize_block(block: ContentBlock) -> Option<StreamEvent> {
    match block {
        ContentBlock::Text { text } => Some(StreamEvent::Text { text }),
        ContentBlock::Thinking { thinking } => Some(StreamEvent::Thinking { thinking }),
        ContentBlock::ToolUse { id, name, input } => Some(StreamEvent::ToolUse {
            tool_id: id,
            tool_name: name,
            tool_input: input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(StreamEvent::ToolResult {
            tool_use_id,
            content,
            is_error,
        }),
        ContentBlock::Unknown { kind } => {
            warn!(kind = %kind, "dropping unrecognized content block");
            None
        }
    }
}
