//! Data types shared by agent runtime adapters.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the runtime treats tool calls that need approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    #[default]
    AcceptEdits,
    BypassPermissions,
    Plan,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
            Self::Plan => "plan",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            "plan" => Ok(Self::Plan),
            other => Err(format!("invalid permission mode: {other:?}")),
        }
    }
}

/// A stdio MCP server the runtime should attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server name; tool names are exposed as `mcp__<name>__<tool>`.
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl McpServerConfig {
    /// Render a set of servers as the runtime's `--mcp-config` JSON document.
    pub fn to_runtime_json(servers: &[McpServerConfig]) -> Value {
        let map: serde_json::Map<String, Value> = servers
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    serde_json::json!({
                        "command": s.command,
                        "args": s.args,
                        "env": s.env,
                    }),
                )
            })
            .collect();
        serde_json::json!({ "mcpServers": map })
    }

    /// Fully qualified name under which the runtime exposes `tool`.
    pub fn qualified_tool_name(&self, tool: &str) -> String {
        format!("mcp__{}__{}", self.name, tool)
    }
}

/// Everything the runtime needs for one turn.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub prompt: String,
    /// Project sandbox directory; the runtime's file tools are scoped here.
    pub cwd: PathBuf,
    pub allowed_tools: Vec<String>,
    pub permission_mode: PermissionMode,
    /// Session token from the previous turn, if any.
    pub resume_token: Option<String>,
    pub mcp_servers: Vec<McpServerConfig>,
    pub system_prompt: String,
}

/// A message emitted by the runtime before normalization.
///
/// Closed on purpose: anything the adapter does not recognise becomes
/// [`NativeMessage::Unknown`] and is dropped by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeMessage {
    Assistant { content: Vec<ContentBlock> },
    /// Echo of the user turn (including tool results fed back to the model).
    UserEcho,
    System { subtype: String, data: Value },
    Result(ResultMessage),
    /// Raw low-level streaming fragment.
    StreamEvent {
        event: Value,
        session_id: Option<String>,
    },
    Unknown { kind: String },
}

/// One content block of an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
    },
    Unknown {
        kind: String,
    },
}

/// The terminal message of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMessage {
    pub subtype: String,
    pub session_id: String,
    pub duration_ms: u64,
    pub total_cost_usd: Option<f64>,
    pub is_error: bool,
    pub num_turns: u32,
    pub result: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_mode_roundtrip() {
        for mode in [
            PermissionMode::Default,
            PermissionMode::AcceptEdits,
            PermissionMode::BypassPermissions,
            PermissionMode::Plan,
        ] {
            assert_eq!(mode.as_str().parse::<PermissionMode>().unwrap(), mode);
        }
        assert!("yolo".parse::<PermissionMode>().is_err());
        assert_eq!(PermissionMode::default(), PermissionMode::AcceptEdits);
    }

    #[test]
    fn mcp_config_json_shape() {
        let servers = vec![McpServerConfig {
            name: "warehouse".to_string(),
            command: "warehouse-mcp".to_string(),
            args: vec!["--stdio".to_string()],
            env: BTreeMap::from([("TOKEN".to_string(), "t".to_string())]),
        }];
        let json = McpServerConfig::to_runtime_json(&servers);
        assert_eq!(json["mcpServers"]["warehouse"]["command"], "warehouse-mcp");
        assert_eq!(json["mcpServers"]["warehouse"]["args"][0], "--stdio");
        assert_eq!(json["mcpServers"]["warehouse"]["env"]["TOKEN"], "t");
    }

    #[test]
    fn qualified_tool_name_prefix() {
        let server = McpServerConfig {
            name: "warehouse".to_string(),
            command: "x".to_string(),
            args: vec![],
            env: BTreeMap::new(),
        };
        assert_eq!(server.qualified_tool_name("execute_sql"), "mcp__warehouse__execute_sql");
    }
}
