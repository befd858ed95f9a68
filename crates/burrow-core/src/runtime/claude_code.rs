//! Claude Code runtime adapter.
//!
//! Spawns `claude -p --output-format stream-json` in the project directory,
//! feeds the prompt on stdin and parses the JSONL it prints into
//! [`NativeMessage`] values.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, warn};

use super::trait_def::{AgentRuntime, NativeStream, RuntimeError};
use super::types::{ContentBlock, InvocationRequest, McpServerConfig, NativeMessage, ResultMessage};

/// How much of the runtime's stderr is kept for error reports.
const STDERR_TAIL_BYTES: usize = 2048;

/// Runtime adapter for the Claude Code CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCodeRuntime {
    /// Path to the `claude` binary. Defaults to `"claude"` (found via `$PATH`).
    claude_binary_path: String,
}

impl ClaudeCodeRuntime {
    /// Create a runtime that will look for `claude` on `$PATH`.
    pub fn new() -> Self {
        Self::with_binary("claude")
    }

    /// Create a runtime with a custom binary path.
    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            claude_binary_path: path.into(),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.claude_binary_path
    }

    /// Build the subprocess command for one turn. The prompt itself is not
    /// an argument; it is written to stdin.
    fn build_command(&self, request: &InvocationRequest) -> Command {
        let mut cmd = Command::new(&self.claude_binary_path);

        cmd.arg("-p")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--permission-mode")
            .arg(request.permission_mode.as_str());

        if !request.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(request.allowed_tools.join(","));
        }

        if let Some(token) = &request.resume_token {
            cmd.arg("--resume").arg(token);
        }

        if !request.mcp_servers.is_empty() {
            cmd.arg("--mcp-config")
                .arg(McpServerConfig::to_runtime_json(&request.mcp_servers).to_string());
        }

        if !request.system_prompt.is_empty() {
            cmd.arg("--system-prompt").arg(&request.system_prompt);
        }

        cmd.current_dir(&request.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A dropped stream (client went away) must not leave the agent running.
            .kill_on_drop(true);

        cmd
    }
}

impl Default for ClaudeCodeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// JSONL parsing helpers
// ---------------------------------------------------------------------------

/// Parse one JSONL line into a [`NativeMessage`].
///
/// Only malformed JSON is an error; unrecognised shapes become
/// [`NativeMessage::Unknown`].
fn parse_stream_json_line(line: &str) -> Result<NativeMessage, serde_json::Error> {
    let v: Value = serde_json::from_str(line)?;
    Ok(parse_message(v))
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_message(v: Value) -> NativeMessage {
    let kind = v.get("type").and_then(Value::as_str).unwrap_or("").to_string();

    match kind.as_str() {
        "assistant" => {
            let content = v
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_array)
                .map(|blocks| blocks.iter().map(parse_content_block).collect())
                .unwrap_or_default();
            NativeMessage::Assistant { content }
        }
        "user" => NativeMessage::UserEcho,
        "system" => NativeMessage::System {
            subtype: str_field(&v, "subtype").unwrap_or_default(),
            // The whole line is the payload; `session_id` lives at the top level.
            data: v,
        },
        "result" => NativeMessage::Result(ResultMessage {
            subtype: str_field(&v, "subtype").unwrap_or_default(),
            session_id: str_field(&v, "session_id").unwrap_or_default(),
            duration_ms: v.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
            total_cost_usd: v.get("total_cost_usd").and_then(Value::as_f64),
            is_error: v.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            num_turns: v
                .get("num_turns")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            result: str_field(&v, "result"),
        }),
        "stream_event" => NativeMessage::StreamEvent {
            event: v.get("event").cloned().unwrap_or(Value::Null),
            session_id: str_field(&v, "session_id"),
        },
        _ => NativeMessage::Unknown { kind },
    }
}

fn parse_content_block(block: &Value) -> ContentBlock {
    let kind = block.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "text" => ContentBlock::Text {
            text: str_field(block, "text").unwrap_or_default(),
        },
        "thinking" => ContentBlock::Thinking {
            thinking: str_field(block, "thinking").unwrap_or_default(),
        },
        "tool_use" => ContentBlock::ToolUse {
            id: str_field(block, "id").unwrap_or_default(),
            name: str_field(block, "name").unwrap_or_default(),
            input: block.get("input").cloned().unwrap_or(Value::Null),
        },
        "tool_result" => ContentBlock::ToolResult {
            tool_use_id: str_field(block, "tool_use_id").unwrap_or_default(),
            content: block.get("content").cloned().unwrap_or(Value::Null),
            is_error: block.get("is_error").and_then(Value::as_bool).unwrap_or(false),
        },
        other => ContentBlock::Unknown {
            kind: other.to_string(),
        },
    }
}

/// Read stderr to EOF and keep only its tail.
async fn read_stderr_tail(mut stderr: ChildStderr) -> String {
    let mut buf = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut buf).await {
        debug!(error = %e, "failed to read agent stderr");
    }
    let text = String::from_utf8_lossy(&buf);
    let text = text.trim();
    let start = text
        .char_indices()
        .map(|(i, _)| i)
        .find(|i| text.len() - i <= STDERR_TAIL_BYTES)
        .unwrap_or(text.len());
    text[start..].to_string()
}

// ---------------------------------------------------------------------------
// AgentRuntime implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl AgentRuntime for ClaudeCodeRuntime {
    fn name(&self) -> &str {
        "claude-code"
    }

    async fn invoke(&self, request: &InvocationRequest) -> Result<NativeStream, RuntimeError> {
        let mut child = self
            .build_command(request)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                binary: self.claude_binary_path.clone(),
                source,
            })?;

        debug!(
            pid = child.id(),
            cwd = %request.cwd.display(),
            resume = request.resume_token.is_some(),
            tools = request.allowed_tools.len(),
            "spawned claude runtime"
        );

        if let Some(mut stdin) = child.stdin.take() {
            // A runtime that exits before reading stdin surfaces through its
            // exit status, so a broken pipe here is not fatal.
            if let Err(e) = stdin.write_all(request.prompt.as_bytes()).await {
                debug!(error = %e, "failed to write prompt to agent stdin");
            }
            drop(stdin);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Protocol("agent stdout was not captured".to_string()))?;
        let stderr_tail = child.stderr.take().map(|s| tokio::spawn(read_stderr_tail(s)));

        let stream = async_stream::stream! {
            // Owning the child here ties its lifetime to the stream.
            let mut child = child;
            let mut lines = BufReader::new(stdout).lines();
            let mut saw_result = false;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match parse_stream_json_line(trimmed) {
                            Ok(message) => {
                                if matches!(message, NativeMessage::Result(_)) {
                                    saw_result = true;
                                }
                                yield Ok(message);
                            }
                            Err(e) => {
                                warn!(line = trimmed, error = %e, "skipping malformed JSONL line");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(RuntimeError::Io(e));
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if !status.success() && !saw_result => {
                    let stderr = match stderr_tail {
                        Some(handle) => handle.await.unwrap_or_default(),
                        None => String::new(),
                    };
                    yield Err(RuntimeError::Exited {
                        status: status.to_string(),
                        stderr,
                    });
                }
                Ok(status) => {
                    debug!(%status, "claude runtime exited");
                }
                Err(e) => {
                    yield Err(RuntimeError::Io(e));
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
