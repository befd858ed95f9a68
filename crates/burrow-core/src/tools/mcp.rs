//! Tool discovery against a stdio MCP server.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tracing::debug;

use super::{DiscoveryError, ToolDiscovery};
use crate::runtime::McpServerConfig;

const JSONRPC_VERSION: &str = "2.0";
const PROTOCOL_VERSION: &str = "2024-11-05";
const INIT_REQUEST_ID: &str = "burrow-init";
const TOOLS_LIST_REQUEST_ID: &str = "burrow-tools-list";

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Lists tools by spawning the MCP server and asking it over JSON-RPC.
/// Names come back qualified as `mcp__<server>__<tool>`.
#[derive(Debug, Clone)]
pub struct McpToolDiscovery {
    server: McpServerConfig,
    timeout: Duration,
}

impl McpToolDiscovery {
    pub fn new(server: McpServerConfig) -> Self {
        Self {
            server,
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn discover(&self) -> Result<Vec<String>, DiscoveryError> {
        let mut child = Command::new(&self.server.command)
            .args(&self.server.args)
            .envs(&self.server.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DiscoveryError::Spawn {
                command: self.server.command.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DiscoveryError::Protocol("MCP server stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DiscoveryError::Protocol("MCP server stdout was not captured".to_string()))?;

        let mut lines = BufReader::new(stdout).lines();

        // The server must answer initialize before it sees anything else.
        let initialize = request_frame(
            INIT_REQUEST_ID,
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "burrow", "version": env!("CARGO_PKG_VERSION")},
            }),
        );
        write_frame(&mut stdin, &initialize).await?;
        let response = self.await_response(&mut lines, INIT_REQUEST_ID, "initialize").await?;
        result_of(&response)?;

        write_frame(
            &mut stdin,
            &json!({"jsonrpc": JSONRPC_VERSION, "method": "notifications/initialized"}),
        )
        .await?;
        write_frame(
            &mut stdin,
            &request_frame(TOOLS_LIST_REQUEST_ID, "tools/list", json!({})),
        )
        .await?;
        let response = self
            .await_response(&mut lines, TOOLS_LIST_REQUEST_ID, "tools/list")
            .await?;
        self.tool_names(&result_of(&response)?)
    }

    /// Read stdout until the response with `id` arrives. Notifications,
    /// other ids and non-JSON noise are skipped.
    async fn await_response(
        &self,
        lines: &mut Lines<BufReader<ChildStdout>>,
        id: &str,
        method: &str,
    ) -> Result<Value, DiscoveryError> {
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let response: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(e) => {
                    debug!(line = trimmed, error = %e, "ignoring non-JSON MCP output");
                    continue;
                }
            };
            if response.get("id").and_then(Value::as_str) == Some(id) {
                return Ok(response);
            }
        }

        Err(DiscoveryError::Protocol(format!(
            "MCP server '{}' closed without answering {method}",
            self.server.name
        )))
    }

    fn tool_names(&self, result: &Value) -> Result<Vec<String>, DiscoveryError> {
        let tools = result.get("tools").and_then(Value::as_array).ok_or_else(|| {
            DiscoveryError::Protocol(format!(
                "MCP server '{}' returned invalid tools/list payload",
                self.server.name
            ))
        })?;

        Ok(tools
            .iter()
            .filter_map(|tool| tool.get("name").and_then(Value::as_str))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| self.server.qualified_tool_name(name))
            .collect())
    }
}

async fn write_frame(stdin: &mut ChildStdin, frame: &Value) -> Result<(), DiscoveryError> {
    let mut line = frame.to_string();
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

fn request_frame(id: &str, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
}

fn result_of(response: &Value) -> Result<Value, DiscoveryError> {
    if let Some(error) = response.get("error") {
        return Err(DiscoveryError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown JSON-RPC error")
                .to_string(),
        });
    }
    response
        .get("result")
        .cloned()
        .ok_or_else(|| DiscoveryError::Protocol("JSON-RPC response has no result".to_string()))
}

#[async_trait]
impl ToolDiscovery for McpToolDiscovery {
    async fn list_tools(&self) -> Result<Vec<String>, DiscoveryError> {
        tokio::time::timeout(self.timeout, self.discover())
            .await
            .map_err(|_| DiscoveryError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    fn server(command: &Path) -> McpServerConfig {
        McpServerConfig {
            name: "warehouse".to_string(),
            command: command.to_string_lossy().into_owned(),
            args: vec![],
            env: BTreeMap::new(),
        }
    }

    const MOCK_SERVER: &str = r#"
while IFS= read -r line; do
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  if [ "$method" = "initialize" ]; then
    printf '{"jsonrpc":"2.0","id":"%s","result":{"protocolVersion":"2024-11-05","capabilities":{}}}\n' "$id"
  fi
  if [ "$method" = "tools/list" ]; then
    printf '{"jsonrpc":"2.0","id":"%s","result":{"tools":[{"name":"execute_sql"},{"name":"list_warehouses"},{"name":"  "}]}}\n' "$id"
  fi
done
"#;

    #[tokio::test]
    async fn lists_qualified_tool_names() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "mcp.sh", MOCK_SERVER);

        let tools = McpToolDiscovery::new(server(&script)).list_tools().await.unwrap();
        assert_eq!(
            tools,
            vec!["mcp__warehouse__execute_sql", "mcp__warehouse__list_warehouses"]
        );
    }

    #[tokio::test]
    async fn requests_follow_the_initialize_response() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("methods.log");
        let script = write_script(
            tmp.path(),
            "mcp_logged.sh",
            &MOCK_SERVER.replace(
                "  if [ \"$method\" = \"initialize\" ]; then",
                "  printf '%s\\n' \"$method\" >> \"$MCP_LOG\"\n  if [ \"$method\" = \"initialize\" ]; then",
            ),
        );
        let mut config = server(&script);
        config
            .env
            .insert("MCP_LOG".to_string(), log.to_string_lossy().into_owned());

        let tools = McpToolDiscovery::new(config).list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(
            std::fs::read_to_string(&log).unwrap(),
            "initialize\nnotifications/initialized\ntools/list\n"
        );
    }

    #[tokio::test]
    async fn tools_list_is_not_sent_before_initialize_is_answered() {
        let tmp = tempfile::tempdir().unwrap();
        // Answers tools/list but never initialize.
        let script = write_script(
            tmp.path(),
            "mcp_no_init.sh",
            r#"
while IFS= read -r line; do
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  if [ "$method" = "tools/list" ]; then
    printf '{"jsonrpc":"2.0","id":"%s","result":{"tools":[{"name":"execute_sql"}]}}\n' "$id"
  fi
done
"#,
        );

        let err = McpToolDiscovery::new(server(&script))
            .with_timeout(Duration::from_millis(300))
            .list_tools()
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn rpc_error_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            "mcp_err.sh",
            r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  if [ -n "$id" ]; then
    printf '{"jsonrpc":"2.0","id":"%s","error":{"code":-32601,"message":"nope"}}\n' "$id"
  fi
done
"#,
        );

        let err = McpToolDiscovery::new(server(&script)).list_tools().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Rpc { code: -32601, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "mcp_slow.sh", "sleep 5\n");

        let err = McpToolDiscovery::new(server(&script))
            .with_timeout(Duration::from_millis(100))
            .list_tools()
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout(_)));
    }

    #[tokio::test]
    async fn server_exiting_early_is_a_protocol_error() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "mcp_exit.sh", "exit 0\n");

        let err = McpToolDiscovery::new(server(&script)).list_tools().await.unwrap_err();
        // Writing may race the exit; either way discovery fails.
        assert!(
            matches!(err, DiscoveryError::Protocol(_) | DiscoveryError::Io(_)),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let err = McpToolDiscovery::new(server(Path::new("/nonexistent/mcp-server")))
            .list_tools()
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Spawn { .. }));
    }
}
