//! Stdio MCP client: owns the bridge subprocess and its JSON-RPC stream.

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use super::protocol::{
    CallToolResult, Incoming, IncomingMessage, JsonRpcReply, JsonRpcRequest, ListToolsResult,
    ToolDescriptor, PROTOCOL_VERSION,
};
use super::BridgeError;
use crate::config::BridgeConfig;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running MCP server subprocess.
///
/// Requests are strictly sequential; callers that share a bridge wrap it in a
/// mutex. Dropping the bridge kills the child.
pub struct McpBridge {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    read_timeout: Duration,
}

impl McpBridge {
    /// Spawn the bridge process and complete the MCP handshake.
    pub async fn launch(params: &BridgeConfig) -> Result<Self, BridgeError> {
        tracing::info!(
            command = %params.command,
            args = ?params.args,
            "Launching MCP tool bridge"
        );

        let mut child = Command::new(&params.command)
            .args(&params.args)
            .envs(&params.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(BridgeError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Protocol("bridge stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Protocol("bridge stdout was not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let mut bridge = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            read_timeout: params.read_timeout,
        };
        bridge.initialize().await?;
        Ok(bridge)
    }

    async fn initialize(&mut self) -> Result<(), BridgeError> {
        let result = self
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                })),
            )
            .await?;

        let server = &result["serverInfo"]["name"];
        let protocol = &result["protocolVersion"];
        tracing::debug!(%server, %protocol, "MCP bridge initialized");

        self.send(&JsonRpcRequest::notification("notifications/initialized"))
            .await
    }

    /// Discover every tool the bridge advertises, following pagination.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = serde_json::from_value(self.request("tools/list", params).await?)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen_cursors.insert(next.clone()) {
                        tracing::warn!(cursor = %next, "Bridge repeated a tools/list cursor; stopping pagination");
                        break;
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        tracing::info!(count = tools.len(), "Discovered MCP tools");
        Ok(tools)
    }

    /// Invoke a tool by name.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult, BridgeError> {
        let value = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Close stdin and give the child a moment to exit before killing it.
    pub async fn shutdown(self) {
        let Self {
            mut child, stdin, ..
        } = self;
        drop(stdin);

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "MCP bridge exited"),
            Ok(Err(e)) => tracing::warn!("Failed to wait for MCP bridge: {}", e),
            Err(_) => {
                tracing::debug!("MCP bridge did not exit in time, killing it");
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill MCP bridge: {}", e);
                }
            }
        }
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        let id = self.next_id;
        self.next_id += 1;

        self.send(&JsonRpcRequest::request(id, method, params)).await?;

        let timeout = self.read_timeout;
        match tokio::time::timeout(timeout, self.await_response(id)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout {
                method: method.to_string(),
                timeout,
            }),
        }
    }

    async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), BridgeError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn await_response(&mut self, id: u64) -> Result<Value, BridgeError> {
        loop {
            let line = self.stdout.next_line().await?.ok_or(BridgeError::Closed)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message: IncomingMessage = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!("Skipping non-JSON bridge output ({}): {}", e, line);
                    continue;
                }
            };

            match message.classify() {
                Some(Incoming::Response { id: got, result }) if got == id => {
                    return result.map_err(|e| BridgeError::Rpc {
                        code: e.code,
                        message: e.message,
                    });
                }
                Some(Incoming::Response { id: got, .. }) => {
                    tracing::warn!("Discarding response for unexpected request id {}", got);
                }
                Some(Incoming::Request { id: request_id, method }) => {
                    tracing::debug!(%method, "Answering server request");
                    self.send(&JsonRpcReply::for_request(request_id, &method)).await?;
                }
                Some(Incoming::Notification { method }) => {
                    tracing::debug!(%method, "Bridge notification");
                }
                None => tracing::debug!("Ignoring unrecognised bridge message: {}", line),
            }
        }
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "notion_mcp_agent::bridge::stderr", "{}", line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SCRIPTED_SERVER: &str = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"fake-notion","version":"0.0.1"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":"srv-1","method":"ping"}'
read pong
printf '%s\n' 'npx: downloading mcp-remote'
printf '%s\n' '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","data":"ready"}}'
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"notion-search","description":"Search","inputSchema":{"type":"object"}}],"nextCursor":"page-2"}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"tools":[{"name":"notion-create-pages"}]}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":4,"result":{"content":[{"type":"text","text":"Created PageFromMCPNotion"}],"isError":false}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":5,"error":{"code":-32602,"message":"Unknown tool: nope"}}'
read line
"#;

    const LOOPING_CURSOR_SERVER: &str = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"fake-notion","version":"0.0.1"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"notion-search"}],"nextCursor":"again"}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"tools":[{"name":"notion-fetch"}],"nextCursor":"again"}}'
read line
"#;

    fn params(command: &str, args: Vec<String>, timeout: Duration) -> BridgeConfig {
        BridgeConfig {
            command: command.to_string(),
            args,
            env: HashMap::from([("NOTION_API_KEY".to_string(), "secret".to_string())]),
            read_timeout: timeout,
        }
    }

    #[tokio::test]
    async fn handshake_list_and_call_against_scripted_server() {
        let mut script = tempfile::NamedTempFile::new().expect("temp script");
        script.write_all(SCRIPTED_SERVER.as_bytes()).expect("write script");
        let path = script.path().to_string_lossy().to_string();

        let mut bridge = McpBridge::launch(&params("sh", vec![path], Duration::from_secs(5)))
            .await
            .expect("launch");

        let tools = bridge.list_tools().await.expect("list tools");
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["notion-search", "notion-create-pages"]);

        let result = bridge
            .call_tool("notion-create-pages", json!({"title": "PageFromMCPNotion"}))
            .await
            .expect("call tool");
        assert!(!result.is_error);
        assert_eq!(result.render_text(), "Created PageFromMCPNotion");

        let err = bridge.call_tool("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::Rpc { code: -32602, .. }));

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn repeated_cursor_ends_pagination() {
        let mut script = tempfile::NamedTempFile::new().expect("temp script");
        script.write_all(LOOPING_CURSOR_SERVER.as_bytes()).expect("write script");
        let path = script.path().to_string_lossy().to_string();

        let mut bridge = McpBridge::launch(&params("sh", vec![path], Duration::from_secs(5)))
            .await
            .expect("launch");

        let tools = bridge.list_tools().await.expect("list tools");
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["notion-search", "notion-fetch"]);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn missing_executable_fails_to_spawn() {
        let result = McpBridge::launch(&params(
            "/nonexistent/notion-mcp-bridge",
            Vec::new(),
            Duration::from_secs(1),
        ))
        .await;
        assert!(matches!(result, Err(BridgeError::Spawn(_))));
    }

    #[tokio::test]
    async fn silent_server_times_out_during_initialize() {
        let result = McpBridge::launch(&params(
            "sleep",
            vec!["5".to_string()],
            Duration::from_millis(200),
        ))
        .await;
        match result {
            Err(BridgeError::Timeout { method, .. }) => assert_eq!(method, "initialize"),
            Err(other) => panic!("expected timeout, got {}", other),
            Ok(_) => panic!("expected timeout, got a running bridge"),
        }
    }

    #[tokio::test]
    async fn exiting_server_is_reported() {
        let result = McpBridge::launch(&params("true", Vec::new(), Duration::from_secs(2))).await;
        assert!(matches!(
            result,
            Err(BridgeError::Closed) | Err(BridgeError::Io(_))
        ));
    }
}
