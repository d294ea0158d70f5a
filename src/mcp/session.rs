use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::mcp::protocol::{
    CallToolResult, IncomingMessage, InitializeParams, InitializeResult, ListToolsResult,
    McpTool, NotificationMessage, RequestMessage, ToolOutput,
};
use crate::mcp::server_spec::ToolServerSpec;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a server gets to exit on its own after stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Something that can list and invoke tools on the agent's behalf.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    fn tools(&self) -> &[McpTool];

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput>;
}

struct Channel {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// A live MCP client session over the stdio of a child process.
pub struct ToolSession {
    child: Child,
    channel: Mutex<Channel>,
    tools: Vec<McpTool>,
    request_timeout: Duration,
    pid: Option<u32>,
}

impl ToolSession {
    /// Runs `f` against a freshly started session. The server process is
    /// stopped once `f` finishes, whatever it returned.
    pub async fn scope<T, F>(spec: &ToolServerSpec, request_timeout: Duration, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a ToolSession) -> BoxFuture<'a, Result<T>>,
    {
        let session = Self::start(spec, request_timeout).await?;
        let outcome = f(&session).await;
        let stopped = session.shutdown().await;

        match (outcome, stopped) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(stop_err)) => {
                warn!(error = %stop_err, "tool server did not stop cleanly");
                Err(e)
            }
        }
    }

    /// Spawns the server, performs the handshake and fetches the tool list.
    pub async fn start(spec: &ToolServerSpec, request_timeout: Duration) -> Result<Self> {
        info!(command = %spec.display_command(), "starting tool server");

        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn tool server `{}`", spec.display_command()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::ProtocolError("Failed to get stdin handle".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::ProtocolError("Failed to get stdout handle".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "mcp_server", "{}", line);
                }
            });
        }

        let pid = child.id();
        let mut session = Self {
            child,
            channel: Mutex::new(Channel {
                stdin,
                stdout: BufReader::new(stdout).lines(),
                next_id: 0,
            }),
            tools: Vec::new(),
            request_timeout,
            pid,
        };

        match session.handshake().await {
            Ok(tools) => {
                session.tools = tools;
                Ok(session)
            }
            Err(e) => {
                if let Err(stop_err) = session.shutdown().await {
                    warn!(error = %stop_err, "failed to stop tool server after handshake error");
                }
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> Result<Vec<McpTool>> {
        let init: InitializeResult = self
            .request("initialize", Some(serde_json::to_value(InitializeParams::default())?))
            .await?;
        if let Some(server) = &init.server_info {
            info!(server = %server.name, version = %server.version, protocol = ?init.protocol_version, "tool server initialized");
        }
        self.notify("notifications/initialized").await?;

        let listed: ListToolsResult = self.request("tools/list", None).await?;
        info!(count = listed.tools.len(), "tools available");
        Ok(listed.tools)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn write_line<M: Serialize>(channel: &mut Channel, message: &M) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        channel.stdin.write_all(line.as_bytes()).await?;
        channel.stdin.flush().await?;
        Ok(())
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let mut channel = self.channel.lock().await;
        Self::write_line(&mut channel, &NotificationMessage::new(method)).await
    }

    async fn request<R: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<R> {
        let mut channel = self.channel.lock().await;
        channel.next_id += 1;
        let id = channel.next_id;

        debug!(id, method, "sending request");
        Self::write_line(&mut channel, &RequestMessage::new(id, method, params)).await?;

        let response = tokio::time::timeout(self.request_timeout, Self::read_response(&mut channel, id))
            .await
            .map_err(|_| {
                AppError::ProtocolError(format!(
                    "'{}' timed out after {}s",
                    method,
                    self.request_timeout.as_secs()
                ))
            })??;

        if let Some(error) = response.error {
            return Err(AppError::ProtocolError(format!(
                "'{}' failed with {}: {}",
                method, error.code, error.message
            ))
            .into());
        }

        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| {
            AppError::ProtocolError(format!("Unexpected '{}' result: {}", method, e)).into()
        })
    }

    async fn read_response(channel: &mut Channel, id: u64) -> Result<IncomingMessage> {
        loop {
            let line = channel
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| AppError::ProtocolError("Tool server closed its output".to_string()))?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<IncomingMessage>(trimmed) {
                Ok(message) if message.answers(id) => return Ok(message),
                Ok(message) => {
                    debug!(method = ?message.method, "skipping server message");
                }
                Err(_) => debug!(line = trimmed, "skipping non-JSON output"),
            }
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let result: CallToolResult = self
            .request("tools/call", Some(json!({ "name": name, "arguments": arguments })))
            .await?;
        Ok(ToolOutput::from(result))
    }

    /// Closes stdin, gives the server a moment to exit, then kills it. The
    /// process is reaped before this returns.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            mut child, channel, ..
        } = self;
        // Dropping stdin signals EOF to the server
        drop(channel);

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(status) => {
                debug!(status = ?status?, "tool server exited");
            }
            Err(_) => {
                debug!("tool server still running, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ToolInvoker for ToolSession {
    fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        ToolSession::call_tool(self, name, arguments).await
    }
}
