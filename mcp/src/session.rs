//! MCP session: stdio transport with initialize handshake and request/response.
//!
//! Wraps `StdioClientTransport` from mcp_client. Does not handle resources or
//! prompts, only `tools/list` and `tools/call`.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use mcp_client::stdio::{
    JsonRpcMessage, StdioClientTransport, StdioClientTransportError, StdioServerParameters,
    StdioStream,
};
use mcp_core::{MessageId, NotificationMessage, RequestMessage, ResultMessage};
use serde_json::{json, Value};

const PROTOCOL_VERSION: &str = "2025-11-25";
const INITIALIZE_REQUEST_ID: &str = "agix-mcp-initialize";

/// One MCP session over stdio: spawns the server process, performs the
/// initialize handshake, and provides request/response primitives for
/// JSON-RPC calls.
pub struct McpSession {
    transport: StdioClientTransport,
    receiver: mpsc::Receiver<JsonRpcMessage>,
}

impl McpSession {
    /// Spawns `command` with `args` and `env`, then completes the initialize
    /// handshake. Child stderr is discarded unless `stderr_verbose` is set.
    pub fn spawn(
        command: impl Into<String>,
        args: Vec<String>,
        env: impl IntoIterator<Item = (String, String)>,
        stderr_verbose: bool,
    ) -> Result<Self, McpSessionError> {
        let (tx, rx) = mpsc::channel();

        let stderr_stream = if stderr_verbose { StdioStream::Inherit } else { StdioStream::Null };
        let env: Vec<(String, String)> = env.into_iter().collect();
        let mut params = StdioServerParameters::new(command).args(args).stderr(stderr_stream);
        if !env.is_empty() {
            params = params.env(env);
        }

        let mut transport = StdioClientTransport::new(params);
        transport.on_message(move |msg| {
            let _ = tx.send(msg);
        });
        transport.on_error(|e| {
            tracing::warn!(error = %e, "mcp transport error");
        });

        transport.start().map_err(McpSessionError::Transport)?;

        let mut session = Self { transport, receiver: rx };
        session.initialize()?;
        Ok(session)
    }

    fn initialize(&mut self) -> Result<(), McpSessionError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "agix", "version": env!("CARGO_PKG_VERSION") }
        });
        self.send_request(INITIALIZE_REQUEST_ID, "initialize", params)?;

        match self.wait_for_result(INITIALIZE_REQUEST_ID, Duration::from_secs(20))? {
            Some(result) => {
                if let Some(err) = result.error {
                    return Err(McpSessionError::Initialize(err.message));
                }
                let notification = JsonRpcMessage::Notification(NotificationMessage::new(
                    "notifications/initialized",
                    Some(json!({})),
                ));
                self.transport.send(&notification).map_err(McpSessionError::Transport)?;
            }
            None => return Err(McpSessionError::Initialize("timeout waiting for initialize".into())),
        }

        Ok(())
    }

    pub fn send_request(&mut self, id: &str, method: &str, params: Value) -> Result<(), McpSessionError> {
        let request = RequestMessage::new(id, method, params);
        self.transport.send(&JsonRpcMessage::Request(request)).map_err(McpSessionError::Transport)
    }

    /// Waits for a result matching `request_id`. Answers `roots/list` requests
    /// from the server with an empty root set while waiting.
    pub fn wait_for_result(
        &mut self,
        request_id: &str,
        timeout: Duration,
    ) -> Result<Option<ResultMessage>, McpSessionError> {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now()).min(Duration::from_secs(1));

            match self.receiver.recv_timeout(remaining) {
                Ok(JsonRpcMessage::Result(msg)) if message_id_matches(&msg.id, request_id) => {
                    return Ok(Some(msg));
                }
                Ok(JsonRpcMessage::Request(req)) if req.method == "roots/list" => {
                    let result = ResultMessage::success(req.id.clone(), json!({ "roots": [] }));
                    self.transport.send(&JsonRpcMessage::Result(result)).map_err(McpSessionError::Transport)?;
                }
                Ok(JsonRpcMessage::Request(_)) | Ok(JsonRpcMessage::Result(_)) => {}
                Ok(JsonRpcMessage::Notification(_)) => {}
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(None)
    }
}

fn message_id_matches(id: &MessageId, expected: &str) -> bool {
    id.as_str() == Some(expected)
}

#[derive(Debug, thiserror::Error)]
pub enum McpSessionError {
    #[error("transport: {0}")]
    Transport(#[from] StdioClientTransportError),
    #[error("initialize: {0}")]
    Initialize(String),
}
