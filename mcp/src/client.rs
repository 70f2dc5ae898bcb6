use std::sync::Mutex;
use std::time::Duration;

use mcp_core::ResultMessage;
use serde_json::Value;
use tokio::task;

use crate::error::McpError;
use crate::session::McpSession;
use crate::types::{McpToolDescriptor, ToolCallContent};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// One running MCP server connection.
///
/// Holds the session behind a blocking `Mutex` and dispatches `tools/list` /
/// `tools/call` through `block_in_place`, since the underlying transport is
/// a synchronous channel read.
pub struct McpClient {
    name: String,
    session: Mutex<McpSession>,
}

impl McpClient {
    pub fn spawn(
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        env: Vec<(String, String)>,
        stderr_verbose: bool,
    ) -> Result<Self, McpError> {
        let session = McpSession::spawn(command, args, env, stderr_verbose)?;
        Ok(Self { name: name.into(), session: Mutex::new(session) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn request(&self, id: &str, method: &str, params: Value) -> Result<ResultMessage, McpError> {
        let mut session = self.session.lock().map_err(|_| McpError::Transport("session poisoned".into()))?;
        session.send_request(id, method, params)?;
        session
            .wait_for_result(id, CALL_TIMEOUT)?
            .ok_or_else(|| McpError::Transport(format!("timeout waiting for {method}")))
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError> {
        let owning_server = self.name.clone();
        task::block_in_place(|| {
            let result = self.request("agix-tools-list", "tools/list", Value::Object(serde_json::Map::new()))?;
            parse_list_tools_result(result, &owning_server)
        })
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallContent, McpError> {
        let id = format!("agix-call-{tool_name}");
        let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
        task::block_in_place(|| {
            let result = self.request(&id, "tools/call", params)?;
            parse_call_tool_result(result)
        })
    }
}

fn parse_list_tools_result(result: ResultMessage, owning_server: &str) -> Result<Vec<McpToolDescriptor>, McpError> {
    if let Some(err) = result.error {
        return Err(McpError::ToolError(err.message));
    }
    let tools_value = result
        .result
        .and_then(|r| r.get("tools").cloned())
        .ok_or_else(|| McpError::Transport("no tools in tools/list response".into()))?;
    let tools_array = tools_value.as_array().ok_or_else(|| McpError::Transport("tools not an array".into()))?;

    let mut specs = Vec::with_capacity(tools_array.len());
    for t in tools_array {
        let obj = t.as_object().ok_or_else(|| McpError::Transport("tool item not an object".into()))?;
        let name = obj.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let description = obj.get("description").and_then(|v| v.as_str()).map(String::from);
        let input_schema = obj.get("inputSchema").cloned().unwrap_or(Value::Object(serde_json::Map::new()));
        specs.push(McpToolDescriptor { name, owning_server: owning_server.to_string(), description, input_schema });
    }
    Ok(specs)
}

fn parse_call_tool_result(result: ResultMessage) -> Result<ToolCallContent, McpError> {
    if let Some(err) = result.error {
        return Err(McpError::ToolError(err.message));
    }
    let result_value = result.result.ok_or_else(|| McpError::Transport("no result in tools/call response".into()))?;

    if result_value.get("isError").and_then(|v| v.as_bool()).unwrap_or(false) {
        let msg = result_value
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|b| b.get("text").and_then(|t| t.as_str()))
            .unwrap_or("tool returned error")
            .to_string();
        return Err(McpError::ToolError(msg));
    }

    let mut text_parts = Vec::new();
    if let Some(content_array) = result_value.get("content").and_then(|c| c.as_array()) {
        for block in content_array {
            if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    text_parts.push(t);
                }
            }
        }
    }
    let mut text = text_parts.join("\n").trim().to_string();
    if text.is_empty() {
        if let Some(structured) = result_value.get("structuredContent") {
            text = serde_json::to_string(structured).unwrap_or_default();
        }
    }
    if text.is_empty() {
        return Err(McpError::Transport("no text or structuredContent in tools/call response".into()));
    }
    Ok(ToolCallContent { text })
}
