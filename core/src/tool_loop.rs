//! Tool-use loop: attaches an agent's available MCP tools to the request,
//! dispatches (no failover inside the loop -- a mid-loop failover would
//! silently switch the provider the tool-call conversation is shaped for),
//! executes any returned tool calls, and feeds results back until the model
//! stops calling tools or `max_iterations` is hit.

use serde_json::{json, Value};

use agix_config::ProviderKeys;
use agix_mcp::ToolManager;
use agix_providers::{dispatch, Registry, Usage};

use crate::audit::Auditor;
use crate::error::PipelineError;

pub struct ToolLoopOutcome {
    pub body: Value,
    pub messages: Vec<Value>,
    pub usage: Usage,
    pub iterations: u32,
}

/// Runs the tool loop for `agent` against `model`, mutating `messages` as
/// the conversation grows with tool calls and their results.
pub async fn run(
    client: &reqwest::Client,
    registry: &Registry,
    tools: &ToolManager,
    auditor: &Auditor,
    agent: &str,
    model: &str,
    mut messages: Vec<Value>,
    request_extras: &Value,
    keys: &ProviderKeys,
    max_iterations: u32,
) -> Result<ToolLoopOutcome, PipelineError> {
    let available = tools.tools_for_agent(agent);
    let tool_defs: Vec<Value> = available
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                },
            })
        })
        .collect();

    let mut total_usage = Usage::default();

    for iteration in 1..=max_iterations {
        let mut body = request_extras.clone();
        let obj = body.as_object_mut().ok_or_else(|| PipelineError::Internal("request_extras must be a JSON object".to_string()))?;
        obj.insert("messages".to_string(), Value::Array(messages.clone()));
        if !tool_defs.is_empty() {
            obj.insert("tools".to_string(), Value::Array(tool_defs.clone()));
        }

        let outcome = dispatch(client, registry, model, &body, keys, &[], 0).await?;
        total_usage.input_tokens += outcome.usage.input_tokens;
        total_usage.output_tokens += outcome.usage.output_tokens;

        let message = outcome.body["choices"][0]["message"].clone();
        let tool_calls = message.get("tool_calls").and_then(Value::as_array).cloned().unwrap_or_default();

        if tool_calls.is_empty() {
            return Ok(ToolLoopOutcome { body: outcome.body, messages, usage: total_usage, iterations: iteration });
        }

        messages.push(message);

        let calls = tool_calls.iter().map(|call| execute_call(tools, auditor, agent, call));
        let results = futures::future::join_all(calls).await;
        messages.extend(results);
    }

    Err(PipelineError::ToolLoopExhausted)
}

async fn execute_call(tools: &ToolManager, auditor: &Auditor, agent: &str, call: &Value) -> Value {
    let id = call.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let name = call["function"]["name"].as_str().unwrap_or_default();
    let arguments: Value = call["function"]["arguments"]
        .as_str()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_else(|| json!({}));

    auditor.record(agent, "tool_call", format!("tool={name} arguments={arguments}")).await;

    let content = match tools.call_tool(agent, name, arguments).await {
        Ok(result) => result.text,
        Err(e) => format!("tool call failed: {e}"),
    };

    json!({"role": "tool", "tool_call_id": id, "content": content})
}
