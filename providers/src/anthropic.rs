use serde_json::{json, Value};

use agix_config::ProviderKeys;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::types::{Provider, UpstreamRequest, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Translates between the OpenAI chat-completion shape and Anthropic's
/// Messages API: the leading `system` message is lifted out of `messages`
/// into a top-level `system` field, and `max_tokens` is required upstream
/// (OpenAI callers often omit it) so a default is supplied.
pub struct AnthropicAdapter {
    base_url: String,
}

impl Default for AnthropicAdapter {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string() }
    }
}

impl AnthropicAdapter {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn build_request(&self, model: &str, openai_body: &Value, keys: &ProviderKeys) -> Result<UpstreamRequest, ProviderError> {
        let key = keys.anthropic.as_ref().ok_or_else(|| ProviderError::MissingKey("anthropic".to_string()))?;

        let messages = openai_body
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::Malformed("request body missing messages array".to_string()))?;

        let mut system = None;
        let mut rest = Vec::with_capacity(messages.len());
        for msg in messages {
            if system.is_none() && msg.get("role").and_then(Value::as_str) == Some("system") {
                system = msg.get("content").cloned();
            } else {
                rest.push(translate_message_to_anthropic(msg));
            }
        }

        let max_tokens = openai_body.get("max_tokens").and_then(Value::as_u64).unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = json!({
            "model": model,
            "messages": rest,
            "max_tokens": max_tokens,
        });
        if let Some(system) = system {
            body["system"] = system;
        }
        if let Some(temp) = openai_body.get("temperature") {
            body["temperature"] = temp.clone();
        }
        if let Some(stream) = openai_body.get("stream") {
            body["stream"] = stream.clone();
        }
        if let Some(tools) = openai_body.get("tools").and_then(Value::as_array) {
            body["tools"] = Value::Array(tools.iter().map(translate_tool_to_anthropic).collect());
        }

        Ok(UpstreamRequest {
            url: self.base_url.clone(),
            headers: vec![
                ("x-api-key".to_string(), key.clone()),
                ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
            ],
            body,
        })
    }

    fn translate_response(&self, model: &str, upstream_body: &Value) -> Result<(Value, Usage), ProviderError> {
        let blocks = upstream_body.get("content").and_then(Value::as_array).cloned().unwrap_or_default();

        let content = blocks
            .iter()
            .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|b| b.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let tool_calls: Vec<Value> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
            .map(|b| {
                json!({
                    "id": b.get("id").cloned().unwrap_or(Value::Null),
                    "type": "function",
                    "function": {
                        "name": b.get("name").cloned().unwrap_or(Value::Null),
                        "arguments": serde_json::to_string(b.get("input").unwrap_or(&Value::Null)).unwrap_or_default(),
                    },
                })
            })
            .collect();

        let stop_reason = upstream_body.get("stop_reason").and_then(Value::as_str);
        let finish_reason = match stop_reason {
            Some("end_turn") | Some("stop_sequence") => "stop",
            Some("max_tokens") => "length",
            Some("tool_use") => "tool_calls",
            Some(other) => other,
            None => "stop",
        };

        let usage = extract_usage(upstream_body);

        let mut message = json!({"role": "assistant", "content": content});
        if !tool_calls.is_empty() {
            message["tool_calls"] = Value::Array(tool_calls);
        }

        let translated = json!({
            "id": upstream_body.get("id").cloned().unwrap_or(Value::Null),
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": finish_reason,
            }],
            "usage": {
                "prompt_tokens": usage.input_tokens,
                "completion_tokens": usage.output_tokens,
                "total_tokens": usage.input_tokens + usage.output_tokens,
            },
        });

        Ok((translated, usage))
    }

    fn usage_from_sse_payload(&self, payload: &Value) -> Option<Usage> {
        let usage = payload.get("usage").or_else(|| payload.get("message").and_then(|m| m.get("usage")))?;
        Some(extract_usage(&json!({ "usage": usage })))
    }
}

/// Maps an OpenAI-shaped message to Anthropic's content-block shape: an
/// assistant `tool_calls` entry becomes `tool_use` blocks, a `tool`-role
/// result becomes a user message carrying a `tool_result` block.
fn translate_message_to_anthropic(msg: &Value) -> Value {
    let role = msg.get("role").and_then(Value::as_str).unwrap_or("user");

    if role == "tool" {
        let tool_use_id = msg.get("tool_call_id").cloned().unwrap_or(Value::Null);
        let content = msg.get("content").cloned().unwrap_or(Value::String(String::new()));
        return json!({
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": tool_use_id, "content": content}],
        });
    }

    if role == "assistant" {
        if let Some(tool_calls) = msg.get("tool_calls").and_then(Value::as_array) {
            let mut blocks = Vec::new();
            if let Some(text) = msg.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    blocks.push(json!({"type": "text", "text": text}));
                }
            }
            for call in tool_calls {
                let function = call.get("function").cloned().unwrap_or(Value::Null);
                let name = function.get("name").cloned().unwrap_or(Value::Null);
                let arguments = function
                    .get("arguments")
                    .and_then(Value::as_str)
                    .and_then(|s| serde_json::from_str::<Value>(s).ok())
                    .unwrap_or(Value::Object(serde_json::Map::new()));
                blocks.push(json!({
                    "type": "tool_use",
                    "id": call.get("id").cloned().unwrap_or(Value::Null),
                    "name": name,
                    "input": arguments,
                }));
            }
            return json!({"role": "assistant", "content": blocks});
        }
    }

    msg.clone()
}

fn translate_tool_to_anthropic(tool: &Value) -> Value {
    let function = tool.get("function").unwrap_or(tool);
    json!({
        "name": function.get("name").cloned().unwrap_or(Value::Null),
        "description": function.get("description").cloned().unwrap_or(Value::Null),
        "input_schema": function.get("parameters").cloned().unwrap_or(json!({"type": "object", "properties": {}})),
    })
}

fn extract_usage(body: &Value) -> Usage {
    let usage = body.get("usage").unwrap_or(body);
    Usage {
        input_tokens: usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
        output_tokens: usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
    }
}
