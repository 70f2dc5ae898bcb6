use serde_json::Value;

use agix_config::ProviderKeys;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::types::{Provider, UpstreamRequest, Usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI is the proxy's own wire format, so this adapter is a passthrough:
/// the request body is forwarded unchanged (aside from the model field,
/// which the router/failover controller may have already remapped), and the
/// response is returned unchanged.
pub struct OpenAiAdapter {
    base_url: String,
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string() }
    }
}

impl OpenAiAdapter {
    /// Points the adapter at an alternate endpoint, for tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn build_request(&self, model: &str, openai_body: &Value, keys: &ProviderKeys) -> Result<UpstreamRequest, ProviderError> {
        let key = keys.openai.as_ref().ok_or_else(|| ProviderError::MissingKey("openai".to_string()))?;
        let mut body = openai_body.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("model".to_string(), Value::String(model.to_string()));
        }
        Ok(UpstreamRequest {
            url: self.base_url.clone(),
            headers: vec![("Authorization".to_string(), format!("Bearer {key}"))],
            body,
        })
    }

    fn translate_response(&self, _model: &str, upstream_body: &Value) -> Result<(Value, Usage), ProviderError> {
        let usage = extract_usage(upstream_body);
        Ok((upstream_body.clone(), usage))
    }

    fn usage_from_sse_payload(&self, payload: &Value) -> Option<Usage> {
        payload.get("usage").map(extract_usage)
    }
}

fn extract_usage(body: &Value) -> Usage {
    let usage = body.get("usage").unwrap_or(body);
    Usage {
        input_tokens: usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        output_tokens: usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_sets_model_and_auth_header() {
        let adapter = OpenAiAdapter::default();
        let keys = ProviderKeys { openai: Some("sk-test".to_string()), ..Default::default() };
        let body = serde_json::json!({"messages": [{"role": "user", "content": "hi"}]});
        let req = adapter.build_request("gpt-4o", &body, &keys).unwrap();
        assert_eq!(req.url, DEFAULT_BASE_URL);
        assert_eq!(req.body["model"], "gpt-4o");
        assert_eq!(req.headers[0], ("Authorization".to_string(), "Bearer sk-test".to_string()));
    }

    #[test]
    fn missing_key_is_an_error() {
        let adapter = OpenAiAdapter::default();
        let keys = ProviderKeys::default();
        let body = serde_json::json!({});
        assert!(matches!(adapter.build_request("gpt-4o", &body, &keys), Err(ProviderError::MissingKey(_))));
    }

    #[test]
    fn translate_response_extracts_usage_unchanged_body() {
        let adapter = OpenAiAdapter::default();
        let body = serde_json::json!({
            "choices": [{"message": {"content": "hi"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        });
        let (translated, usage) = adapter.translate_response("gpt-4o", &body).unwrap();
        assert_eq!(translated, body);
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
    }
}
