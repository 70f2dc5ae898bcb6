use serde_json::Value;

use agix_config::ProviderKeys;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::types::{Provider, UpstreamRequest, Usage};

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/chat/completions";

/// DeepSeek's API is OpenAI-shaped, so this is a passthrough like
/// [`crate::openai::OpenAiAdapter`], just pointed at a different endpoint.
pub struct DeepSeekAdapter {
    base_url: String,
}

impl Default for DeepSeekAdapter {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string() }
    }
}

impl DeepSeekAdapter {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl ProviderAdapter for DeepSeekAdapter {
    fn provider(&self) -> Provider {
        Provider::DeepSeek
    }

    fn build_request(&self, model: &str, openai_body: &Value, keys: &ProviderKeys) -> Result<UpstreamRequest, ProviderError> {
        let key = keys.deepseek.as_ref().ok_or_else(|| ProviderError::MissingKey("deepseek".to_string()))?;
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
        Ok((upstream_body.clone(), extract_usage(upstream_body)))
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
    fn build_request_points_at_deepseek_endpoint() {
        let adapter = DeepSeekAdapter::default();
        let keys = ProviderKeys { deepseek: Some("sk-ds".to_string()), ..Default::default() };
        let req = adapter.build_request("deepseek-chat", &serde_json::json!({}), &keys).unwrap();
        assert_eq!(req.url, DEFAULT_BASE_URL);
        assert_eq!(req.body["model"], "deepseek-chat");
    }
}
