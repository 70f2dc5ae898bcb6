use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use agix_config::ProviderKeys;
use agix_pricing::PricingTable;

use crate::adapter::ProviderAdapter;
use crate::anthropic::AnthropicAdapter;
use crate::deepseek::DeepSeekAdapter;
use crate::error::ProviderError;
use crate::openai::OpenAiAdapter;
use crate::sse::SseUsageScanner;
use crate::types::{Provider, Usage};

/// Resolves a model id to a provider (via pricing table prefix match) and
/// holds the one [`ProviderAdapter`] instance per provider.
pub struct Registry {
    pricing: PricingTable,
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl Registry {
    pub fn new(pricing: PricingTable) -> Self {
        let mut adapters: HashMap<Provider, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(Provider::OpenAi, Arc::new(OpenAiAdapter::default()));
        adapters.insert(Provider::Anthropic, Arc::new(AnthropicAdapter::default()));
        adapters.insert(Provider::DeepSeek, Arc::new(DeepSeekAdapter::default()));
        Self { pricing, adapters }
    }

    /// Overrides the base URL for one provider, for tests that stub the
    /// upstream with a local [`wiremock::MockServer`].
    pub fn with_base_url(mut self, provider: Provider, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let adapter: Arc<dyn ProviderAdapter> = match provider {
            Provider::OpenAi => Arc::new(OpenAiAdapter::with_base_url(base_url)),
            Provider::Anthropic => Arc::new(AnthropicAdapter::with_base_url(base_url)),
            Provider::DeepSeek => Arc::new(DeepSeekAdapter::with_base_url(base_url)),
        };
        self.adapters.insert(provider, adapter);
        self
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    fn resolve(&self, model: &str) -> Result<(Provider, Arc<dyn ProviderAdapter>), ProviderError> {
        let entry = self.pricing.lookup(model).ok_or_else(|| ProviderError::UnknownModel(model.to_string()))?;
        let provider = Provider::parse(&entry.provider).ok_or_else(|| ProviderError::UnknownModel(model.to_string()))?;
        let adapter = self.adapters.get(&provider).cloned().ok_or_else(|| ProviderError::UnknownModel(model.to_string()))?;
        Ok((provider, adapter))
    }
}

/// Outcome of a (possibly failed-over) dispatch.
pub struct DispatchOutcome {
    pub status: u16,
    pub body: Value,
    pub usage: Usage,
    pub model: String,
    pub provider: Provider,
    pub original_model: Option<String>,
    pub failover_from: Option<String>,
}

/// Posts `openai_body` for `model`, translating to/from the resolved
/// provider's wire format, and walks `failover_chain` on retryable failures
/// up to `max_retries` additional attempts.
pub async fn dispatch(
    client: &reqwest::Client,
    registry: &Registry,
    model: &str,
    openai_body: &Value,
    keys: &ProviderKeys,
    failover_chain: &[String],
    max_retries: u32,
) -> Result<DispatchOutcome, ProviderError> {
    let original_model = model.to_string();
    let mut current = model.to_string();
    let mut chain_iter = failover_chain.iter();
    let mut attempts_left = max_retries;

    loop {
        let (provider, adapter) = registry.resolve(&current)?;
        let result = attempt(client, adapter.as_ref(), &current, openai_body, keys).await;
        let failed_over = current != original_model;

        match result {
            Ok((status, body)) if status < 500 => {
                let (translated, usage) = adapter.translate_response(&current, &body)?;
                return Ok(DispatchOutcome {
                    status,
                    body: translated,
                    usage,
                    model: current.clone(),
                    provider,
                    original_model: failed_over.then(|| original_model.clone()),
                    failover_from: failed_over.then_some(original_model),
                });
            }
            Ok((status, body)) => {
                if attempts_left == 0 || chain_iter.len() == 0 {
                    return Ok(DispatchOutcome {
                        status,
                        body,
                        usage: Usage::default(),
                        model: current.clone(),
                        provider,
                        original_model: failed_over.then(|| original_model.clone()),
                        failover_from: failed_over.then_some(original_model),
                    });
                }
                let next = chain_iter.next().expect("checked non-empty above");
                tracing::warn!(from = %current, to = %next, status, "upstream 5xx, failing over");
                attempts_left -= 1;
                current = next.clone();
            }
            Err(e) if e.is_retryable() && attempts_left > 0 => match chain_iter.next() {
                Some(next) => {
                    tracing::warn!(from = %current, to = %next, error = %e, "upstream transport failure, failing over");
                    attempts_left -= 1;
                    current = next.clone();
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

/// Outcome of a streaming dispatch: SSE events relayed verbatim from
/// upstream as they arrive, plus the usage observed across the whole
/// stream (sent once the upstream connection closes).
pub struct StreamDispatchOutcome {
    pub model: String,
    pub provider: Provider,
    pub chunks: mpsc::Receiver<Vec<u8>>,
    pub usage: oneshot::Receiver<Usage>,
}

/// Posts `openai_body` (already carrying `"stream": true`) for `model` and
/// relays the upstream SSE response chunk by chunk as it arrives, scanning
/// each chunk opportunistically for usage via the resolved adapter. Unlike
/// [`dispatch`], this never walks a failover chain: switching providers
/// mid-stream would invalidate whatever partial response the agent has
/// already received.
pub async fn dispatch_stream(
    client: &reqwest::Client,
    registry: &Registry,
    model: &str,
    openai_body: &Value,
    keys: &ProviderKeys,
) -> Result<StreamDispatchOutcome, ProviderError> {
    let (provider, adapter) = registry.resolve(model)?;
    let req = adapter.build_request(model, openai_body, keys)?;
    let mut builder = client.post(&req.url).json(&req.body);
    for (name, value) in &req.headers {
        builder = builder.header(name, value);
    }
    let resp = builder.send().await?;
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        return Err(ProviderError::Upstream { status, body });
    }

    let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(32);
    let (usage_tx, usage_rx) = oneshot::channel::<Usage>();
    let model_owned = model.to_string();
    let log_model = model_owned.clone();

    tokio::spawn(async move {
        let adapter = adapter;
        let mut scanner = SseUsageScanner::new(adapter.as_ref());
        let mut byte_stream = resp.bytes_stream();
        let mut last_usage = Usage::default();

        while let Some(next) = byte_stream.next().await {
            let bytes = match next {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(error = %e, model = %log_model, "upstream stream read failed");
                    break;
                }
            };
            for event in scanner.feed(&bytes) {
                if let Some(usage) = event.usage {
                    last_usage = usage;
                }
                if chunk_tx.send(event.raw).await.is_err() {
                    return;
                }
            }
        }
        let _ = usage_tx.send(last_usage);
    });

    Ok(StreamDispatchOutcome { model: model_owned, provider, chunks: chunk_rx, usage: usage_rx })
}

async fn attempt(
    client: &reqwest::Client,
    adapter: &dyn ProviderAdapter,
    model: &str,
    openai_body: &Value,
    keys: &ProviderKeys,
) -> Result<(u16, Value), ProviderError> {
    let req = adapter.build_request(model, openai_body, keys)?;
    let mut builder = client.post(&req.url).json(&req.body);
    for (name, value) in &req.headers {
        builder = builder.header(name, value);
    }
    let resp = builder.send().await?;
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agix_pricing::{default_table, PriceEntry};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn keys() -> ProviderKeys {
        ProviderKeys {
            openai: Some("sk-openai".to_string()),
            anthropic: Some("sk-anthropic".to_string()),
            deepseek: Some("sk-deepseek".to_string()),
        }
    }

    #[tokio::test]
    async fn unknown_model_is_an_error() {
        let registry = Registry::new(default_table());
        let client = reqwest::Client::new();
        let err = dispatch(&client, &registry, "nonexistent-model", &Value::Null, &keys(), &[], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownModel(_)));
    }

    #[tokio::test]
    async fn successful_call_needs_no_failover() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hi"}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 1},
            })))
            .mount(&server)
            .await;

        let registry = Registry::new(default_table()).with_base_url(Provider::OpenAi, format!("{}/v1/chat/completions", server.uri()));
        let client = reqwest::Client::new();

        let outcome = dispatch(&client, &registry, "gpt-4o", &serde_json::json!({"messages": []}), &keys(), &[], 0).await.unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.model, "gpt-4o");
        assert!(outcome.original_model.is_none());
        assert!(outcome.failover_from.is_none());
    }

    #[tokio::test]
    async fn failover_walks_chain_to_a_healthy_secondary() {
        let openai_server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&openai_server).await;

        let anthropic_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "content": [{"type": "text", "text": "fallback reply"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 3, "output_tokens": 1},
            })))
            .mount(&anthropic_server)
            .await;

        let mut table = default_table();
        table.insert("gpt-4o-mini".to_string(), PriceEntry { provider: "openai".to_string(), input_price_per_token: 0.0, output_price_per_token: 0.0 });

        let registry = Registry::new(table)
            .with_base_url(Provider::OpenAi, format!("{}/v1/chat/completions", openai_server.uri()))
            .with_base_url(Provider::Anthropic, format!("{}/v1/messages", anthropic_server.uri()));
        let client = reqwest::Client::new();

        let chain = vec!["gpt-4o-mini".to_string(), "claude-opus-4".to_string()];
        let outcome = dispatch(&client, &registry, "gpt-4o", &serde_json::json!({"messages": []}), &keys(), &chain, 2).await.unwrap();

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.model, "claude-opus-4");
        assert_eq!(outcome.original_model.as_deref(), Some("gpt-4o"));
        assert_eq!(outcome.failover_from.as_deref(), Some("gpt-4o"));
        assert_eq!(outcome.usage.input_tokens, 3);
    }

    #[tokio::test]
    async fn chain_exhausted_surfaces_last_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let registry = Registry::new(default_table()).with_base_url(Provider::OpenAi, format!("{}/v1/chat/completions", server.uri()));
        let client = reqwest::Client::new();

        let outcome = dispatch(&client, &registry, "gpt-4o", &serde_json::json!({"messages": []}), &keys(), &[], 0).await.unwrap();
        assert_eq!(outcome.status, 503);
        assert!(outcome.original_model.is_none());
    }

    #[tokio::test]
    async fn dispatch_stream_relays_lines_and_reports_final_usage() {
        let server = MockServer::start().await;
        let sse_body = "data: {\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2}}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body))
            .mount(&server)
            .await;

        let registry = Registry::new(default_table()).with_base_url(Provider::OpenAi, format!("{}/v1/chat/completions", server.uri()));
        let client = reqwest::Client::new();

        let mut outcome = dispatch_stream(&client, &registry, "gpt-4o", &serde_json::json!({"messages": [], "stream": true}), &keys()).await.unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = outcome.chunks.recv().await {
            received.push(String::from_utf8(chunk).unwrap());
        }

        assert_eq!(received.len(), 2);
        assert!(received[0].contains("\"prompt_tokens\":4"));
        assert!(received[1].contains("[DONE]"));

        let usage = outcome.usage.await.unwrap();
        assert_eq!(usage.input_tokens, 4);
        assert_eq!(usage.output_tokens, 2);
    }
}
