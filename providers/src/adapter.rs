use serde_json::Value;

use agix_config::ProviderKeys;

use crate::error::ProviderError;
use crate::types::{Provider, UpstreamRequest, Usage};

/// Translates between the OpenAI-shaped request/response the agent sees and
/// one upstream provider's wire format.
///
/// Implementations are stateless and synchronous; the HTTP call itself is
/// made by the dispatcher, not the adapter, so adapters stay easy to unit test.
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Builds the upstream request for `model` given an OpenAI-shaped chat
    /// completion request body.
    fn build_request(&self, model: &str, openai_body: &Value, keys: &ProviderKeys) -> Result<UpstreamRequest, ProviderError>;

    /// Translates an upstream (non-streaming) response body back into
    /// OpenAI chat-completion shape, and extracts token usage.
    fn translate_response(&self, model: &str, upstream_body: &Value) -> Result<(Value, Usage), ProviderError>;

    /// Extracts usage from one decoded SSE data payload during streaming, if
    /// present. Most providers only populate usage on the final chunk.
    fn usage_from_sse_payload(&self, payload: &Value) -> Option<Usage>;
}
