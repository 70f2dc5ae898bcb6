//! Upstream provider adapters and failover dispatch.
//!
//! Each [`adapter::ProviderAdapter`] translates between the OpenAI-shaped
//! request/response the agent sees and one upstream's wire format;
//! [`dispatch::dispatch`] owns the HTTP call and walks a failover chain on
//! retryable failures. [`sse`] scans a streaming response for opportunistic
//! usage without buffering or rewriting it.

mod adapter;
mod anthropic;
mod deepseek;
mod dispatch;
mod error;
mod openai;
mod sse;
mod types;

pub use adapter::ProviderAdapter;
pub use anthropic::AnthropicAdapter;
pub use deepseek::DeepSeekAdapter;
pub use dispatch::{dispatch, dispatch_stream, DispatchOutcome, Registry, StreamDispatchOutcome};
pub use error::ProviderError;
pub use openai::OpenAiAdapter;
pub use sse::{SseChunk, SseUsageScanner};
pub use types::{Provider, Usage, UpstreamRequest};
