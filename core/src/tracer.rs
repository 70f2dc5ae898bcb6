//! Per-request tracing with Bernoulli sampling: a sampled request records a
//! flat span list that gets persisted as a single `TraceRecord` on exit.

use std::time::Instant;

use rand::Rng;
use serde_json::Value;

use agix_config::TracingConfig;
use agix_store::{Span, TraceRecord};

pub struct Tracer {
    sample_rate: f32,
}

impl Tracer {
    pub fn new(config: &TracingConfig) -> Self {
        let sample_rate = if !config.enabled { 0.0 } else { config.sample_rate };
        Self { sample_rate }
    }

    /// Decides whether this request should be traced. `sample_rate <= 0`
    /// never samples, `>= 1` always samples, otherwise a Bernoulli draw.
    pub fn should_sample(&self) -> bool {
        if self.sample_rate <= 0.0 {
            false
        } else if self.sample_rate >= 1.0 {
            true
        } else {
            rand::thread_rng().gen::<f32>() < self.sample_rate
        }
    }

    pub fn start_trace(&self, trace_id: String, agent_name: String, model: String) -> RequestTrace {
        RequestTrace { trace_id, agent_name, model, spans: Vec::new() }
    }
}

/// One request's span collector. A no-op when the request wasn't sampled;
/// callers don't need to branch on sampling before calling `span`.
pub struct RequestTrace {
    trace_id: String,
    agent_name: String,
    model: String,
    spans: Vec<Span>,
}

/// A running span; call `finish` to record it into the owning trace.
pub struct SpanGuard {
    name: String,
    started_at: Instant,
    started_at_iso: String,
    attributes: Value,
}

impl RequestTrace {
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn start_span(&self, name: impl Into<String>) -> SpanGuard {
        SpanGuard { name: name.into(), started_at: Instant::now(), started_at_iso: chrono::Utc::now().to_rfc3339(), attributes: Value::Null }
    }

    pub fn finish_span(&mut self, guard: SpanGuard) {
        self.spans.push(Span {
            name: guard.name,
            started_at: guard.started_at_iso,
            duration_ms: guard.started_at.elapsed().as_millis() as i64,
            attributes: guard.attributes,
        });
    }

    pub fn into_record(self) -> TraceRecord {
        TraceRecord { trace_id: self.trace_id, agent_name: self.agent_name, model: self.model, timestamp: chrono::Utc::now().to_rfc3339(), spans: self.spans }
    }
}

impl SpanGuard {
    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }
}
