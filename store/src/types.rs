use serde::{Deserialize, Serialize};

/// One proxied request, ready for durable append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub timestamp: String,
    pub agent_name: String,
    pub model: String,
    pub provider: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub duration_ms: i64,
    pub status_code: i32,
    /// Set when a failover controller substituted a different model/provider.
    pub failover_from: String,
    /// The model the agent originally asked for, if different from `model`.
    pub original_model: String,
}

/// One span inside a trace (a pipeline stage, an upstream call, a tool call).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    pub started_at: String,
    pub duration_ms: i64,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

/// A sampled trace: one request's full span tree, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub agent_name: String,
    pub model: String,
    pub timestamp: String,
    pub spans: Vec<Span>,
}

/// A firewall decision, budget block, tool call, or other auditable event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: String,
    pub agent_name: String,
    pub event_type: String,
    pub detail: String,
}

/// One execution of an inbound webhook handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookExecution {
    pub id: String,
    pub webhook_name: String,
    pub timestamp: String,
    pub status: String,
    pub duration_ms: i64,
    pub callback_status: Option<i32>,
}

/// Aggregate counters over a time range.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stats {
    pub request_count: i64,
    pub total_cost_usd: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
}

/// One row of a [`Stats`] breakdown, keyed by agent or model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsByKey {
    pub key: String,
    pub stats: Stats,
}

/// One day's total cost, for the daily-costs time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostsByDay {
    pub date: String,
    pub cost_usd: f64,
}

/// An agent's spend against a single calendar day, as tracked by the budget checker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DailySpend {
    pub cost_usd: f64,
    pub request_count: i64,
}
