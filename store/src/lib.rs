//! Accounting store: durable append of request records and traces, aggregation
//! queries, and a batched async writer.
//!
//! Two backends are supported, selected by connection-string prefix:
//! an embedded SQLite file for single-host deployments, and a networked
//! PostgreSQL server for fleet deployments (`postgres://` / `postgresql://`).
//! The only cross-backend difference the rest of the crate has to think about
//! is placeholder syntax (`?` vs `$N`) and the date-cast expression used in
//! daily grouping; [`rebind`] papers over both.

mod backend;
mod error;
mod queries;
mod rebind;
mod types;
mod writer;

pub use backend::Backend;
pub use error::StoreError;
pub use rebind::rebind;
pub use types::{
    AuditEvent, CostsByDay, DailySpend, RequestRecord, Span, Stats, StatsByKey, TraceRecord,
    WebhookExecution,
};
pub use writer::WriteHandle;

use std::sync::Arc;

/// Accounting store: owns a [`Backend`] connection and a batched [`WriteHandle`].
///
/// Cloning is cheap (both fields are `Arc`-backed); share one `Store` across
/// the process.
#[derive(Clone)]
pub struct Store {
    backend: Arc<Backend>,
    writer: WriteHandle,
}

impl Store {
    /// Opens the store for the given connection string, creating schema if absent.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let backend = Arc::new(Backend::connect(database_url).await?);
        backend.ensure_schema().await?;
        let writer = WriteHandle::spawn(Arc::clone(&backend));
        Ok(Self { backend, writer })
    }

    /// Enqueues a request record for durable append. Falls back to a synchronous
    /// insert if the writer's channel is full — back-pressure must not be silent.
    pub async fn insert_async(&self, record: RequestRecord) -> Result<(), StoreError> {
        self.writer.enqueue(record, &self.backend).await
    }

    /// Appends a trace record. Traces are append-only and never mutated.
    pub async fn insert_trace(&self, trace: TraceRecord) -> Result<(), StoreError> {
        queries::insert_trace(&self.backend, &trace).await
    }

    /// Appends an audit event (firewall decisions, tool calls, budget blocks, ...).
    pub async fn insert_audit_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        queries::insert_audit_event(&self.backend, &event).await
    }

    /// Records one inbound-webhook execution.
    pub async fn insert_webhook_execution(&self, exec: WebhookExecution) -> Result<(), StoreError> {
        queries::insert_webhook_execution(&self.backend, &exec).await
    }

    /// Sum of `cost_usd` for `agent` on the given UTC calendar date (`YYYY-MM-DD`).
    pub async fn daily_spend(&self, agent: &str, date: &str) -> Result<f64, StoreError> {
        queries::daily_spend(&self.backend, agent, date).await
    }

    /// Sum of `cost_usd` for `agent` in the given UTC year/month.
    pub async fn monthly_spend(&self, agent: &str, year: i32, month: u32) -> Result<f64, StoreError> {
        queries::monthly_spend(&self.backend, agent, year, month).await
    }

    /// Most recent `limit` request records, optionally filtered by agent.
    pub async fn recent(
        &self,
        limit: u32,
        agent_filter: Option<&str>,
    ) -> Result<Vec<RequestRecord>, StoreError> {
        queries::recent(&self.backend, limit, agent_filter).await
    }

    /// Aggregate stats (count, total cost, total tokens) over `[since, until)`.
    pub async fn stats(&self, since: &str, until: &str) -> Result<Stats, StoreError> {
        queries::stats(&self.backend, since, until).await
    }

    /// Per-agent breakdown of [`stats`](Self::stats) over `[since, until)`.
    pub async fn stats_by_agent(&self, since: &str, until: &str) -> Result<Vec<StatsByKey>, StoreError> {
        queries::stats_by_agent(&self.backend, since, until).await
    }

    /// Per-model breakdown of [`stats`](Self::stats) over `[since, until)`.
    pub async fn stats_by_model(&self, since: &str, until: &str) -> Result<Vec<StatsByKey>, StoreError> {
        queries::stats_by_model(&self.backend, since, until).await
    }

    /// Daily cost totals over `[since, until)`, one row per calendar date.
    pub async fn daily_costs(&self, since: &str, until: &str) -> Result<Vec<CostsByDay>, StoreError> {
        queries::daily_costs(&self.backend, since, until).await
    }

    /// All request records in `[since, until)`, for the `/api/logs` export route.
    pub async fn export(&self, since: &str, until: &str) -> Result<Vec<RequestRecord>, StoreError> {
        queries::export(&self.backend, since, until).await
    }

    /// Flushes any buffered writes and stops the writer task. Call on shutdown.
    pub async fn close(&self) {
        self.writer.close().await;
    }
}
