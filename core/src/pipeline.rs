//! The request dispatcher: wires every guard and processing stage into a
//! single fixed order. Stages are explicit struct fields (some `Option`,
//! when the stage is conditionally configured) rather than a dynamically
//! composed graph, so the order here *is* the order that runs -- no
//! runtime wiring to trace through.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use uuid::Uuid;

use agix_config::Config;
use agix_mcp::ToolManager;
use agix_providers::{dispatch, Provider, Registry};
use agix_pricing::PricingTable;
use agix_store::{RequestRecord, Store};

use crate::audit::Auditor;
use crate::budget::BudgetChecker;
use crate::cache::{CacheHit, Embedder, SemanticCache};
use crate::compress::{CompactionPlan, Compressor};
use crate::error::PipelineError;
use crate::experiment::ExperimentAssigner;
use crate::firewall::Firewall;
use crate::prompt::PromptInjector;
use crate::quality_gate::QualityGate;
use crate::rate_limit::RateLimiter;
use crate::response_policy::ResponsePolicy;
use crate::router::{Complexity, Router};
use crate::session::SessionStore;
use crate::tool_loop;
use crate::tracer::Tracer;

pub struct PipelineResult {
    pub status: u16,
    pub body: Value,
    pub headers: Vec<(String, String)>,
}

/// Outcome of a streaming request: SSE events relayed verbatim from
/// upstream as they arrive. Headers are whatever is known before the first
/// byte is sent; cost/token headers never appear on a streaming response
/// since usage is only known once the stream ends.
pub struct StreamResult {
    pub headers: Vec<(String, String)>,
    pub chunks: tokio::sync::mpsc::Receiver<Vec<u8>>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineBuildError {
    #[error(transparent)]
    Firewall(#[from] crate::firewall::RuleCompileError),
    #[error(transparent)]
    ResponsePolicy(#[from] crate::response_policy::PolicyCompileError),
}

pub struct Pipeline {
    config: Config,
    store: Arc<Store>,
    registry: Registry,
    tools: Option<Arc<ToolManager>>,
    firewall: Option<Firewall>,
    response_policy: Option<ResponsePolicy>,
    rate_limiter: RateLimiter,
    budget_checker: BudgetChecker,
    cache: Option<SemanticCache>,
    sessions: SessionStore,
    tracer: Tracer,
    auditor: Auditor,
    client: reqwest::Client,
}

impl Pipeline {
    pub fn new(config: Config, store: Arc<Store>, pricing: PricingTable, tools: Option<Arc<ToolManager>>, embedder: Option<Arc<dyn Embedder>>) -> Result<Self, PipelineBuildError> {
        let firewall = if config.firewall.enabled { Some(Firewall::compile(&config.firewall)?) } else { None };
        let response_policy = if config.response_policy.enabled { Some(ResponsePolicy::compile(&config.response_policy)?) } else { None };
        let cache = Some(SemanticCache::new(&config.cache, embedder));
        let registry = Registry::new(pricing);
        let sessions = SessionStore::new(&config.session_overrides);
        let tracer = Tracer::new(&config.tracing);
        let auditor = Auditor::new(&config.audit, store.clone());
        let rate_limiter = RateLimiter::new();
        let budget_checker = BudgetChecker::new(store.clone());

        Ok(Self { config, store, registry, tools, firewall, response_policy, rate_limiter, budget_checker, cache, sessions, tracer, auditor, client: reqwest::Client::new() })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn pricing(&self) -> &PricingTable {
        self.registry.pricing()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Swaps in a differently-configured registry, e.g. one pointed at a
    /// test double's base URLs instead of the real provider endpoints.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Runs one chat-completion request for `agent` through the full
    /// pipeline, returning the final status/body/headers to send back.
    pub async fn handle(&self, agent: &str, session_id: Option<&str>, force_model: Option<&str>, mut body: Value) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        let mut headers = Vec::new();

        let requested_model = body.get("model").and_then(Value::as_str).ok_or_else(|| PipelineError::BadRequest("missing model".to_string()))?.to_string();
        let original_model = requested_model.clone();

        // 1. rate limit.
        let rate_limit_config = self.config.rate_limits.get(agent);
        if let Err(retry_after_secs) = self.rate_limiter.check(agent, rate_limit_config) {
            return Err(PipelineError::RateLimited { retry_after_secs });
        }

        // 2. budget precheck (fail-open) + alert compute.
        let budget_config = self.config.budgets.get(agent);
        let budget_status = self.budget_checker.check(agent, budget_config).await;
        if budget_status.exceeded {
            self.auditor.record(agent, "budget_block", format!("daily={:.2} monthly={:.2}", budget_status.daily_spend, budget_status.monthly_spend)).await;
            return Err(PipelineError::BudgetExceeded(agent.to_string()));
        }
        if let Some(budget_config) = budget_config {
            if self.budget_checker.should_alert(agent, &budget_status, budget_config.alert_at_percent) {
                if let Some(webhook) = &budget_config.alert_webhook {
                    let _ = crate::alert::deliver(&self.client, webhook, None, json!({"agent": agent, "daily_percent": budget_status.daily_percent, "monthly_percent": budget_status.monthly_percent})).await;
                }
            }
        }

        // 3. session override: applied before the firewall inspects the body.
        if let Some(session_id) = session_id {
            if let Some(overrides) = self.sessions.get(session_id) {
                apply_session_overrides(&mut body, &overrides);
            }
        }

        // 4. firewall: scan the last user message for blocked content.
        if let Some(firewall) = &self.firewall {
            let text = last_user_text(&body);
            let hits = firewall.scan(&text);
            for hit in &hits {
                self.auditor.record(agent, "firewall_hit", format!("rule={} category={} action={:?}", hit.rule_name, hit.category, hit.action)).await;
            }
            if let Some(hit) = hits.iter().find(|h| h.action == agix_config::FirewallAction::Block) {
                return Err(PipelineError::FirewallBlock(hit.rule_name.clone()));
            }
        }

        // 5. prompt template injection.
        let injector = PromptInjector::new(&self.config.prompt_templates);
        let templates = injector.templates_for(agent);
        if !templates.is_empty() {
            inject_system_prompts(&mut body, &templates, injector.position());
        }

        // 6. semantic cache lookup (keyed on the model in effect before routing/experiments).
        let pre_route_model = body.get("model").and_then(Value::as_str).unwrap_or(&requested_model).to_string();
        let mut cache_fingerprint = None;
        if let Some(cache) = &self.cache {
            let messages = body.get("messages").cloned().unwrap_or(Value::Null);
            let fingerprint = SemanticCache::fingerprint(&pre_route_model, &messages);
            let embed_text = last_user_text(&body);
            if let Some(hit) = cache.lookup(&fingerprint, Some(&embed_text)).await {
                let (response, method) = match hit {
                    CacheHit::Exact(v) => (v, "exact"),
                    CacheHit::Semantic(v) => (v, "semantic"),
                };
                headers.push(("X-Cache".to_string(), "HIT".to_string()));
                headers.push(("X-Cache-Method".to_string(), method.to_string()));
                return Ok(PipelineResult { status: 200, body: response, headers });
            }
            cache_fingerprint = Some(fingerprint);
            headers.push(("X-Cache".to_string(), "MISS".to_string()));
        }

        // 7. smart routing.
        let mut model = pre_route_model.clone();
        if force_model.is_none() {
            let router = Router::new(&self.config.routing);
            let messages = body.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
            let complexity = router.classify("default", &messages);
            if let Some(remapped) = router.remap(&model, complexity) {
                model = remapped.to_string();
                headers.push(("X-Routed-Complexity".to_string(), if complexity == Complexity::Simple { "simple".to_string() } else { "complex".to_string() }));
            }
        } else if let Some(forced) = force_model {
            model = forced.to_string();
        }

        // 8. experiment assignment (only if routing left the model untouched).
        if model == pre_route_model {
            let assigner = ExperimentAssigner::new(&self.config.experiments);
            if let Some(assignment) = assigner.assign(agent) {
                model = assignment.model;
                headers.push(("X-Experiment".to_string(), assignment.experiment_name));
            }
        }

        if model != original_model {
            headers.push(("X-Original-Model".to_string(), original_model.clone()));
        }
        body["model"] = Value::String(model.clone());

        // 9. context compression, against the final routed/experiment model.
        if let Some(messages) = body.get("messages").and_then(Value::as_array).cloned() {
            let compressor = Compressor::new(&self.config.compression);
            if let CompactionPlan::Needed { model: summary_model, to_summarize, keep } = compressor.plan(&messages) {
                let summary_model = summary_model.unwrap_or(&model);
                let summary = self.summarize(summary_model, &to_summarize).await.unwrap_or_else(|_| "[summary unavailable]".to_string());
                let spliced = Compressor::splice(&summary, &keep);
                body["messages"] = Value::Array(spliced);
            }
        }

        // 10. dispatch, with a tool loop if the agent has MCP tools available.
        let mut trace = self.tracer.should_sample().then(|| self.tracer.start_trace(Uuid::new_v4().to_string(), agent.to_string(), model.clone()));
        let dispatch_span = trace.as_ref().map(|t| t.start_span("dispatch"));

        let failover_chain = self.config.failover.chains.get(&model).cloned().unwrap_or_default();
        let has_tools = self.has_tools(agent);

        let (mut response_body, provider, usage, failover_from) = if has_tools {
            let tools = self.tools.as_ref().expect("checked above");
            let messages = body.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
            let outcome = tool_loop::run(&self.client, &self.registry, tools, &self.auditor, agent, &model, messages, &body, &self.config.keys, self.config.tools.max_iterations).await?;
            let provider = self.registry.pricing().lookup(&model).and_then(|e| Provider::parse(&e.provider)).unwrap_or(Provider::OpenAi);
            (outcome.body, provider, outcome.usage, None)
        } else {
            let outcome = dispatch(&self.client, &self.registry, &model, &body, &self.config.keys, &failover_chain, self.config.failover.max_retries).await?;
            (outcome.body, outcome.provider, outcome.usage, outcome.failover_from)
        };

        if let (Some(trace), Some(span)) = (trace.as_mut(), dispatch_span) {
            trace.finish_span(span);
        }

        if let Some(failover_from) = &failover_from {
            headers.push(("X-Failover-From".to_string(), failover_from.clone()));
        }

        // 11. quality gate. A `Retry` response is re-evaluated against the
        // gate again, up to `max_retries` attempts, so a model that keeps
        // refusing doesn't retry forever.
        let gate = QualityGate::new(&self.config.quality_gate);
        let mut retries_left = gate.max_retries();
        loop {
            let content = response_body["choices"][0]["message"]["content"].as_str().unwrap_or("").to_string();
            let finish_reason = response_body["choices"][0]["finish_reason"].as_str().unwrap_or("stop").to_string();
            let Some((_issue, action)) = gate.evaluate(&content, &finish_reason) else { break };
            match action {
                agix_config::QualityAction::Reject => return Err(PipelineError::QualityRejected(finish_reason)),
                agix_config::QualityAction::Warn => {
                    headers.push(("X-Quality-Warning".to_string(), finish_reason.clone()));
                    break;
                }
                agix_config::QualityAction::Retry => {
                    if retries_left == 0 {
                        headers.push(("X-Quality-Warning".to_string(), finish_reason.clone()));
                        break;
                    }
                    retries_left -= 1;
                    let outcome = dispatch(&self.client, &self.registry, &model, &body, &self.config.keys, &[], 0).await?;
                    response_body = outcome.body;
                }
            }
        }

        // 12. response policy (redaction, truncation).
        if let Some(policy) = &self.response_policy {
            if let Some(text) = response_body["choices"][0]["message"]["content"].as_str() {
                let (redacted, summary) = policy.apply(agent, text);
                response_body["choices"][0]["message"]["content"] = Value::String(redacted);
                headers.push(("X-Response-Policy".to_string(), summary.header_value()));
            }
        }

        // 13. cache store.
        if let (Some(cache), Some(fingerprint)) = (&self.cache, cache_fingerprint) {
            let embed_text = last_user_text(&body);
            cache.store(fingerprint, Some(&embed_text), response_body.clone()).await;
        }

        // 14. accounting.
        let cost = self.registry.pricing().cost(&model, usage.input_tokens, usage.output_tokens).unwrap_or(0.0);
        let record = RequestRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            agent_name: agent.to_string(),
            model: model.clone(),
            provider: provider.as_str().to_string(),
            input_tokens: usage.input_tokens as i64,
            output_tokens: usage.output_tokens as i64,
            cost_usd: cost,
            duration_ms: started.elapsed().as_millis() as i64,
            status_code: 200,
            failover_from: failover_from.unwrap_or_default(),
            original_model: if model != original_model { original_model } else { String::new() },
        };
        if let Err(e) = self.store.insert_async(record).await {
            tracing::warn!(error = %e, "failed to persist request record");
        }
        let trace_id = trace.as_ref().map(|t| t.trace_id().to_string());
        if let Some(trace) = trace {
            if let Err(e) = self.store.insert_trace(trace.into_record()).await {
                tracing::warn!(error = %e, "failed to persist trace record");
            }
        }

        headers.push(("X-Cost-USD".to_string(), format!("{cost:.6}")));
        headers.push(("X-Input-Tokens".to_string(), usage.input_tokens.to_string()));
        headers.push(("X-Output-Tokens".to_string(), usage.output_tokens.to_string()));
        headers.push(("X-Provider".to_string(), provider.as_str().to_string()));
        if let Some(trace_id) = trace_id {
            headers.push(("X-Trace-ID".to_string(), trace_id));
        }

        Ok(PipelineResult { status: 200, body: response_body, headers })
    }

    /// Whether `agent` currently has any MCP tools available. Streaming is
    /// forced off when this is true (a mid-stream tool call can't be relayed
    /// as raw SSE), so callers check this before choosing the streaming path.
    pub fn has_tools(&self, agent: &str) -> bool {
        self.tools.as_ref().map(|t| !t.tools_for_agent(agent).is_empty()).unwrap_or(false)
    }

    /// Runs a `stream: true` request through every guard stage up to
    /// dispatch, then relays the upstream SSE response verbatim. The
    /// semantic cache is never consulted (lookup or store) for a streaming
    /// request, and the quality gate/response policy -- which both need a
    /// materialized response body -- do not run either; one accounting row
    /// is recorded once the stream ends, with the totals observed along the
    /// way (zero if none were ever seen).
    pub async fn handle_stream(&self, agent: &str, session_id: Option<&str>, force_model: Option<&str>, mut body: Value) -> Result<StreamResult, PipelineError> {
        let started = Instant::now();
        let mut headers = Vec::new();

        let requested_model = body.get("model").and_then(Value::as_str).ok_or_else(|| PipelineError::BadRequest("missing model".to_string()))?.to_string();
        let original_model = requested_model.clone();

        // 1. rate limit.
        let rate_limit_config = self.config.rate_limits.get(agent);
        if let Err(retry_after_secs) = self.rate_limiter.check(agent, rate_limit_config) {
            return Err(PipelineError::RateLimited { retry_after_secs });
        }

        // 2. budget precheck (fail-open) + alert compute.
        let budget_config = self.config.budgets.get(agent);
        let budget_status = self.budget_checker.check(agent, budget_config).await;
        if budget_status.exceeded {
            self.auditor.record(agent, "budget_block", format!("daily={:.2} monthly={:.2}", budget_status.daily_spend, budget_status.monthly_spend)).await;
            return Err(PipelineError::BudgetExceeded(agent.to_string()));
        }
        if let Some(budget_config) = budget_config {
            if self.budget_checker.should_alert(agent, &budget_status, budget_config.alert_at_percent) {
                if let Some(webhook) = &budget_config.alert_webhook {
                    let _ = crate::alert::deliver(&self.client, webhook, None, json!({"agent": agent, "daily_percent": budget_status.daily_percent, "monthly_percent": budget_status.monthly_percent})).await;
                }
            }
        }

        // 3. session override.
        if let Some(session_id) = session_id {
            if let Some(overrides) = self.sessions.get(session_id) {
                apply_session_overrides(&mut body, &overrides);
            }
        }

        // 4. firewall.
        if let Some(firewall) = &self.firewall {
            let text = last_user_text(&body);
            let hits = firewall.scan(&text);
            for hit in &hits {
                self.auditor.record(agent, "firewall_hit", format!("rule={} category={} action={:?}", hit.rule_name, hit.category, hit.action)).await;
            }
            if let Some(hit) = hits.iter().find(|h| h.action == agix_config::FirewallAction::Block) {
                return Err(PipelineError::FirewallBlock(hit.rule_name.clone()));
            }
        }

        // 5. prompt template injection.
        let injector = PromptInjector::new(&self.config.prompt_templates);
        let templates = injector.templates_for(agent);
        if !templates.is_empty() {
            inject_system_prompts(&mut body, &templates, injector.position());
        }

        // Cache is never consulted for streaming requests (6 is skipped).
        let pre_route_model = body.get("model").and_then(Value::as_str).unwrap_or(&requested_model).to_string();

        // 7. smart routing.
        let mut model = pre_route_model.clone();
        if force_model.is_none() {
            let router = Router::new(&self.config.routing);
            let messages = body.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
            let complexity = router.classify("default", &messages);
            if let Some(remapped) = router.remap(&model, complexity) {
                model = remapped.to_string();
                headers.push(("X-Routed-Complexity".to_string(), if complexity == Complexity::Simple { "simple".to_string() } else { "complex".to_string() }));
            }
        } else if let Some(forced) = force_model {
            model = forced.to_string();
        }

        // 8. experiment assignment.
        if model == pre_route_model {
            let assigner = ExperimentAssigner::new(&self.config.experiments);
            if let Some(assignment) = assigner.assign(agent) {
                model = assignment.model;
                headers.push(("X-Experiment".to_string(), assignment.experiment_name));
            }
        }

        let original_model_header = if model != original_model { Some(original_model.clone()) } else { None };
        if let Some(original_model_header) = &original_model_header {
            headers.push(("X-Original-Model".to_string(), original_model_header.clone()));
        }
        body["model"] = Value::String(model.clone());

        // 9. context compression, against the final routed/experiment model.
        if let Some(messages) = body.get("messages").and_then(Value::as_array).cloned() {
            let compressor = Compressor::new(&self.config.compression);
            if let CompactionPlan::Needed { model: summary_model, to_summarize, keep } = compressor.plan(&messages) {
                let summary_model = summary_model.unwrap_or(&model);
                let summary = self.summarize(summary_model, &to_summarize).await.unwrap_or_else(|_| "[summary unavailable]".to_string());
                let spliced = Compressor::splice(&summary, &keep);
                body["messages"] = Value::Array(spliced);
            }
        }

        body["stream"] = Value::Bool(true);

        // 10. dispatch (streaming, no failover -- a mid-stream provider swap
        // would invalidate whatever partial response the agent already has).
        let outcome = agix_providers::dispatch_stream(&self.client, &self.registry, &model, &body, &self.config.keys).await?;
        headers.push(("X-Provider".to_string(), outcome.provider.as_str().to_string()));

        let usage_rx = outcome.usage;

        // 14. accounting, recorded once the stream ends (stages 11-13 do not
        // apply: they all need a materialized response body).
        let store = self.store.clone();
        let pricing = self.registry.pricing().clone();
        let agent_owned = agent.to_string();
        let accounting_model = model.clone();
        let provider = outcome.provider;
        tokio::spawn(async move {
            let usage = usage_rx.await.unwrap_or_default();
            let cost = pricing.cost(&accounting_model, usage.input_tokens, usage.output_tokens).unwrap_or(0.0);
            let record = RequestRecord {
                id: Uuid::new_v4().to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                agent_name: agent_owned,
                model: accounting_model,
                provider: provider.as_str().to_string(),
                input_tokens: usage.input_tokens as i64,
                output_tokens: usage.output_tokens as i64,
                cost_usd: cost,
                duration_ms: started.elapsed().as_millis() as i64,
                status_code: 200,
                failover_from: String::new(),
                original_model: original_model_header.unwrap_or_default(),
            };
            if let Err(e) = store.insert_async(record).await {
                tracing::warn!(error = %e, "failed to persist streaming request record");
            }
        });

        Ok(StreamResult { headers, chunks: outcome.chunks })
    }

    /// Summarizes `messages` via a nested upstream call, recorded under the
    /// synthetic `__compressor__` agent so its cost is never attributed to
    /// whichever real agent triggered compression.
    async fn summarize(&self, model: &str, messages: &[Value]) -> Result<String, PipelineError> {
        let mut prompt_messages = messages.to_vec();
        prompt_messages.push(json!({"role": "user", "content": "Summarize the conversation above concisely, preserving any decisions or facts that matter for continuing it."}));
        let body = json!({"model": model, "messages": prompt_messages});
        let outcome = dispatch(&self.client, &self.registry, model, &body, &self.config.keys, &[], 0).await.map_err(PipelineError::UpstreamTransport)?;

        let cost = self.registry.pricing().cost(model, outcome.usage.input_tokens, outcome.usage.output_tokens).unwrap_or(0.0);
        let record = RequestRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            agent_name: "__compressor__".to_string(),
            model: model.to_string(),
            provider: outcome.provider.as_str().to_string(),
            input_tokens: outcome.usage.input_tokens as i64,
            output_tokens: outcome.usage.output_tokens as i64,
            cost_usd: cost,
            duration_ms: 0,
            status_code: outcome.status as i32,
            failover_from: String::new(),
            original_model: String::new(),
        };
        if let Err(e) = self.store.insert_async(record).await {
            tracing::warn!(error = %e, "failed to persist compressor accounting record");
        }

        Ok(outcome.body["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string())
    }
}

fn last_user_text(body: &Value) -> String {
    body.get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| messages.iter().rev().find(|m| m.get("role").and_then(Value::as_str) == Some("user")))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn inject_system_prompts(body: &mut Value, templates: &[&str], position: agix_config::PromptPosition) {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else { return };
    let injected: Vec<Value> = templates.iter().map(|t| json!({"role": "system", "content": t})).collect();
    match position {
        agix_config::PromptPosition::Prepend => {
            let mut new_messages = injected;
            new_messages.append(messages);
            *messages = new_messages;
        }
        agix_config::PromptPosition::Append => {
            messages.extend(injected);
        }
    }
}

fn apply_session_overrides(body: &mut Value, overrides: &crate::session::SessionOverride) {
    if let Some(model) = &overrides.model {
        body["model"] = Value::String(model.clone());
    }
    if let Some(temperature) = overrides.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = overrides.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agix_config::{BudgetConfig, FirewallAction, FirewallConfig, FirewallRule, ProviderKeys};
    use agix_pricing::default_table;
    use tempfile::NamedTempFile;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store() -> Arc<Store> {
        let file = NamedTempFile::new().unwrap();
        Arc::new(Store::connect(file.path().to_str().unwrap()).await.unwrap())
    }

    fn base_config() -> Config {
        let mut config = Config::default();
        config.keys = ProviderKeys { openai: Some("sk-test".to_string()), ..Default::default() };
        config
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn happy_path_dispatches_and_records_accounting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2},
            })))
            .mount(&server)
            .await;

        let mut table = default_table();
        table.insert("gpt-4o".to_string(), agix_pricing::PriceEntry { provider: "openai".to_string(), input_price_per_token: 0.0, output_price_per_token: 0.0 });

        let config = base_config();
        let store = store().await;
        let registry = Registry::new(table.clone()).with_base_url(Provider::OpenAi, format!("{}/v1/chat/completions", server.uri()));
        let pipeline = Pipeline::new(config, store, table, None, None).unwrap().with_registry(registry);

        let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});
        let result = pipeline.handle("agent-a", None, None, body).await.unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(result.body["choices"][0]["message"]["content"], "hello");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn firewall_block_short_circuits_before_dispatch() {
        let mut config = base_config();
        config.firewall = FirewallConfig { enabled: true, rules: vec![FirewallRule { name: "block-ssn".to_string(), category: "pii".to_string(), pattern: r"\d{3}-\d{2}-\d{4}".to_string(), action: FirewallAction::Block }] };
        let store = store().await;
        let pipeline = Pipeline::new(config, store, default_table(), None, None).unwrap();

        let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "my ssn is 123-45-6789"}]});
        let result = pipeline.handle("agent-a", None, None, body).await;
        assert!(matches!(result, Err(PipelineError::FirewallBlock(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn budget_exceeded_blocks_before_dispatch() {
        let mut config = base_config();
        config.budgets.insert("agent-a".to_string(), BudgetConfig { daily_limit_usd: 0.0001, monthly_limit_usd: 0.0, alert_at_percent: 0.0, alert_webhook: None });
        let store = store().await;
        // Seed a prior request that already exceeds the daily limit.
        store
            .insert_async(RequestRecord {
                id: "seed".to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                agent_name: "agent-a".to_string(),
                model: "gpt-4o".to_string(),
                provider: "openai".to_string(),
                input_tokens: 1000,
                output_tokens: 1000,
                cost_usd: 10.0,
                duration_ms: 10,
                status_code: 200,
                failover_from: String::new(),
                original_model: String::new(),
            })
            .await
            .unwrap();

        let pipeline = Pipeline::new(config, store, default_table(), None, None).unwrap();
        let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});
        let result = pipeline.handle("agent-a", None, None, body).await;
        assert!(matches!(result, Err(PipelineError::BudgetExceeded(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn streaming_relays_lines_and_records_one_accounting_row() {
        let server = MockServer::start().await;
        let sse_body = "data: {\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2}}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200).set_body_string(sse_body)).mount(&server).await;

        let mut table = default_table();
        table.insert("gpt-4o".to_string(), agix_pricing::PriceEntry { provider: "openai".to_string(), input_price_per_token: 0.0, output_price_per_token: 0.0 });

        let config = base_config();
        let store = store().await;
        let registry = Registry::new(table.clone()).with_base_url(Provider::OpenAi, format!("{}/v1/chat/completions", server.uri()));
        let pipeline = Pipeline::new(config, store.clone(), table, None, None).unwrap().with_registry(registry);

        let body = json!({"model": "gpt-4o", "stream": true, "messages": [{"role": "user", "content": "hi"}]});
        let mut result = pipeline.handle_stream("agent-a", None, None, body).await.unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = result.chunks.recv().await {
            received.push(String::from_utf8(chunk).unwrap());
        }
        assert_eq!(received.len(), 2);
        assert!(received[1].contains("[DONE]"));

        let mut records = Vec::new();
        for _ in 0..50 {
            records = store.export("2000-01-01", "2100-01-01").await.unwrap();
            if !records.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agent_name, "agent-a");
        assert_eq!(records[0].input_tokens, 4);
        assert_eq!(records[0].output_tokens, 2);
    }
}
