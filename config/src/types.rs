use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    8080
}

fn default_database() -> String {
    "~/.agix/agix.db".to_string()
}

/// Root configuration, deserialized from `~/.agix/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    pub keys: ProviderKeys,
    /// Connection string; prefix (`postgres://`/`postgresql://`) selects the backend,
    /// anything else is a SQLite file path.
    #[serde(default = "default_database")]
    pub database: String,
    pub budgets: HashMap<String, BudgetConfig>,
    pub rate_limits: HashMap<String, RateLimitConfig>,
    pub firewall: FirewallConfig,
    pub cache: CacheConfig,
    pub routing: RoutingConfig,
    pub experiments: Vec<ExperimentConfig>,
    pub compression: CompressionConfig,
    pub quality_gate: QualityGateConfig,
    pub response_policy: ResponsePolicyConfig,
    pub prompt_templates: PromptTemplateConfig,
    pub failover: FailoverConfig,
    pub session_overrides: SessionOverrideConfig,
    pub tracing: TracingConfig,
    pub audit: AuditConfig,
    pub tools: ToolsConfig,
    pub webhooks: WebhooksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            keys: ProviderKeys::default(),
            database: default_database(),
            budgets: HashMap::new(),
            rate_limits: HashMap::new(),
            firewall: FirewallConfig::default(),
            cache: CacheConfig::default(),
            routing: RoutingConfig::default(),
            experiments: Vec::new(),
            compression: CompressionConfig::default(),
            quality_gate: QualityGateConfig::default(),
            response_policy: ResponsePolicyConfig::default(),
            prompt_templates: PromptTemplateConfig::default(),
            failover: FailoverConfig::default(),
            session_overrides: SessionOverrideConfig::default(),
            tracing: TracingConfig::default(),
            audit: AuditConfig::default(),
            tools: ToolsConfig::default(),
            webhooks: WebhooksConfig::default(),
        }
    }
}

/// Upstream auth credentials. Never serialized back out to agents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub deepseek: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub daily_limit_usd: f64,
    pub monthly_limit_usd: f64,
    pub alert_at_percent: f64,
    pub alert_webhook: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub enabled: bool,
    pub rules: Vec<FirewallRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallRule {
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub pattern: String,
    pub action: FirewallAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallAction {
    Block,
    Warn,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub similarity_threshold: f32,
    pub ttl_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            similarity_threshold: 0.95,
            ttl_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub enabled: bool,
    pub tiers: HashMap<String, RoutingTier>,
    pub model_map: HashMap<String, ModelMapEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingTier {
    pub max_message_tokens: u32,
    pub max_messages: u32,
    pub keywords_absent: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMapEntry {
    pub simple: Option<String>,
    pub complex: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    pub control_model: String,
    pub variant_model: String,
    pub traffic_pct: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub threshold_tokens: u32,
    pub keep_recent: u32,
    pub summary_model: Option<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_tokens: 8_000,
            keep_recent: 6,
            summary_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGateConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub on_empty: QualityAction,
    pub on_truncated: QualityAction,
    pub on_refusal: QualityAction,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 1,
            on_empty: QualityAction::Retry,
            on_truncated: QualityAction::Warn,
            on_refusal: QualityAction::Warn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityAction {
    Retry,
    Warn,
    Reject,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePolicyConfig {
    pub enabled: bool,
    pub max_output_chars: Option<u32>,
    pub redact_patterns: Vec<String>,
    pub agents: HashMap<String, ResponsePolicyOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePolicyOverride {
    pub max_output_chars: Option<u32>,
    pub redact_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplateConfig {
    pub enabled: bool,
    pub global: Option<String>,
    pub agents: HashMap<String, String>,
    pub position: PromptPosition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptPosition {
    #[default]
    Prepend,
    Append,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    pub max_retries: u32,
    pub chains: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOverrideConfig {
    pub enabled: bool,
    pub default_ttl_seconds: u64,
}

impl Default for SessionOverrideConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: 3_600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub sample_rate: f32,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub content_log: bool,
    pub dangerous_tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub max_iterations: u32,
    pub servers: HashMap<String, McpServerConfig>,
    pub agents: HashMap<String, ToolAcl>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            servers: HashMap::new(),
            agents: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolAcl {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    pub enabled: bool,
    pub definitions: HashMap<String, WebhookDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookDefinition {
    pub secret: String,
    pub model: String,
    pub prompt_template: String,
    pub callback_url: Option<String>,
}
