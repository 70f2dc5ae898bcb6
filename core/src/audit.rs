//! Thin wrapper recording firewall decisions, budget blocks, and tool calls
//! as `AuditEvent` rows. Insert failures are logged, never propagated --
//! an audit-log outage must not block the request it's auditing.

use std::sync::Arc;

use uuid::Uuid;

use agix_config::AuditConfig;
use agix_store::{AuditEvent, Store};

pub struct Auditor {
    enabled: bool,
    content_log: bool,
    store: Arc<Store>,
}

impl Auditor {
    pub fn new(config: &AuditConfig, store: Arc<Store>) -> Self {
        Self { enabled: config.enabled, content_log: config.content_log, store }
    }

    /// Whether a dangerous-tool name requires an audit row even if
    /// content logging is otherwise disabled (checked by the caller).
    pub fn is_dangerous_tool(config: &AuditConfig, tool_name: &str) -> bool {
        config.dangerous_tools.iter().any(|t| t == tool_name)
    }

    pub async fn record(&self, agent_name: &str, event_type: &str, detail: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let detail = if self.content_log { detail.into() } else { "[content logging disabled]".to_string() };
        let event = AuditEvent { id: Uuid::new_v4().to_string(), timestamp: chrono::Utc::now().to_rfc3339(), agent_name: agent_name.to_string(), event_type: event_type.to_string(), detail };
        if let Err(e) = self.store.insert_audit_event(event).await {
            tracing::warn!(error = %e, "failed to persist audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn store() -> Arc<Store> {
        let file = NamedTempFile::new().unwrap();
        Arc::new(Store::connect(file.path().to_str().unwrap()).await.unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_auditing_does_not_insert() {
        let auditor = Auditor::new(&AuditConfig { enabled: false, content_log: true, dangerous_tools: vec![] }, store().await);
        auditor.record("agent-a", "firewall_block", "matched ssn rule").await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn content_log_disabled_redacts_detail() {
        let auditor = Auditor::new(&AuditConfig { enabled: true, content_log: false, dangerous_tools: vec![] }, store().await);
        auditor.record("agent-a", "tool_call", "sensitive payload").await;
    }

    #[test]
    fn dangerous_tool_lookup_matches_configured_name() {
        let config = AuditConfig { enabled: true, content_log: true, dangerous_tools: vec!["delete_file".to_string()] };
        assert!(Auditor::is_dangerous_tool(&config, "delete_file"));
        assert!(!Auditor::is_dangerous_tool(&config, "read_file"));
    }
}
