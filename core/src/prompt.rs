//! System-prompt injection: a global template, then a per-agent template,
//! both applied (global first); templates add to existing system messages,
//! never replace them.

use agix_config::{PromptPosition, PromptTemplateConfig};

pub struct PromptInjector<'a> {
    config: &'a PromptTemplateConfig,
}

impl<'a> PromptInjector<'a> {
    pub fn new(config: &'a PromptTemplateConfig) -> Self {
        Self { config }
    }

    /// Returns the system-message texts to add, in application order
    /// (global first, then the per-agent template if present).
    pub fn templates_for(&self, agent: &str) -> Vec<&str> {
        if !self.config.enabled {
            return Vec::new();
        }
        let mut out = Vec::new();
        if let Some(global) = self.config.global.as_deref() {
            out.push(global);
        }
        if let Some(agent_template) = self.config.agents.get(agent) {
            out.push(agent_template.as_str());
        }
        out
    }

    pub fn position(&self) -> PromptPosition {
        self.config.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn disabled_yields_no_templates() {
        let config = PromptTemplateConfig { enabled: false, global: Some("g".to_string()), agents: HashMap::new(), position: PromptPosition::Prepend };
        assert!(PromptInjector::new(&config).templates_for("a").is_empty());
    }

    #[test]
    fn global_applies_before_per_agent() {
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), "be concise".to_string());
        let config = PromptTemplateConfig { enabled: true, global: Some("be terse".to_string()), agents, position: PromptPosition::Prepend };
        let templates = PromptInjector::new(&config).templates_for("a");
        assert_eq!(templates, vec!["be terse", "be concise"]);
    }

    #[test]
    fn agent_without_override_only_gets_global() {
        let config = PromptTemplateConfig { enabled: true, global: Some("g".to_string()), agents: HashMap::new(), position: PromptPosition::Append };
        assert_eq!(PromptInjector::new(&config).templates_for("other"), vec!["g"]);
    }
}
