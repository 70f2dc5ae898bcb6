//! Outbound response shaping: regex redaction (declaration order, default
//! replacement `[REDACTED]`), a length cap with a truncation marker, and a
//! summary suitable for the `X-Response-Policy` header.

use regex::Regex;

use agix_config::{ResponsePolicyConfig, ResponsePolicyOverride};

const REDACTED: &str = "[REDACTED]";
const TRUNCATED_MARKER: &str = "\n[TRUNCATED]";

struct CompiledOverride {
    max_output_chars: Option<u32>,
    redact: Vec<Regex>,
}

pub struct ResponsePolicy {
    enabled: bool,
    global_max_output_chars: Option<u32>,
    global_redact: Vec<Regex>,
    agents: std::collections::HashMap<String, CompiledOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySummary {
    pub redactions: usize,
    pub truncated: bool,
}

impl PolicySummary {
    /// Renders a compact summary for the `X-Response-Policy` response header.
    pub fn header_value(&self) -> String {
        format!("redactions={};truncated={}", self.redactions, self.truncated)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("response policy pattern {0:?} is not a valid regex: {1}")]
pub struct PolicyCompileError(pub String, pub regex::Error);

impl ResponsePolicy {
    pub fn compile(config: &ResponsePolicyConfig) -> Result<Self, PolicyCompileError> {
        let global_redact = compile_patterns(&config.redact_patterns)?;
        let mut agents = std::collections::HashMap::with_capacity(config.agents.len());
        for (agent, override_) in &config.agents {
            agents.insert(agent.clone(), compile_override(override_)?);
        }
        Ok(Self { enabled: config.enabled, global_max_output_chars: config.max_output_chars, global_redact, agents })
    }

    /// Redacts then truncates `text` for `agent`, using its override if one
    /// is configured, otherwise the global policy.
    pub fn apply(&self, agent: &str, text: &str) -> (String, PolicySummary) {
        if !self.enabled {
            return (text.to_string(), PolicySummary { redactions: 0, truncated: false });
        }
        let (max_chars, patterns): (Option<u32>, &[Regex]) = match self.agents.get(agent) {
            Some(o) => (o.max_output_chars, &o.redact),
            None => (self.global_max_output_chars, &self.global_redact),
        };

        let mut redactions = 0;
        let mut redacted = text.to_string();
        for pattern in patterns {
            let count = pattern.find_iter(&redacted).count();
            if count > 0 {
                redactions += count;
                redacted = pattern.replace_all(&redacted, REDACTED).into_owned();
            }
        }

        let mut truncated = false;
        if let Some(max_chars) = max_chars {
            let max_chars = max_chars as usize;
            if redacted.chars().count() > max_chars {
                redacted = redacted.chars().take(max_chars).collect::<String>() + TRUNCATED_MARKER;
                truncated = true;
            }
        }

        (redacted, PolicySummary { redactions, truncated })
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, PolicyCompileError> {
    patterns.iter().map(|p| Regex::new(p).map_err(|e| PolicyCompileError(p.clone(), e))).collect()
}

fn compile_override(override_: &ResponsePolicyOverride) -> Result<CompiledOverride, PolicyCompileError> {
    Ok(CompiledOverride { max_output_chars: override_.max_output_chars, redact: compile_patterns(&override_.redact_patterns)? })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(max_output_chars: Option<u32>, redact_patterns: Vec<&str>) -> ResponsePolicyConfig {
        ResponsePolicyConfig { enabled: true, max_output_chars, redact_patterns: redact_patterns.into_iter().map(String::from).collect(), agents: HashMap::new() }
    }

    #[test]
    fn disabled_policy_passes_through_unchanged() {
        let mut config = config(Some(5), vec![r"\d+"]);
        config.enabled = false;
        let policy = ResponsePolicy::compile(&config).unwrap();
        let (text, summary) = policy.apply("agent", "call 12345 now");
        assert_eq!(text, "call 12345 now");
        assert_eq!(summary.redactions, 0);
    }

    #[test]
    fn redacts_all_matches_in_declaration_order() {
        let config = config(None, vec![r"\d{3}-\d{4}"]);
        let policy = ResponsePolicy::compile(&config).unwrap();
        let (text, summary) = policy.apply("agent", "phone 555-1234 or 555-5678");
        assert_eq!(text, "phone [REDACTED] or [REDACTED]");
        assert_eq!(summary.redactions, 2);
    }

    #[test]
    fn truncates_over_cap_and_appends_marker() {
        let config = config(Some(5), vec![]);
        let policy = ResponsePolicy::compile(&config).unwrap();
        let (text, summary) = policy.apply("agent", "hello world");
        assert_eq!(text, "hello\n[TRUNCATED]");
        assert!(summary.truncated);
    }

    #[test]
    fn agent_override_replaces_global_policy() {
        let mut config = config(Some(1000), vec![r"secret"]);
        config.agents.insert("special".to_string(), ResponsePolicyOverride { max_output_chars: Some(3), redact_patterns: vec![] });
        let policy = ResponsePolicy::compile(&config).unwrap();
        let (text, summary) = policy.apply("special", "secret data");
        assert_eq!(text, "sec\n[TRUNCATED]");
        assert!(summary.truncated);
        assert_eq!(summary.redactions, 0);
    }

    #[test]
    fn invalid_pattern_is_rejected_at_compile_time() {
        let config = config(None, vec!["(unclosed"]);
        assert!(ResponsePolicy::compile(&config).is_err());
    }

    #[test]
    fn header_value_renders_compactly() {
        let summary = PolicySummary { redactions: 2, truncated: true };
        assert_eq!(summary.header_value(), "redactions=2;truncated=true");
    }
}
