//! Regex-rule engine scanning user-role message text, evaluated in
//! declaration order with three possible actions.

use regex::Regex;

use agix_config::{FirewallAction, FirewallConfig};

pub struct CompiledRule {
    pub name: String,
    pub category: String,
    pub action: FirewallAction,
    regex: Regex,
}

/// A firewall rule that failed to compile at startup (bad regex pattern).
#[derive(Debug, thiserror::Error)]
#[error("firewall rule {name:?} has an invalid pattern: {source}")]
pub struct RuleCompileError {
    pub name: String,
    #[source]
    pub source: regex::Error,
}

/// One rule's verdict against the scanned text.
pub struct Hit {
    pub rule_name: String,
    pub category: String,
    pub action: FirewallAction,
}

pub struct Firewall {
    enabled: bool,
    rules: Vec<CompiledRule>,
}

impl Firewall {
    /// Compiles all configured rules up front; a bad pattern is reported
    /// immediately rather than failing lazily on the hot path.
    pub fn compile(config: &FirewallConfig) -> Result<Self, RuleCompileError> {
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            let regex = Regex::new(&rule.pattern).map_err(|source| RuleCompileError { name: rule.name.clone(), source })?;
            rules.push(CompiledRule { name: rule.name.clone(), category: rule.category.clone(), action: rule.action, regex });
        }
        Ok(Self { enabled: config.enabled, rules })
    }

    /// Scans `text` against every rule in order. A `Block` hit is returned
    /// as the sole element (scanning stops there, per the short-circuit
    /// contract); `Warn`/`Log` hits accumulate and scanning continues.
    pub fn scan(&self, text: &str) -> Vec<Hit> {
        if !self.enabled {
            return Vec::new();
        }
        let mut hits = Vec::new();
        for rule in &self.rules {
            if rule.regex.is_match(text) {
                let hit = Hit { rule_name: rule.name.clone(), category: rule.category.clone(), action: rule.action };
                if rule.action == FirewallAction::Block {
                    return vec![hit];
                }
                hits.push(hit);
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agix_config::FirewallRule;

    fn rule(name: &str, pattern: &str, action: FirewallAction) -> FirewallRule {
        FirewallRule { name: name.to_string(), category: "test".to_string(), pattern: pattern.to_string(), action }
    }

    #[test]
    fn disabled_firewall_never_matches() {
        let config = FirewallConfig { enabled: false, rules: vec![rule("block-all", ".*", FirewallAction::Block)] };
        let fw = Firewall::compile(&config).unwrap();
        assert!(fw.scan("anything").is_empty());
    }

    #[test]
    fn block_short_circuits_and_ignores_later_rules() {
        let config = FirewallConfig {
            enabled: true,
            rules: vec![rule("ssn", r"\d{3}-\d{2}-\d{4}", FirewallAction::Block), rule("warn-all", ".*", FirewallAction::Warn)],
        };
        let fw = Firewall::compile(&config).unwrap();
        let hits = fw.scan("my ssn is 123-45-6789");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule_name, "ssn");
        assert_eq!(hits[0].action, FirewallAction::Block);
    }

    #[test]
    fn warn_and_log_both_accumulate() {
        let config = FirewallConfig { enabled: true, rules: vec![rule("w", "foo", FirewallAction::Warn), rule("l", "bar", FirewallAction::Log)] };
        let fw = Firewall::compile(&config).unwrap();
        let hits = fw.scan("foo and bar");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_rejected_at_compile_time() {
        let config = FirewallConfig { enabled: true, rules: vec![rule("bad", "(unclosed", FirewallAction::Warn)] };
        assert!(Firewall::compile(&config).is_err());
    }
}
