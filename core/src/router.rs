//! Smart routing: classify a request as simple/complex by message-size
//! heuristics and remap the model accordingly.

use serde_json::Value;

use agix_config::RoutingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Complex,
}

pub struct Router<'a> {
    config: &'a RoutingConfig,
}

impl<'a> Router<'a> {
    pub fn new(config: &'a RoutingConfig) -> Self {
        Self { config }
    }

    /// Classifies by the tier named `tier_name`: complex if any message
    /// exceeds `max_message_tokens` (estimated as `len/4`), or the message
    /// count exceeds `max_messages`, or any configured keyword in
    /// `keywords_absent` is missing across the whole conversation (its
    /// absence is itself a complexity signal -- e.g. no message grounds the
    /// request with an expected keyword like "urgent" or "ticket"). Otherwise
    /// simple.
    pub fn classify(&self, tier_name: &str, messages: &[Value]) -> Complexity {
        let Some(tier) = self.config.tiers.get(tier_name) else { return Complexity::Simple };

        if tier.max_messages > 0 && messages.len() as u32 > tier.max_messages {
            return Complexity::Complex;
        }
        for message in messages {
            let text = message.get("content").and_then(Value::as_str).unwrap_or_default();
            let estimated_tokens = (text.len() as u32) / 4;
            if tier.max_message_tokens > 0 && estimated_tokens > tier.max_message_tokens {
                return Complexity::Complex;
            }
        }
        if !tier.keywords_absent.is_empty() {
            let combined: String = messages.iter().map(|m| m.get("content").and_then(Value::as_str).unwrap_or_default().to_lowercase()).collect::<Vec<_>>().join(" ");
            let any_missing = tier.keywords_absent.iter().any(|keyword| !combined.contains(&keyword.to_lowercase()));
            if any_missing {
                return Complexity::Complex;
            }
        }
        Complexity::Simple
    }

    /// Looks up the tier-mapped replacement model for `model`, if routing is
    /// enabled and a mapping exists for this model and complexity.
    pub fn remap(&self, model: &str, complexity: Complexity) -> Option<&str> {
        if !self.config.enabled {
            return None;
        }
        let entry = self.config.model_map.get(model)?;
        let mapped = match complexity {
            Complexity::Simple => entry.simple.as_deref(),
            Complexity::Complex => entry.complex.as_deref(),
        };
        mapped.filter(|m| *m != model)
    }
}
