//! Classifies an upstream response as empty, truncated, or a refusal, and
//! maps the classification to a configured action.

use agix_config::{QualityAction, QualityGateConfig};

const REFUSAL_PHRASES: &[&str] = &[
    "i cannot help with that",
    "i can't help with that",
    "i cannot assist with that",
    "i'm not able to help with that",
    "as an ai, i cannot",
    "i won't be able to help with that",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIssue {
    Empty,
    Truncated,
    Refusal,
}

pub struct QualityGate<'a> {
    config: &'a QualityGateConfig,
}

impl<'a> QualityGate<'a> {
    pub fn new(config: &'a QualityGateConfig) -> Self {
        Self { config }
    }

    /// Classifies the response content/finish_reason, returning the issue
    /// (if any, by priority empty > truncated > refusal) and the configured
    /// action for it. `None` means the response passes cleanly.
    pub fn evaluate(&self, content: &str, finish_reason: &str) -> Option<(QualityIssue, QualityAction)> {
        if !self.config.enabled {
            return None;
        }
        if content.trim().is_empty() {
            return Some((QualityIssue::Empty, self.config.on_empty));
        }
        if finish_reason == "length" {
            return Some((QualityIssue::Truncated, self.config.on_truncated));
        }
        let lower = content.to_lowercase();
        if REFUSAL_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
            return Some((QualityIssue::Refusal, self.config.on_refusal));
        }
        None
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
