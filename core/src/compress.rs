//! Context compaction: when the running conversation estimate crosses a
//! threshold, the oldest messages are replaced with a single summary message,
//! keeping the most recent `keep_recent` messages untouched.
//!
//! This module never talks to a provider itself; the caller obtains the
//! summary text via its own dispatch call (accounted separately, so the
//! summarization call's tokens are never billed to the original request)
//! and passes it back in to `splice`.

use serde_json::{json, Value};

use agix_config::CompressionConfig;

pub struct Compressor<'a> {
    config: &'a CompressionConfig,
}

/// What the caller needs to do to compact `messages`, if anything.
pub enum CompactionPlan<'a> {
    NotNeeded,
    Needed { model: Option<&'a str>, to_summarize: Vec<Value>, keep: Vec<Value> },
}

impl<'a> Compressor<'a> {
    pub fn new(config: &'a CompressionConfig) -> Self {
        Self { config }
    }

    fn estimate_tokens(messages: &[Value]) -> u32 {
        messages
            .iter()
            .map(|m| m.get("content").and_then(Value::as_str).unwrap_or_default().len() as u32 / 4)
            .sum()
    }

    /// Decides whether `messages` needs compaction, and if so, splits it
    /// into the prefix to summarize and the suffix to keep verbatim.
    pub fn plan(&self, messages: &[Value]) -> CompactionPlan<'a> {
        if !self.config.enabled {
            return CompactionPlan::NotNeeded;
        }
        if Self::estimate_tokens(messages) <= self.config.threshold_tokens {
            return CompactionPlan::NotNeeded;
        }
        let keep_recent = self.config.keep_recent as usize;
        if messages.len() <= keep_recent {
            return CompactionPlan::NotNeeded;
        }
        let split = messages.len() - keep_recent;
        CompactionPlan::Needed {
            model: self.config.summary_model.as_deref(),
            to_summarize: messages[..split].to_vec(),
            keep: messages[split..].to_vec(),
        }
    }

    /// Splices a produced `summary` ahead of the kept suffix, yielding the
    /// new message list to send upstream in place of the original.
    pub fn splice(summary: &str, keep: &[Value]) -> Vec<Value> {
        let mut out = Vec::with_capacity(keep.len() + 1);
        out.push(json!({"role": "system", "content": format!("Summary of earlier conversation: {summary}")}));
        out.extend_from_slice(keep);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, keep_recent: u32) -> CompressionConfig {
        CompressionConfig { enabled: true, threshold_tokens: threshold, keep_recent, summary_model: Some("gpt-4o-mini".to_string()) }
    }

    fn message(content: &str) -> Value {
        json!({"role": "user", "content": content})
    }

    #[test]
    fn disabled_compression_never_plans() {
        let config = CompressionConfig { enabled: false, ..config(1, 1) };
        let messages = vec![message(&"x".repeat(1000))];
        assert!(matches!(Compressor::new(&config).plan(&messages), CompactionPlan::NotNeeded));
    }

    #[test]
    fn under_threshold_is_not_needed() {
        let config = config(10_000, 2);
        let messages = vec![message("hi"), message("there")];
        assert!(matches!(Compressor::new(&config).plan(&messages), CompactionPlan::NotNeeded));
    }

    #[test]
    fn over_threshold_splits_keeping_recent_tail() {
        let config = config(10, 1);
        let messages = vec![message(&"x".repeat(100)), message(&"y".repeat(100)), message("z")];
        match Compressor::new(&config).plan(&messages) {
            CompactionPlan::Needed { to_summarize, keep, model } => {
                assert_eq!(to_summarize.len(), 2);
                assert_eq!(keep.len(), 1);
                assert_eq!(keep[0]["content"], "z");
                assert_eq!(model, Some("gpt-4o-mini"));
            }
            CompactionPlan::NotNeeded => panic!("expected compaction plan"),
        }
    }

    #[test]
    fn fewer_messages_than_keep_recent_is_not_needed() {
        let config = config(1, 5);
        let messages = vec![message(&"x".repeat(100))];
        assert!(matches!(Compressor::new(&config).plan(&messages), CompactionPlan::NotNeeded));
    }

    #[test]
    fn splice_prepends_summary_before_kept_tail() {
        let keep = vec![message("z")];
        let spliced = Compressor::splice("earlier context", &keep);
        assert_eq!(spliced.len(), 2);
        assert_eq!(spliced[0]["role"], "system");
        assert!(spliced[0]["content"].as_str().unwrap().contains("earlier context"));
        assert_eq!(spliced[1]["content"], "z");
    }
}
