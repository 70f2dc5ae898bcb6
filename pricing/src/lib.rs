//! Pricing table: model id -> provider + per-token prices.
//!
//! Lookup is longest-prefix match so a fully-versioned id like
//! `gpt-4o-2024-08-06` resolves against a table entry for `gpt-4o` without
//! needing an entry per dated release.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-token prices and owning provider for one pricing table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub provider: String,
    /// USD per input (prompt) token.
    pub input_price_per_token: f64,
    /// USD per output (completion) token.
    pub output_price_per_token: f64,
}

impl PriceEntry {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 * self.input_price_per_token + output_tokens as f64 * self.output_price_per_token
    }
}

/// Model id -> [`PriceEntry`] table, resolved by longest matching prefix.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    entries: HashMap<String, PriceEntry>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, PriceEntry>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, model_prefix: impl Into<String>, entry: PriceEntry) {
        self.entries.insert(model_prefix.into(), entry);
    }

    /// Resolves `model_id` against the table, preferring the longest matching
    /// prefix key. `"gpt-4o-2024-08-06"` matches a `"gpt-4o"` entry; an exact
    /// key always wins over a shorter prefix of itself.
    pub fn lookup(&self, model_id: &str) -> Option<&PriceEntry> {
        self.entries
            .keys()
            .filter(|prefix| model_id.starts_with(prefix.as_str()))
            .max_by_key(|prefix| prefix.len())
            .and_then(|prefix| self.entries.get(prefix))
    }

    /// Computes the USD cost for `model_id`, or `None` if no entry matches.
    pub fn cost(&self, model_id: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        self.lookup(model_id).map(|entry| entry.cost(input_tokens, output_tokens))
    }

    /// All known model prefixes and their entries, for `GET /v1/models`.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &PriceEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A small built-in fixture table covering the models exercised by the proxy's
/// own test scenarios. Real deployments load their own table from config;
/// this exists as a sane default and for tests that don't set one up.
pub fn default_table() -> PricingTable {
    let mut entries = HashMap::new();
    entries.insert(
        "gpt-4o-mini".to_string(),
        PriceEntry {
            provider: "openai".to_string(),
            input_price_per_token: 0.000_000_15,
            output_price_per_token: 0.000_000_60,
        },
    );
    entries.insert(
        "gpt-4o".to_string(),
        PriceEntry {
            provider: "openai".to_string(),
            input_price_per_token: 0.000_01,
            output_price_per_token: 0.000_04,
        },
    );
    entries.insert(
        "claude-opus-4".to_string(),
        PriceEntry {
            provider: "anthropic".to_string(),
            input_price_per_token: 0.000_015,
            output_price_per_token: 0.000_075,
        },
    );
    entries.insert(
        "deepseek-chat".to_string(),
        PriceEntry {
            provider: "deepseek".to_string(),
            input_price_per_token: 0.000_000_27,
            output_price_per_token: 0.000_001_10,
        },
    );
    PricingTable::from_entries(entries)
}
