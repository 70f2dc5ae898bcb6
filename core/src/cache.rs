//! Semantic response cache: exact fingerprint match first, then optional
//! embedding cosine-similarity scan, subject to TTL. Read-heavy, so a single
//! reader-writer structure (`DashMap`) is adequate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

use agix_config::CacheConfig;

/// Computes embeddings for cache similarity lookups. Implementations call
/// out to an embedding model; none is bundled, callers inject their own.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

struct Entry {
    response: Value,
    embedding: Option<Vec<f32>>,
    created_at: Instant,
    ttl: Option<Duration>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.created_at.elapsed() >= ttl,
            None => false,
        }
    }
}

/// Outcome of a cache lookup, distinguishing exact hits from
/// similarity-threshold hits for tracing metadata (`{"hit": true, "method": "..."}`).
pub enum CacheHit {
    Exact(Value),
    Semantic(Value),
}

pub struct SemanticCache {
    enabled: bool,
    similarity_threshold: f32,
    ttl: Duration,
    embedder: Option<Arc<dyn Embedder>>,
    entries: DashMap<String, Entry>,
}

impl SemanticCache {
    pub fn new(config: &CacheConfig, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            enabled: config.enabled,
            similarity_threshold: config.similarity_threshold,
            ttl: Duration::from_secs(config.ttl_minutes * 60),
            embedder,
            entries: DashMap::new(),
        }
    }

    /// Stable fingerprint of a normalized (model, messages) pair: same model
    /// and same message content/role sequence always hashes identically
    /// regardless of incidental JSON key ordering.
    pub fn fingerprint(model: &str, messages: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update(b"\0");
        hasher.update(normalize(messages).as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn lookup(&self, fingerprint: &str, embed_text: Option<&str>) -> Option<CacheHit> {
        if !self.enabled {
            return None;
        }
        if let Some(entry) = self.entries.get(fingerprint) {
            if !entry.is_expired() {
                return Some(CacheHit::Exact(entry.response.clone()));
            }
        }
        self.entries.remove_if(fingerprint, |_, e| e.is_expired());

        let (embedder, text) = match (&self.embedder, embed_text) {
            (Some(e), Some(t)) => (e, t),
            _ => return None,
        };
        let query = embedder.embed(text).await.ok()?;

        let mut best: Option<(f32, Value)> = None;
        self.entries.retain(|_, e| !e.is_expired());
        for entry in self.entries.iter() {
            let Some(embedding) = entry.embedding.as_ref() else { continue };
            let sim = cosine_similarity(&query, embedding);
            if sim >= self.similarity_threshold && best.as_ref().map(|(b, _)| sim > *b).unwrap_or(true) {
                best = Some((sim, entry.response.clone()));
            }
        }
        best.map(|(_, response)| CacheHit::Semantic(response))
    }

    pub async fn store(&self, fingerprint: String, embed_text: Option<&str>, response: Value) {
        if !self.enabled {
            return;
        }
        let embedding = match (&self.embedder, embed_text) {
            (Some(e), Some(t)) => e.embed(t).await.ok(),
            _ => None,
        };
        self.entries.insert(fingerprint, Entry { response, embedding, created_at: Instant::now(), ttl: Some(self.ttl) });
    }
}

fn normalize(messages: &Value) -> String {
    serde_json::to_string(messages).unwrap_or_default()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
            Ok(self.0.clone())
        }
    }

    fn config(enabled: bool) -> CacheConfig {
        CacheConfig { enabled, similarity_threshold: 0.9, ttl_minutes: 60 }
    }

    #[test]
    fn fingerprint_is_stable_for_equivalent_input() {
        let messages = serde_json::json!([{"role": "user", "content": "hi"}]);
        let a = SemanticCache::fingerprint("gpt-4o", &messages);
        let b = SemanticCache::fingerprint("gpt-4o", &messages);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_by_model() {
        let messages = serde_json::json!([{"role": "user", "content": "hi"}]);
        assert_ne!(SemanticCache::fingerprint("gpt-4o", &messages), SemanticCache::fingerprint("claude-opus-4", &messages));
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = SemanticCache::new(&config(false), None);
        cache.store("fp".to_string(), None, serde_json::json!({"ok": true})).await;
        assert!(cache.lookup("fp", None).await.is_none());
    }

    #[tokio::test]
    async fn exact_fingerprint_hit() {
        let cache = SemanticCache::new(&config(true), None);
        cache.store("fp".to_string(), None, serde_json::json!({"ok": true})).await;
        match cache.lookup("fp", None).await {
            Some(CacheHit::Exact(v)) => assert_eq!(v["ok"], true),
            _ => panic!("expected exact hit"),
        }
    }

    #[tokio::test]
    async fn similar_embedding_hits_on_fingerprint_miss() {
        let embedder: Arc<dyn Embedder> = Arc::new(FixedEmbedder(vec![1.0, 0.0]));
        let cache = SemanticCache::new(&config(true), Some(embedder));
        cache.store("fp-a".to_string(), Some("hello there"), serde_json::json!({"reply": "hi"})).await;
        match cache.lookup("fp-b", Some("hello friend")).await {
            Some(CacheHit::Semantic(v)) => assert_eq!(v["reply"], "hi"),
            _ => panic!("expected semantic hit"),
        }
    }

    #[tokio::test]
    async fn dissimilar_embedding_misses() {
        struct Toggle(std::sync::atomic::AtomicBool);
        #[async_trait]
        impl Embedder for Toggle {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
                let first = !self.0.swap(true, std::sync::atomic::Ordering::SeqCst);
                Ok(if first { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
            }
        }
        let embedder: Arc<dyn Embedder> = Arc::new(Toggle(std::sync::atomic::AtomicBool::new(false)));
        let cache = SemanticCache::new(&config(true), Some(embedder));
        cache.store("fp-a".to_string(), Some("x"), serde_json::json!({"reply": "hi"})).await;
        assert!(cache.lookup("fp-b", Some("y")).await.is_none());
    }
}
