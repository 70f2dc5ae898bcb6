//! Per-session overrides (model/temperature/max_tokens), TTL-expired lazily
//! on read and swept periodically so abandoned sessions don't linger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use agix_config::SessionOverrideConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOverride {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

struct Entry {
    value: SessionOverride,
    expires_at: Instant,
}

pub struct SessionStore {
    enabled: bool,
    default_ttl: Duration,
    sessions: DashMap<String, Entry>,
}

impl SessionStore {
    pub fn new(config: &SessionOverrideConfig) -> Self {
        Self { enabled: config.enabled, default_ttl: Duration::from_secs(config.default_ttl_seconds), sessions: DashMap::new() }
    }

    pub fn put(&self, session_id: String, value: SessionOverride, ttl: Option<Duration>) {
        if !self.enabled {
            return;
        }
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.sessions.insert(session_id, Entry { value, expires_at });
    }

    pub fn get(&self, session_id: &str) -> Option<SessionOverride> {
        if !self.enabled {
            return None;
        }
        let entry = self.sessions.get(session_id)?;
        if Instant::now() >= entry.expires_at {
            drop(entry);
            self.sessions.remove(session_id);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn delete(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Drops all expired entries; called by the periodic sweeper and safe to
    /// call directly from tests.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.sessions.retain(|_, entry| entry.expires_at > now);
    }

    /// Spawns a background task that sweeps expired sessions every 60s,
    /// for as long as `self` has outstanding references.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                self.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, ttl_seconds: u64) -> SessionOverrideConfig {
        SessionOverrideConfig { enabled, default_ttl_seconds: ttl_seconds }
    }

    #[test]
    fn disabled_store_never_retains_writes() {
        let store = SessionStore::new(&config(false, 3600));
        store.put("s1".to_string(), SessionOverride { model: Some("gpt-4o".to_string()), ..Default::default() }, None);
        assert!(store.get("s1").is_none());
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = SessionStore::new(&config(true, 3600));
        store.put("s1".to_string(), SessionOverride { model: Some("gpt-4o".to_string()), temperature: Some(0.5), max_tokens: None }, None);
        let got = store.get("s1").unwrap();
        assert_eq!(got.model.as_deref(), Some("gpt-4o"));
        assert_eq!(got.temperature, Some(0.5));
    }

    #[test]
    fn expired_entry_is_lazily_dropped_on_read() {
        let store = SessionStore::new(&config(true, 3600));
        store.put("s1".to_string(), SessionOverride::default(), Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get("s1").is_none());
        assert!(store.sessions.is_empty());
    }

    #[test]
    fn delete_removes_entry() {
        let store = SessionStore::new(&config(true, 3600));
        store.put("s1".to_string(), SessionOverride::default(), None);
        assert!(store.delete("s1"));
        assert!(store.get("s1").is_none());
    }

    #[test]
    fn sweep_clears_expired_without_a_read() {
        let store = SessionStore::new(&config(true, 3600));
        store.put("s1".to_string(), SessionOverride::default(), Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        store.sweep();
        assert!(store.sessions.is_empty());
    }
}
