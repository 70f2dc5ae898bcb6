//! Per-agent sliding-window rate limiting: two independent windows
//! (per-minute, per-hour), purely in-memory and lost on restart.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use agix_config::RateLimitConfig;

struct Window {
    capacity: u32,
    period: Duration,
    hits: Vec<Instant>,
}

impl Window {
    fn new(capacity: u32, period: Duration) -> Self {
        Self { capacity, period, hits: Vec::new() }
    }

    /// Drops hits outside the window, then reports whether one more hit fits.
    /// On success the hit is recorded.
    fn try_consume(&mut self, now: Instant) -> Result<(), Duration> {
        self.hits.retain(|t| now.duration_since(*t) < self.period);
        if self.capacity == 0 || (self.hits.len() as u32) < self.capacity {
            self.hits.push(now);
            return Ok(());
        }
        let oldest = self.hits.first().copied().unwrap_or(now);
        let retry_after = self.period.saturating_sub(now.duration_since(oldest));
        Err(retry_after)
    }
}

struct AgentState {
    per_minute: Window,
    per_hour: Window,
}

/// Per-agent token-bucket-style limiter over two sliding windows.
/// An agent with no configured limit is never throttled.
pub struct RateLimiter {
    agents: DashMap<String, AgentState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { agents: DashMap::new() }
    }

    /// Consumes one slot from both windows if both have room, otherwise
    /// returns the number of seconds until the soonest window frees up.
    pub fn check(&self, agent: &str, config: Option<&RateLimitConfig>) -> Result<(), u64> {
        let Some(config) = config else { return Ok(()) };
        if config.requests_per_minute == 0 && config.requests_per_hour == 0 {
            return Ok(());
        }

        let mut entry = self.agents.entry(agent.to_string()).or_insert_with(|| AgentState {
            per_minute: Window::new(config.requests_per_minute, Duration::from_secs(60)),
            per_hour: Window::new(config.requests_per_hour, Duration::from_secs(3600)),
        });

        let now = Instant::now();
        let minute_probe = entry.per_minute.try_consume(now);
        let hour_probe = entry.per_hour.try_consume(now);

        match (minute_probe, hour_probe) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(wait), Ok(())) => {
                entry.per_hour.hits.pop();
                Err(wait.as_secs().max(1))
            }
            (Ok(()), Err(wait)) => {
                entry.per_minute.hits.pop();
                Err(wait.as_secs().max(1))
            }
            (Err(a), Err(b)) => Err(a.min(b).as_secs().max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_config_never_throttles() {
        let limiter = RateLimiter::new();
        for _ in 0..1000 {
            assert!(limiter.check("agent", None).is_ok());
        }
    }

    #[test]
    fn per_minute_cap_is_enforced() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig { requests_per_minute: 2, requests_per_hour: 0 };
        assert!(limiter.check("a", Some(&config)).is_ok());
        assert!(limiter.check("a", Some(&config)).is_ok());
        assert!(limiter.check("a", Some(&config)).is_err());
    }

    #[test]
    fn agents_are_independent() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig { requests_per_minute: 1, requests_per_hour: 0 };
        assert!(limiter.check("a", Some(&config)).is_ok());
        assert!(limiter.check("b", Some(&config)).is_ok());
        assert!(limiter.check("a", Some(&config)).is_err());
    }

    #[test]
    fn hour_limit_also_enforced_independent_of_minute() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig { requests_per_minute: 100, requests_per_hour: 1 };
        assert!(limiter.check("a", Some(&config)).is_ok());
        assert!(limiter.check("a", Some(&config)).is_err());
    }
}
