//! Budget precheck and alert-percent computation. Spend is always derived
//! from the accounting store, never tracked separately, so a crash loses
//! nothing but a store outage must not block agents (fail-open).

use std::sync::Arc;

use chrono::{Datelike, Utc};
use dashmap::DashMap;

use agix_config::BudgetConfig;
use agix_store::Store;

/// Alerts for the same (agent, threshold crossed) are suppressed for this
/// many seconds, but a *new* threshold multiple (e.g. 160% after 80%) or a
/// later window always re-fires.
const ALERT_SUPPRESSION_WINDOW_SECS: i64 = 5 * 60;

/// Outcome of the budget precheck for one request.
pub struct BudgetStatus {
    pub daily_spend: f64,
    pub monthly_spend: f64,
    pub daily_percent: f64,
    pub monthly_percent: f64,
    pub exceeded: bool,
}

/// Tracks which (agent, threshold-multiple, window-start) combinations have
/// already fired, so concurrent requests crossing the same threshold don't
/// each send their own alert, while a later threshold or window still fires.
pub struct BudgetChecker {
    store: Arc<Store>,
    fired_alerts: DashMap<(String, i64, i64), ()>,
}

impl BudgetChecker {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store, fired_alerts: DashMap::new() }
    }

    /// Computes current spend and whether the configured limits are reached.
    /// Store errors fail open: spend reads as zero and `exceeded` is false.
    pub async fn check(&self, agent: &str, config: Option<&BudgetConfig>) -> BudgetStatus {
        let Some(config) = config else {
            return BudgetStatus { daily_spend: 0.0, monthly_spend: 0.0, daily_percent: 0.0, monthly_percent: 0.0, exceeded: false };
        };

        let now = Utc::now();
        let date = now.format("%Y-%m-%d").to_string();

        let daily_spend = self.store.daily_spend(agent, &date).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "budget daily_spend query failed, failing open");
            0.0
        });
        let monthly_spend = self.store.monthly_spend(agent, now.year(), now.month()).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "budget monthly_spend query failed, failing open");
            0.0
        });

        let daily_percent = percent_of(daily_spend, config.daily_limit_usd);
        let monthly_percent = percent_of(monthly_spend, config.monthly_limit_usd);

        let exceeded = (config.daily_limit_usd > 0.0 && daily_spend >= config.daily_limit_usd)
            || (config.monthly_limit_usd > 0.0 && monthly_spend >= config.monthly_limit_usd);

        BudgetStatus { daily_spend, monthly_spend, daily_percent, monthly_percent, exceeded }
    }

    /// Returns true if an alert should fire now for `agent`, recording that
    /// it has fired for this (threshold-multiple, window) pair. Dedupes by
    /// the highest threshold multiple crossed, not just by agent, so a spend
    /// that jumps from 70% to 170% in one request still alerts once more.
    pub fn should_alert(&self, agent: &str, status: &BudgetStatus, alert_at_percent: f64) -> bool {
        if alert_at_percent <= 0.0 {
            return false;
        }
        let max_percent = status.daily_percent.max(status.monthly_percent);
        if max_percent < alert_at_percent {
            return false;
        }
        let threshold_multiple = (max_percent / alert_at_percent).floor() as i64;
        let window_start = Utc::now().timestamp() / ALERT_SUPPRESSION_WINDOW_SECS;
        let key = (agent.to_string(), threshold_multiple, window_start);
        self.fired_alerts.insert(key, ()).is_none()
    }
}

fn percent_of(spend: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        0.0
    } else {
        (spend / limit) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn store() -> Arc<Store> {
        let file = NamedTempFile::new().unwrap();
        Arc::new(Store::connect(file.path().to_str().unwrap()).await.unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_config_never_blocks() {
        let checker = BudgetChecker::new(store().await);
        let status = checker.check("a", None).await;
        assert!(!status.exceeded);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_limit_is_unset_and_never_exceeded() {
        let checker = BudgetChecker::new(store().await);
        let config = BudgetConfig { daily_limit_usd: 0.0, monthly_limit_usd: 0.0, alert_at_percent: 0.0, alert_webhook: None };
        let status = checker.check("a", Some(&config)).await;
        assert!(!status.exceeded);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn alert_suppressed_within_window() {
        let checker = BudgetChecker::new(store().await);
        let status = BudgetStatus { daily_spend: 9.0, monthly_spend: 9.0, daily_percent: 90.0, monthly_percent: 10.0, exceeded: false };
        assert!(checker.should_alert("a", &status, 80.0));
        assert!(!checker.should_alert("a", &status, 80.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn alert_does_not_fire_below_threshold() {
        let checker = BudgetChecker::new(store().await);
        let status = BudgetStatus { daily_spend: 1.0, monthly_spend: 1.0, daily_percent: 10.0, monthly_percent: 10.0, exceeded: false };
        assert!(!checker.should_alert("a", &status, 80.0));
    }
}
