//! `GET /api/stats|agents|budgets|costs/daily|logs`: read-only JSON views
//! backed directly by the accounting store.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct Range {
    since: Option<String>,
    until: Option<String>,
}

impl Range {
    /// Defaults to the last 24 hours when unset, so the dashboard has
    /// something sensible to show on first load.
    fn resolve(&self) -> (String, String) {
        let until = self.until.clone().unwrap_or_else(|| Utc::now().to_rfc3339());
        let since = self.since.clone().unwrap_or_else(|| (Utc::now() - chrono::Duration::days(1)).to_rfc3339());
        (since, until)
    }
}

pub async fn stats(State(state): State<Arc<AppState>>, Query(range): Query<Range>) -> Json<Value> {
    let (since, until) = range.resolve();
    match state.store.stats(&since, &until).await {
        Ok(stats) => Json(json!(stats)),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

pub async fn agents(State(state): State<Arc<AppState>>, Query(range): Query<Range>) -> Json<Value> {
    let (since, until) = range.resolve();
    match state.store.stats_by_agent(&since, &until).await {
        Ok(rows) => Json(json!(rows)),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

pub async fn budgets(State(state): State<Arc<AppState>>) -> Json<Value> {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let now = Utc::now();
    let mut rows = Vec::new();
    for (agent, budget) in &state.config.budgets {
        let daily_spend = state.store.daily_spend(agent, &today).await.unwrap_or(0.0);
        let monthly_spend = state.store.monthly_spend(agent, now.year(), now.month()).await.unwrap_or(0.0);
        rows.push(json!({
            "agent": agent,
            "daily_limit_usd": budget.daily_limit_usd,
            "monthly_limit_usd": budget.monthly_limit_usd,
            "daily_spend_usd": daily_spend,
            "monthly_spend_usd": monthly_spend,
        }));
    }
    Json(json!(rows))
}

pub async fn costs_daily(State(state): State<Arc<AppState>>, Query(range): Query<Range>) -> Json<Value> {
    let (since, until) = range.resolve();
    match state.store.daily_costs(&since, &until).await {
        Ok(rows) => Json(json!(rows)),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

pub async fn logs(State(state): State<Arc<AppState>>, Query(range): Query<Range>) -> Json<Value> {
    let (since, until) = range.resolve();
    match state.store.export(&since, &until).await {
        Ok(rows) => Json(json!(rows)),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}
