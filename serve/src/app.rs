//! Axum app: shared state and the route table.

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;

use agix_config::Config;
use agix_core::Pipeline;
use agix_store::Store;

use crate::routes;

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<Store>,
    pub config: Config,
    pub client: reqwest::Client,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/v1/chat/completions", post(routes::chat::chat_completions))
        .route("/v1/models", get(routes::models::list_models))
        .route("/v1/sessions/:id", get(routes::sessions::get_session))
        .route("/v1/sessions/:id", put(routes::sessions::put_session))
        .route("/v1/sessions/:id", delete(routes::sessions::delete_session))
        .route("/v1/webhooks/:name", post(routes::webhooks::webhook))
        .route("/api/stats", get(routes::stats::stats))
        .route("/api/agents", get(routes::stats::agents))
        .route("/api/budgets", get(routes::stats::budgets))
        .route("/api/costs/daily", get(routes::stats::costs_daily))
        .route("/api/logs", get(routes::stats::logs))
        .with_state(state)
}
