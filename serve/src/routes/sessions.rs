//! `GET|PUT|DELETE /v1/sessions/{id}`: CRUD over in-memory session overrides.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use agix_core::SessionOverride;

use crate::app::AppState;

pub async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.pipeline.sessions().get(&id) {
        Some(overrides) => Json(overrides).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "no such session"}))).into_response(),
    }
}

pub async fn put_session(State(state): State<Arc<AppState>>, Path(id): Path<String>, Json(overrides): Json<SessionOverride>) -> Response {
    state.pipeline.sessions().put(id, overrides, None);
    StatusCode::NO_CONTENT.into_response()
}

pub async fn delete_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if state.pipeline.sessions().delete(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"error": "no such session"}))).into_response()
    }
}
