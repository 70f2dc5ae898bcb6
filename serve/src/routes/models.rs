//! `GET /v1/models`: enumerates the pricing table in the OpenAI list shape.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let data: Vec<Value> = state
        .pipeline
        .pricing()
        .entries()
        .map(|(id, entry)| json!({"id": id, "object": "model", "owned_by": entry.provider}))
        .collect();
    Json(json!({"object": "list", "data": data}))
}
