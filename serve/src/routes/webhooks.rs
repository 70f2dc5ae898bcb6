//! `POST /v1/webhooks/{name}`: signature-verified inbound webhook, invoked
//! as a synthetic agent request so its cost is attributed and auditable
//! like any other call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use agix_core::webhook;
use agix_store::WebhookExecution;

use crate::app::AppState;

pub async fn webhook(State(state): State<Arc<AppState>>, Path(name): Path<String>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let started = Instant::now();
    if !state.config.webhooks.enabled {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "webhooks disabled"}))).into_response();
    }
    let Some(definition) = state.config.webhooks.definitions.get(&name) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "unknown webhook"}))).into_response();
    };

    let signature = headers.get("x-webhook-signature").and_then(|v| v.to_str().ok());
    let header_map: HashMap<String, String> = headers.iter().filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string()))).collect();
    let timestamp = chrono::Utc::now().to_rfc3339();

    let invocation = match webhook::handle(definition, &name, &body, &header_map, signature, &timestamp) {
        Ok(invocation) => invocation,
        Err(e) => return (StatusCode::UNAUTHORIZED, Json(json!({"error": e.to_string()}))).into_response(),
    };

    let agent = format!("__webhook:{name}__");
    let chat_body = json!({"model": invocation.model, "messages": [{"role": "user", "content": invocation.prompt}]});
    let outcome = state.pipeline.handle(&agent, None, None, chat_body).await;

    let (status, callback_status) = match outcome {
        Ok(result) => {
            let content = result.body["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();
            let callback_status = if let Some(callback_url) = &invocation.callback_url {
                match state.client.post(callback_url).json(&json!({"webhook": name, "result": content})).send().await {
                    Ok(resp) => Some(resp.status().as_u16() as i32),
                    Err(e) => {
                        tracing::warn!(error = %e, "webhook callback delivery failed");
                        None
                    }
                }
            } else {
                None
            };
            ("ok".to_string(), callback_status)
        }
        Err(e) => {
            tracing::warn!(webhook = %name, error = %e, "webhook-triggered pipeline call failed");
            ("error".to_string(), None)
        }
    };

    let exec = WebhookExecution {
        id: Uuid::new_v4().to_string(),
        webhook_name: name,
        timestamp,
        status: status.clone(),
        duration_ms: started.elapsed().as_millis() as i64,
        callback_status,
    };
    if let Err(e) = state.store.insert_webhook_execution(exec).await {
        tracing::warn!(error = %e, "failed to persist webhook execution record");
    }

    Json(json!({"status": status})).into_response()
}
