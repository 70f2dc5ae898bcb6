//! `POST /v1/chat/completions`: the proxy's one hot-path route.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::app::AppState;
use crate::error::ApiError;

pub async fn chat_completions(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(body): Json<Value>) -> Result<Response, ApiError> {
    let agent = headers.get("x-agent-name").and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
    let session_id = headers.get("x-session-id").and_then(|v| v.to_str().ok()).map(str::to_string);
    let force_model = headers.get("x-force-model").and_then(|v| v.to_str().ok()).map(str::to_string);
    let streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    // When tools are active, streaming is forced off: a mid-stream tool call
    // can't be relayed as raw SSE, so the request goes through the ordinary
    // tool-loop path and comes back as one materialized JSON response.
    if streaming && !state.pipeline.has_tools(&agent) {
        let result = state.pipeline.handle_stream(&agent, session_id.as_deref(), force_model.as_deref(), body).await?;
        return Ok(stream_as_sse(result));
    }

    let result = state.pipeline.handle(&agent, session_id.as_deref(), force_model.as_deref(), body).await?;
    let mut response = (StatusCode::from_u16(result.status).unwrap_or(StatusCode::OK), Json(result.body)).into_response();
    apply_headers(&mut response, &result.headers);
    Ok(response)
}

/// Relays the pipeline's upstream SSE chunks to the client as they arrive,
/// flushing after each write. No status/body is materialized up front: the
/// upstream response starts streaming before this function returns.
fn stream_as_sse(result: agix_core::StreamResult) -> Response {
    let body_stream = ReceiverStream::new(result.chunks).map(|chunk| Ok::<_, std::io::Error>(chunk));
    let mut response = (StatusCode::OK, [("Content-Type", "text/event-stream")], Body::from_stream(body_stream)).into_response();
    apply_headers(&mut response, &result.headers);
    response
}

fn apply_headers(response: &mut Response, headers: &[(String, String)]) {
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            response.headers_mut().insert(name, value);
        }
    }
}
