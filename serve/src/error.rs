//! Maps [`PipelineError`] onto the HTTP error contract: status code, a JSON
//! `{"error": ...}` body, and `Retry-After` for the two 429 variants.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, NaiveTime, Utc};
use serde_json::json;

use agix_core::PipelineError;

pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({"error": self.0.to_string()}));
        let retry_after = match &self.0 {
            PipelineError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            PipelineError::BudgetExceeded(_) => Some(seconds_until_utc_midnight()),
            _ => None,
        };
        match retry_after {
            Some(secs) => (status, [("Retry-After", secs.to_string())], body).into_response(),
            None => (status, body).into_response(),
        }
    }
}

/// Budget windows reset at UTC midnight; `Retry-After` tells the agent how
/// long it has to wait rather than a fixed guess.
fn seconds_until_utc_midnight() -> u64 {
    let now = Utc::now();
    let midnight = (now + Duration::days(1)).date_naive().and_time(NaiveTime::MIN).and_utc();
    (midnight - now).num_seconds().max(0) as u64
}
