//! Outbound webhook delivery: HMAC-SHA256 request signing and a short
//! bounded exponential backoff. Used both for budget-threshold alerts and
//! for posting tool-invoked-agent results back to a webhook's callback URL.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const MAX_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const BACKOFF_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook delivery failed after {0} attempts: {1}")]
    Exhausted(u32, String),
}

/// Signs `body` with `secret`, returning the `sha256=<hex>` value for the
/// `X-Webhook-Signature` header.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Posts `body` to `url`, retrying non-2xx/transport failures with
/// exponential backoff up to a short deadline. Signs the payload with an
/// `X-Webhook-Signature` header when `secret` is configured (budget alerts
/// have no per-deployment secret to sign with; tool-invoked webhook
/// callbacks do, via their `WebhookDefinition`).
pub async fn deliver(client: &reqwest::Client, url: &str, secret: Option<&str>, body: serde_json::Value) -> Result<u16, DeliveryError> {
    let payload = serde_json::to_vec(&body).unwrap_or_default();
    let signature = secret.map(|s| sign(s, &payload));

    let mut backoff = INITIAL_BACKOFF;
    let mut last_error = String::new();
    let deadline = tokio::time::Instant::now() + BACKOFF_DEADLINE;

    for attempt in 1..=MAX_ATTEMPTS {
        let mut request = client.post(url).header("Content-Type", "application/json");
        if let Some(signature) = &signature {
            request = request.header("X-Webhook-Signature", signature);
        }
        let result = request.body(payload.clone()).send().await;
        match result {
            Ok(response) if response.status().is_success() => return Ok(response.status().as_u16()),
            Ok(response) => last_error = format!("status {}", response.status()),
            Err(e) => last_error = e.to_string(),
        }
        if attempt == MAX_ATTEMPTS || tokio::time::Instant::now() + backoff > deadline {
            break;
        }
        tokio::time::sleep(backoff).await;
        backoff *= 2;
    }
    Err(DeliveryError::Exhausted(MAX_ATTEMPTS, last_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn sign_is_deterministic_for_same_secret_and_body() {
        let a = sign("secret", b"payload");
        let b = sign("secret", b"payload");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256="));
    }

    #[test]
    fn sign_differs_by_secret() {
        assert_ne!(sign("secret-a", b"payload"), sign("secret-b", b"payload"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn successful_delivery_returns_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/hook")).and(header_exists("X-Webhook-Signature")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let client = reqwest::Client::new();
        let status = deliver(&client, &format!("{}/hook", server.uri()), Some("secret"), serde_json::json!({"ok": true})).await.unwrap();
        assert_eq!(status, 200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unsigned_delivery_omits_signature_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/hook")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let client = reqwest::Client::new();
        let status = deliver(&client, &format!("{}/hook", server.uri()), None, serde_json::json!({"ok": true})).await.unwrap();
        assert_eq!(status, 200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn persistent_failure_is_reported_as_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/hook")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let client = reqwest::Client::new();
        let result = deliver(&client, &format!("{}/hook", server.uri()), Some("secret"), serde_json::json!({})).await;
        assert!(result.is_err());
    }
}
