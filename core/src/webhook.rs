//! Inbound webhook handling: verify the signature, render the configured
//! prompt template, and hand back what the caller needs to invoke the
//! pipeline as a synthetic agent request.

use std::collections::HashMap;

use subtle::ConstantTimeEq;

use agix_config::WebhookDefinition;

use crate::alert::sign;

/// A rendered, signature-verified inbound webhook invocation.
pub struct WebhookInvocation {
    pub model: String,
    pub prompt: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("missing X-Webhook-Signature header")]
    MissingSignature,
    #[error("signature does not match")]
    BadSignature,
}

/// Verifies `signature_header` against `payload` using `definition`'s
/// secret, in constant time, then renders the prompt template.
pub fn handle(definition: &WebhookDefinition, webhook_name: &str, payload: &[u8], headers: &HashMap<String, String>, signature_header: Option<&str>, timestamp: &str) -> Result<WebhookInvocation, WebhookError> {
    let signature_header = signature_header.ok_or(WebhookError::MissingSignature)?;
    let expected = sign(&definition.secret, payload);
    if expected.as_bytes().ct_eq(signature_header.as_bytes()).unwrap_u8() != 1 {
        return Err(WebhookError::BadSignature);
    }

    let payload_text = String::from_utf8_lossy(payload);
    let headers_text = headers.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>().join("\n");
    let prompt = definition
        .prompt_template
        .replace("{Payload}", &payload_text)
        .replace("{Headers}", &headers_text)
        .replace("{Timestamp}", timestamp)
        .replace("{WebhookName}", webhook_name);

    Ok(WebhookInvocation { model: definition.model.clone(), prompt, callback_url: definition.callback_url.clone() })
}
