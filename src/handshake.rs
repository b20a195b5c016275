use crate::diagnostics::DiagnosticSink;
use crate::gateway::InboundEnvelope;
use crate::store::TriggerState;
use serde_json::Value;

pub const SECRET_HEADER: &str = "x-webhook-secret";

/// The confirmation secret, when the envelope is a handshake: the secret
/// header is present and non-empty and the body carries `"handshake": true`.
pub fn handshake_secret(envelope: &InboundEnvelope) -> Option<&str> {
    let secret = envelope.header(SECRET_HEADER).filter(|s| !s.is_empty())?;
    match envelope.body.get("handshake") {
        Some(Value::Bool(true)) => Some(secret),
        _ => None,
    }
}

/// Record the confirmation secret. No signature is checked; the stored
/// signing secret is left as it is.
pub async fn complete(state: &TriggerState, secret: &str, sink: &dyn DiagnosticSink) {
    state.update(|s| s.record_handshake(secret)).await;
    if let Err(err) = state.persist().await {
        sink.warn(
            "Failed to persist handshake secret",
            &[("error", err.to_string())],
        );
    }
    sink.info("Received handshake request. Storing handshake secret.", &[]);
}
