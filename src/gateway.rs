//! Entry point for every callback the CMS sends.
//!
//! A request is classified as handshake or event. Events then pass, in
//! order: signature verification against the stored signing secret, event
//! type extraction, the subscription filter and value truncation, before
//! exactly one [`ForwardedEvent`] is queued for the consumer.

use crate::diagnostics::DiagnosticSink;
use crate::error::GatewayError;
use crate::handshake;
use crate::store::TriggerState;
use crate::types::{EventSubscription, ForwardedEvent, NormalizedEvent};
use crate::verification;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const DEFAULT_MAX_VALUE_LENGTH: usize = 4000;
pub const TRUNCATION_MARKER: &str = "[TRUNCATED DUE TO LENGTH]";

/// One inbound HTTP request, independent of the HTTP stack.
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    /// Exact bytes received; the signature covers these.
    pub raw_body: Vec<u8>,
    /// `raw_body` parsed as JSON, or `Null` when it is not JSON.
    pub body: Value,
    headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl InboundEnvelope {
    pub fn new(
        raw_body: Vec<u8>,
        headers: Vec<(String, String)>,
        query: Vec<(String, String)>,
    ) -> Self {
        let body = serde_json::from_slice(&raw_body).unwrap_or(Value::Null);
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            raw_body,
            body,
            headers,
            query,
        }
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// How an accepted request ended.
#[derive(Debug, Clone)]
pub enum GatewayOutcome {
    Handshake,
    /// Signed event the subscription does not ask for, by its wire name.
    Filtered(String),
    Forwarded(ForwardedEvent),
}

impl IntoResponse for GatewayOutcome {
    fn into_response(self) -> Response {
        match self {
            GatewayOutcome::Handshake => (
                StatusCode::OK,
                "Webhook handshake received and acknowledged.",
            )
                .into_response(),
            GatewayOutcome::Filtered(kind) => (
                StatusCode::OK,
                format!("Event '{kind}' received but not processed as per node configuration."),
            )
                .into_response(),
            GatewayOutcome::Forwarded(forwarded) => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "processed",
                    "event": forwarded.payload.event,
                    "deliveryId": forwarded.delivery_id,
                })),
            )
                .into_response(),
        }
    }
}

pub struct Gateway {
    subscription: EventSubscription,
    max_value_length: usize,
    sink: Arc<dyn DiagnosticSink>,
    events: mpsc::UnboundedSender<ForwardedEvent>,
}

impl Gateway {
    pub fn new(
        subscription: EventSubscription,
        max_value_length: usize,
        sink: Arc<dyn DiagnosticSink>,
        events: mpsc::UnboundedSender<ForwardedEvent>,
    ) -> Self {
        Self {
            subscription,
            max_value_length,
            sink,
            events,
        }
    }

    pub fn subscription(&self) -> &EventSubscription {
        &self.subscription
    }

    pub async fn handle(
        &self,
        state: &TriggerState,
        envelope: &InboundEnvelope,
    ) -> Result<GatewayOutcome, GatewayError> {
        if let Some(secret) = handshake::handshake_secret(envelope) {
            handshake::complete(state, secret, self.sink.as_ref()).await;
            return Ok(GatewayOutcome::Handshake);
        }

        self.verify(state, envelope).await?;

        let name = self.event_name(envelope)?;
        if !self.subscription.accepts_name(name) {
            self.sink.info(
                "Event received and validated, but not in selected list",
                &[("event", name.to_string())],
            );
            return Ok(GatewayOutcome::Filtered(name.to_string()));
        }

        let mut payload = self.normalize(envelope)?;
        let kind = payload.event;

        truncate(&mut payload.old_value, self.max_value_length);
        truncate(&mut payload.new_value, self.max_value_length);

        let forwarded = ForwardedEvent {
            delivery_id: Uuid::new_v4().to_string(),
            received_at: Utc::now(),
            payload,
        };
        if self.events.send(forwarded.clone()).is_err() {
            self.sink.error(
                "Event consumer is gone, dropping event",
                &[("event", kind.to_string())],
            );
            return Err(GatewayError::ConsumerClosed);
        }

        self.sink.info(
            "Processing event",
            &[
                ("event", kind.to_string()),
                ("delivery_id", forwarded.delivery_id.clone()),
                ("node_identifier", forwarded.payload.node_identifier.clone()),
            ],
        );
        Ok(GatewayOutcome::Forwarded(forwarded))
    }

    async fn verify(&self, state: &TriggerState, envelope: &InboundEnvelope) -> Result<(), GatewayError> {
        let Some(secret) = state.signing_secret().await else {
            self.sink.error(
                "HMAC secret not found in trigger state. Cannot validate payload.",
                &[],
            );
            return Err(GatewayError::MissingSecret);
        };

        let signature = envelope
            .header(SIGNATURE_HEADER)
            .filter(|s| verification::has_signature_prefix(s));
        let Some(signature) = signature else {
            self.sink.warn("Missing or invalid X-Webhook-Signature header.", &[]);
            return Err(GatewayError::MissingSignature);
        };

        if !verification::verify(&secret, &envelope.raw_body, signature) {
            self.sink.warn(
                "Invalid X-Webhook-Signature. Payload may be tampered or secret mismatch.",
                &[("security", "signature_mismatch".into())],
            );
            return Err(GatewayError::InvalidSignature);
        }

        self.sink.debug("X-Webhook-Signature validated successfully.", &[]);
        Ok(())
    }

    fn event_name<'e>(&self, envelope: &'e InboundEnvelope) -> Result<&'e str, GatewayError> {
        match envelope.body.get("event").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => {
                self.sink.info("Received webhook but no event type found in payload.", &[]);
                Err(GatewayError::MissingEventType)
            }
        }
    }

    fn normalize(&self, envelope: &InboundEnvelope) -> Result<NormalizedEvent, GatewayError> {
        serde_json::from_value(envelope.body.clone()).map_err(|err| {
            self.sink.warn(
                "Signed payload is not a valid Neos event",
                &[("error", err.to_string())],
            );
            GatewayError::InvalidPayload(err.to_string())
        })
    }
}

/// Cut a textual value longer than `max` characters down to `max` and append
/// [`TRUNCATION_MARKER`]. Anything that is not a string is left alone.
pub fn truncate(value: &mut Option<Value>, max: usize) {
    let Some(Value::String(text)) = value else {
        return;
    };
    if let Some((cut, _)) = text.char_indices().nth(max) {
        text.truncate(cut);
        text.push_str(TRUNCATION_MARKER);
    }
}
