use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;

/// Operator configuration problems. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Failures of calls against the Neos webhook-management API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Credentials are absent or unusable for outbound calls.
    #[error("Neos API credentials are not configured: {0}")]
    Configuration(String),

    /// A webhook for this target URL already exists on the instance.
    #[error("Webhook already exists on Neos (409 Conflict).")]
    Conflict { payload: Value },

    /// Non-2xx response other than a conflict.
    #[error("Neos API returned status {status}")]
    Status { status: u16, payload: Value },

    /// The request never produced a response (connect, timeout, decode).
    #[error("Neos API request failed: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Conflict { .. } => Some(409),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Configuration(_) | ApiError::Transport(_) => None,
        }
    }

    /// Map an HTTP status and decoded body onto the error taxonomy.
    pub fn from_status(status: u16, payload: Value) -> Self {
        if status == 409 {
            ApiError::Conflict { payload }
        } else {
            ApiError::Status { status, payload }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

/// Reasons an inbound callback is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No signing secret has been stored for this trigger.
    #[error("HMAC secret configuration error.")]
    MissingSecret,

    /// `X-Webhook-Signature` is absent or lacks the `sha256=` prefix.
    #[error("Missing or invalid X-Webhook-Signature header.")]
    MissingSignature,

    /// Signature does not match the body under the stored secret.
    #[error("Invalid X-Webhook-Signature.")]
    InvalidSignature,

    #[error("Missing event type in payload.")]
    MissingEventType,

    /// The payload is signed but not a well-formed Neos event.
    #[error("Invalid event payload.")]
    InvalidPayload(String),

    /// The accepted event could not be handed to the consumer.
    #[error("Event consumer unavailable.")]
    ConsumerClosed,
}

impl GatewayError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSecret => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingSignature | Self::MissingEventType | Self::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidSignature => StatusCode::FORBIDDEN,
            Self::ConsumerClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        // Display strings carry no secret material.
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Failures reading or writing the persisted registration state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write state file: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to parse state file: {0}")]
    Parse(#[from] serde_json::Error),
}
