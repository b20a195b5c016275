//! # neos-webhook-trigger
//!
//! Webhook trigger for Neos CMS change events.
//!
//! ## How it works
//!
//! 1. On activation the trigger looks for an existing registration of its
//!    callback URL on the Neos webhook API and adopts it, or creates one.
//!    Either way the registration's signing secret lands in [`TriggerState`].
//! 2. Neos confirms the callback with a handshake (`X-Webhook-Secret` header,
//!    `{"handshake": true}` body), which is acknowledged and recorded.
//! 3. Every event delivery carries `X-Webhook-Signature: sha256=<hex>` over
//!    the raw body. Verified events of a subscribed kind have oversized
//!    `oldValue`/`newValue` strings truncated and are forwarded, one
//!    [`ForwardedEvent`] per request.
//! 4. On deactivation the remote registration is deleted and the state
//!    cleared.

pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gateway;
pub mod handshake;
pub mod http_server;
pub mod registration;
pub mod store;
pub mod types;
pub mod verification;

pub use client::{HttpNeosApi, NeosApi};
pub use config::Config;
pub use gateway::{Gateway, GatewayOutcome, InboundEnvelope};
pub use registration::{Activation, Registrar};
pub use store::{RegistrationState, TriggerState};
pub use types::{EventKind, EventSubscription, ForwardedEvent, NormalizedEvent};
