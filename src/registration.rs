//! Lifecycle of the remote webhook registration.
//!
//! The host calls these on activation and deactivation, never from the
//! request path. None of them return errors: failures are logged and reported
//! through the boolean / [`Activation`] result so that a broken CMS cannot
//! crash the host.

use crate::client::NeosApi;
use crate::diagnostics::DiagnosticSink;
use crate::error::ApiError;
use crate::store::TriggerState;
use crate::types::{CreateWebhook, CreatedWebhook, EventSubscription, RemoteWebhook};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

/// Outcome of bringing a trigger online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// A matching registration already existed and was adopted.
    Reused { webhook_id: String },
    /// A new registration was created.
    Created { webhook_id: String },
    /// Neither lookup nor creation produced a registration.
    Failed,
}

impl Activation {
    pub fn is_live(&self) -> bool {
        !matches!(self, Activation::Failed)
    }
}

#[derive(Clone)]
pub struct Registrar {
    api: Arc<dyn NeosApi>,
    sink: Arc<dyn DiagnosticSink>,
}

impl Registrar {
    pub fn new(api: Arc<dyn NeosApi>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { api, sink }
    }

    /// Locate then, only if nothing matched, create.
    pub async fn activate(&self, state: &TriggerState, subscription: &EventSubscription) -> Activation {
        if self.check_exists(state, subscription).await {
            if let Some(webhook_id) = state.webhook_id().await {
                return Activation::Reused { webhook_id };
            }
        }
        if self.create(state, subscription).await {
            if let Some(webhook_id) = state.webhook_id().await {
                return Activation::Created { webhook_id };
            }
        }
        Activation::Failed
    }

    /// Look for a registration made for exactly this subscription and adopt it.
    ///
    /// Transport failures count as "not found" so creation is still attempted.
    pub async fn check_exists(&self, state: &TriggerState, subscription: &EventSubscription) -> bool {
        match self.api.request(Method::GET, "/webhooks", None, None).await {
            Ok(listing) => {
                if let Some(found) = self.find_match(listing, subscription) {
                    if let Some(secret) = found.secret.clone() {
                        state.update(|s| s.adopt(found.id.clone(), secret)).await;
                        self.persist(state).await;
                        self.sink.info(
                            "Found existing active webhook",
                            &[("webhook_id", found.id)],
                        );
                        return true;
                    }
                }
            }
            Err(err) => {
                self.sink.error(
                    "Error checking for existing webhooks",
                    &[("error", err.to_string())],
                );
            }
        }

        state.update(|s| s.clear()).await;
        self.persist(state).await;
        false
    }

    fn find_match(&self, listing: Value, subscription: &EventSubscription) -> Option<RemoteWebhook> {
        if listing.is_null() {
            return None;
        }
        let entries: Vec<Value> = match serde_json::from_value(listing) {
            Ok(entries) => entries,
            Err(err) => {
                self.sink.error(
                    "Unexpected webhook listing format",
                    &[("error", err.to_string())],
                );
                return None;
            }
        };

        let webhooks = entries.into_iter().filter_map(|entry| {
            serde_json::from_value::<RemoteWebhook>(entry)
                .map_err(|err| {
                    self.sink.warn(
                        "Skipping malformed webhook listing entry",
                        &[("error", err.to_string())],
                    )
                })
                .ok()
        });

        let mut candidates = webhooks.filter(|w| subscription.matches(w));
        candidates.find(|w| {
            let usable = w.secret.as_deref().is_some_and(|s| !s.is_empty());
            if !usable {
                self.sink.warn(
                    "Matching webhook has no secret, ignoring it",
                    &[("webhook_id", w.id.clone())],
                );
            }
            usable
        })
    }

    /// Register the callback URL. The CMS follows up with a handshake.
    pub async fn create(&self, state: &TriggerState, subscription: &EventSubscription) -> bool {
        let body = CreateWebhook {
            target_url: subscription.target_url.clone(),
            events: subscription.requested_events(),
        };
        let body = match serde_json::to_value(&body) {
            Ok(b) => b,
            Err(err) => {
                self.sink.error("Failed to encode webhook body", &[("error", err.to_string())]);
                return false;
            }
        };

        let response = match self.api.request(Method::POST, "/webhooks", Some(body), None).await {
            Ok(r) => r,
            Err(err @ ApiError::Conflict { .. }) => {
                self.sink.error(
                    "Failed to create webhook",
                    &[
                        ("error", err.to_string()),
                        ("status", "409".into()),
                        ("target_url", subscription.target_url.clone()),
                    ],
                );
                return false;
            }
            Err(err) => {
                let mut fields = vec![("error", err.to_string())];
                if let Some(status) = err.status_code() {
                    fields.push(("status", status.to_string()));
                }
                self.sink.error("Failed to create webhook", &fields);
                return false;
            }
        };

        let created: CreatedWebhook = serde_json::from_value(response.clone()).unwrap_or_default();
        match (non_empty(created.id), non_empty(created.secret)) {
            (Some(id), Some(secret)) => {
                state.update(|s| s.adopt(id.clone(), secret)).await;
                self.persist(state).await;
                self.sink.info(
                    "Successfully created webhook. Waiting for handshake.",
                    &[("webhook_id", id)],
                );
                true
            }
            _ => {
                self.sink.error(
                    "Webhook creation response missing id or secret",
                    &[("response", response.to_string())],
                );
                false
            }
        }
    }

    /// Remove the remote registration, if any, and always clear local state.
    pub async fn delete(&self, state: &TriggerState) -> bool {
        if let Some(id) = state.webhook_id().await {
            let path = format!("/webhooks/{id}");
            match self.api.request(Method::DELETE, &path, None, None).await {
                Ok(_) => self
                    .sink
                    .info("Successfully deleted webhook", &[("webhook_id", id)]),
                Err(err) => self.sink.error(
                    "Failed to delete webhook",
                    &[("webhook_id", id), ("error", err.to_string())],
                ),
            }
        }

        state.update(|s| s.clear()).await;
        self.persist(state).await;
        true
    }

    async fn persist(&self, state: &TriggerState) {
        if let Err(err) = state.persist().await {
            self.sink.warn(
                "Failed to persist registration state",
                &[("error", err.to_string())],
            );
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
