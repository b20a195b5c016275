use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

const API_PREFIX: &str = "/neos/api/webhooks/v1";

/// Outbound call against the Neos webhook-management API.
///
/// `path` is relative to the API root (e.g. `/webhooks`). The decoded JSON
/// body is returned; empty success bodies decode to `Value::Null`.
#[async_trait]
pub trait NeosApi: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: Option<&[(String, String)]>,
    ) -> Result<Value, ApiError>;
}

/// [`NeosApi`] over HTTP with bearer-token auth and a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpNeosApi {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpNeosApi {
    pub fn new(
        instance_url: Option<&str>,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let instance_url = instance_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ApiError::Configuration("Neos Instance URL is missing".into()))?;
        if access_token.trim().is_empty() {
            return Err(ApiError::Configuration("Access Token is missing".into()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: api_base(instance_url),
            access_token: access_token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// `https://cms.example/` -> `https://cms.example/neos/api/webhooks/v1`
fn api_base(instance_url: &str) -> String {
    let base = instance_url.strip_suffix('/').unwrap_or(instance_url);
    format!("{base}{API_PREFIX}")
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl NeosApi for HttpNeosApi {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: Option<&[(String, String)]>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let payload = decode_body(&text);

        if status.is_success() {
            tracing::debug!(method = %method, path, status = status.as_u16(), "Neos API call succeeded");
            Ok(payload)
        } else {
            Err(ApiError::from_status(status.as_u16(), payload))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory Neos instance for exercising the registration lifecycle.

    use super::*;
    use crate::types::RemoteWebhook;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Call {
        pub method: Method,
        pub path: String,
        pub body: Option<Value>,
    }

    #[derive(Default)]
    struct Inner {
        webhooks: Vec<RemoteWebhook>,
        calls: Vec<Call>,
        next_id: u32,
        fail_list: Option<ApiError>,
        fail_create: Option<ApiError>,
        fail_delete: Option<ApiError>,
        create_response: Option<Value>,
        list_response: Option<Value>,
    }

    /// Behaves like the webhook API: listing echoes what was created, a
    /// second create for the same target is a 409.
    #[derive(Default)]
    pub struct FakeNeosApi {
        inner: Mutex<Inner>,
    }

    impl FakeNeosApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_webhook(self, webhook: RemoteWebhook) -> Self {
            self.inner.lock().unwrap().webhooks.push(webhook);
            self
        }

        pub fn fail_list(&self, err: ApiError) {
            self.inner.lock().unwrap().fail_list = Some(err);
        }

        pub fn fail_create(&self, err: ApiError) {
            self.inner.lock().unwrap().fail_create = Some(err);
        }

        pub fn fail_delete(&self, err: ApiError) {
            self.inner.lock().unwrap().fail_delete = Some(err);
        }

        /// Answer every listing with this raw body.
        pub fn respond_to_list(&self, body: Value) {
            self.inner.lock().unwrap().list_response = Some(body);
        }

        /// Answer the next create with this body instead of a registration.
        pub fn respond_to_create(&self, body: Value) {
            self.inner.lock().unwrap().create_response = Some(body);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.inner.lock().unwrap().calls.clone()
        }

        pub fn count(&self, method: Method) -> usize {
            self.calls().iter().filter(|c| c.method == method).count()
        }

        pub fn webhooks(&self) -> Vec<RemoteWebhook> {
            self.inner.lock().unwrap().webhooks.clone()
        }
    }

    #[async_trait]
    impl NeosApi for FakeNeosApi {
        async fn request(
            &self,
            method: Method,
            path: &str,
            body: Option<Value>,
            _query: Option<&[(String, String)]>,
        ) -> Result<Value, ApiError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call {
                method: method.clone(),
                path: path.to_string(),
                body: body.clone(),
            });

            match (method.as_str(), path) {
                ("GET", "/webhooks") => {
                    if let Some(err) = inner.fail_list.clone() {
                        return Err(err);
                    }
                    if let Some(listing) = inner.list_response.clone() {
                        return Ok(listing);
                    }
                    Ok(serde_json::to_value(&inner.webhooks).unwrap())
                }
                ("POST", "/webhooks") => {
                    if let Some(err) = inner.fail_create.clone() {
                        return Err(err);
                    }
                    if let Some(response) = inner.create_response.take() {
                        return Ok(response);
                    }
                    let body = body.unwrap_or(Value::Null);
                    let target_url = body["targetUrl"].as_str().unwrap_or_default().to_string();
                    if inner.webhooks.iter().any(|w| w.target_url == target_url) {
                        return Err(ApiError::from_status(409, Value::Null));
                    }
                    inner.next_id += 1;
                    let created = RemoteWebhook {
                        id: format!("wh-{}", inner.next_id),
                        target_url,
                        events: body["events"]
                            .as_array()
                            .map(|a| {
                                a.iter()
                                    .filter_map(|e| e.as_str().map(str::to_string))
                                    .collect()
                            })
                            .unwrap_or_default(),
                        secret: Some(format!("secret-{}", inner.next_id)),
                        is_active: true,
                        created_at: Some("2024-01-01T00:00:00Z".into()),
                    };
                    inner.webhooks.push(created.clone());
                    Ok(serde_json::to_value(created).unwrap())
                }
                ("DELETE", p) if p.starts_with("/webhooks/") => {
                    if let Some(err) = inner.fail_delete.clone() {
                        return Err(err);
                    }
                    let id = &p["/webhooks/".len()..];
                    let before = inner.webhooks.len();
                    inner.webhooks.retain(|w| w.id != id);
                    if inner.webhooks.len() == before {
                        return Err(ApiError::from_status(404, Value::Null));
                    }
                    Ok(Value::Null)
                }
                _ => Err(ApiError::from_status(404, Value::Null)),
            }
        }
    }
}
