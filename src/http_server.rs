use crate::gateway::{Gateway, InboundEnvelope};
use crate::store::TriggerState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
struct ServerState {
    trigger: TriggerState,
    gateway: Arc<Gateway>,
}

/// `POST /webhook` for CMS callbacks, `GET /health` for liveness checks.
pub fn router(trigger: TriggerState, gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(health))
        .with_state(ServerState { trigger, gateway })
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "Neos webhook server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "ok"
}

async fn handle_webhook(
    State(state): State<ServerState>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let headers: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
        .collect();

    let envelope = InboundEnvelope::new(body.to_vec(), headers, query);

    match state.gateway.handle(&state.trigger, &envelope).await {
        Ok(outcome) => outcome.into_response(),
        Err(err) => err.into_response(),
    }
}
