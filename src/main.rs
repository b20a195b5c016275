use neos_webhook_trigger::config::SystemEnv;
use neos_webhook_trigger::diagnostics::TracingSink;
use neos_webhook_trigger::types::ForwardedEvent;
use neos_webhook_trigger::{
    http_server, Activation, Config, Gateway, HttpNeosApi, Registrar, TriggerState,
};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Neos trigger stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env(&SystemEnv)?;

    let trigger = match &config.state_file {
        Some(path) => TriggerState::open(path)?,
        None => TriggerState::in_memory(),
    };
    let api = HttpNeosApi::new(
        config.instance_url.as_deref(),
        &config.access_token,
        config.request_timeout,
    )?;
    let sink = Arc::new(TracingSink::new("neos"));
    let subscription = config.subscription();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let gateway = Gateway::new(
        subscription.clone(),
        config.max_value_length,
        sink.clone(),
        event_tx,
    );

    // The handshake follows registration immediately, so listen first.
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.port))).await?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = http_server::router(trigger.clone(), Arc::new(gateway));
    let server = tokio::spawn(http_server::serve(listener, app, async move {
        let _ = shutdown_rx.await;
    }));
    let consumer = tokio::spawn(forward_events(event_rx));

    let registrar = Registrar::new(Arc::new(api), sink);
    match registrar.activate(&trigger, &subscription).await {
        Activation::Reused { webhook_id } => {
            tracing::info!(webhook_id = %webhook_id, target_url = %subscription.target_url, "Trigger active (existing webhook)")
        }
        Activation::Created { webhook_id } => {
            tracing::info!(webhook_id = %webhook_id, target_url = %subscription.target_url, "Trigger active (new webhook)")
        }
        Activation::Failed => {
            let _ = shutdown_tx.send(());
            let _ = server.await;
            return Err("webhook registration failed, trigger not activated".into());
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down, removing webhook registration");

    registrar.delete(&trigger).await;
    let _ = shutdown_tx.send(());
    server.await??;
    // The router owned the last sender, so the consumer drains and exits.
    consumer.await?;
    Ok(())
}

/// Write each forwarded event to stdout as one JSON line.
async fn forward_events(mut rx: mpsc::UnboundedReceiver<ForwardedEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => emit_line(&line),
            Err(e) => tracing::error!(error = %e, "failed to serialize event"),
        }
    }
}

fn emit_line(line: &str) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}
