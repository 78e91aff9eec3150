//! Slack callback server - verified interaction callback receiver.
//!
//! This binary:
//! - Receives Slack interaction callbacks on a single route
//! - Verifies the request signature against `SLACK_SIGNING_SECRET`
//! - Logs each verified interaction
//! - Serves HTTPS when TLS_CERT_PATH/TLS_KEY_PATH are set
//! - Drains in-flight requests on SIGINT/SIGTERM

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use slack_callback::{handler_fn, Callback, CallbackServer, Config, DispatchContext, HandlerError};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("callback_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        path = %config.callback_path,
        signing_secret_configured = config.signing_secret.is_some(),
        callback_deadline_ms = config.callback_deadline_ms,
        shutdown_grace_ms = config.shutdown_grace_ms,
        tls_configured = config.tls_cert_path.is_some(),
        "config_loaded"
    );

    let server_config = config
        .server_config()
        .context("Invalid configuration")?;
    let server = CallbackServer::new(server_config, handler_fn(log_interaction))?;

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.shutdown();
    });

    server.run(listener).await.context("Server error")?;

    info!("callback_server_shutdown_complete");

    Ok(())
}

/// Default handler: record the interaction and acknowledge it.
async fn log_interaction(ctx: DispatchContext, callback: Callback) -> Result<(), HandlerError> {
    let event = &callback.event;
    info!(
        slack_http_id = %callback.trace,
        interaction_type = %event.kind,
        callback_id = %event.callback_id,
        trigger_id = %event.trigger_id,
        team_id = event.team.as_ref().map(|t| t.id.as_str()),
        user_id = event.user.as_ref().map(|u| u.id.as_str()),
        actions = event.actions.len(),
        remaining_ms = ctx.remaining().as_millis() as u64,
        "slack_interaction_received"
    );
    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("callback_server_shutting_down");
}
