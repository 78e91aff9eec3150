//! HTTP(S) transport for the callback endpoint.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::post, Router};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{ConfigError, ServerConfig, TlsFiles};
use crate::interaction::CallbackHandler;
use crate::web::handlers::{process_callback, CallbackState};
use crate::web::trace::RequestCounter;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid server configuration")]
    Config(#[from] ConfigError),

    #[error("failed to load TLS certificate or key")]
    Tls(#[source] io::Error),

    #[error("http server error")]
    Serve(#[source] io::Error),
}

/// Triggers a graceful shutdown of a running [`CallbackServer`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

/// Serves Slack interaction callbacks on a single route.
pub struct CallbackServer<H> {
    state: Arc<CallbackState<H>>,
    path: String,
    shutdown_grace: Duration,
    tls: Option<TlsFiles>,
    shutdown: ShutdownHandle,
}

impl<H: CallbackHandler> CallbackServer<H> {
    pub fn new(config: ServerConfig, handler: H) -> Result<Self, ServerError> {
        Self::with_counter(config, handler, Arc::new(RequestCounter::new()))
    }

    /// Build a server around an existing request counter.
    pub fn with_counter(
        config: ServerConfig,
        handler: H,
        counter: Arc<RequestCounter>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            state: Arc::new(CallbackState::new(&config, handler, counter)),
            path: config.path,
            shutdown_grace: config.shutdown_grace,
            tls: config.tls,
            shutdown: ShutdownHandle(Arc::new(shutdown)),
        })
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.path, post(process_callback::<H>))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Begin a graceful shutdown; [`CallbackServer::run`] returns once
    /// in-flight requests finish or the grace period runs out.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Serve until [`CallbackServer::shutdown`] is called.
    ///
    /// Speaks HTTPS when TLS files are configured, plain HTTP otherwise.
    pub async fn run(&self, listener: TcpListener) -> Result<(), ServerError> {
        let address = listener.local_addr().map_err(ServerError::Serve)?;
        let listener = listener.into_std().map_err(ServerError::Serve)?;
        let app = self.router().into_make_service();
        let handle = Handle::new();

        match &self.tls {
            Some(files) => {
                let tls = load_tls(files).await?;
                info!(%address, path = %self.path, tls = true, "callback_server_listening");

                let serve = axum_server::from_tcp_rustls(listener, tls)
                    .handle(handle.clone())
                    .serve(app);
                self.drain(handle, serve).await
            }
            None => {
                info!(%address, path = %self.path, tls = false, "callback_server_listening");

                let serve = axum_server::from_tcp(listener)
                    .handle(handle.clone())
                    .serve(app);
                self.drain(handle, serve).await
            }
        }
    }

    /// Drive `serve` until shutdown is requested, then give open connections
    /// the grace period before they are closed.
    async fn drain<F>(&self, handle: Handle, serve: F) -> Result<(), ServerError>
    where
        F: Future<Output = io::Result<()>>,
    {
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => return result.map_err(ServerError::Serve),
            _ = self.shutdown_requested() => {}
        }

        info!(
            grace_ms = self.shutdown_grace.as_millis() as u64,
            connections = handle.connection_count(),
            "callback_server_draining"
        );
        handle.graceful_shutdown(Some(self.shutdown_grace));

        let result = match tokio::time::timeout(self.shutdown_grace, &mut serve).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    connections = handle.connection_count(),
                    "callback_server_grace_elapsed"
                );
                serve.await
            }
        };
        result.map_err(ServerError::Serve)?;

        info!("callback_server_stopped");
        Ok(())
    }

    fn shutdown_requested(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut stop = self.shutdown.0.subscribe();
        async move {
            let _ = stop.wait_for(|stop| *stop).await;
        }
    }
}

async fn load_tls(files: &TlsFiles) -> Result<RustlsConfig, ServerError> {
    // Another provider may already be installed; either one serves.
    let _ = rustls::crypto::ring::default_provider().install_default();

    RustlsConfig::from_pem_file(&files.cert, &files.key)
        .await
        .inspect_err(|e| {
            warn!(
                error = %e,
                cert = %files.cert.display(),
                key = %files.key.display(),
                "tls_load_failed"
            )
        })
        .map_err(ServerError::Tls)
}
