// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Shutdown Coordinator
//!
//! Owns the server's lifetime:
//!
//! 1. Serve until the shutdown signal fires
//! 2. Stop accepting connections and give in-flight requests up to the
//!    grace period; connections still open afterwards are closed
//! 3. Wait (unbounded) for every background task to finish
//! 4. Cancel the `stopped` token so periodic tasks exit, and report
//!
//! A server that stops without a shutdown request is an error.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::background::BackgroundTasks;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server failed: {0}")]
    Serve(#[from] std::io::Error),

    #[error("server stopped without a shutdown request")]
    UnexpectedStop,

    #[error("{open_connections} connection(s) still open after the {grace:?} grace period")]
    DrainTimeout {
        open_connections: usize,
        grace: Duration,
    },
}

pub struct ShutdownCoordinator {
    grace: Duration,
    background: BackgroundTasks,
    handle: Handle<SocketAddr>,
    stopped: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration, background: BackgroundTasks) -> Self {
        Self {
            grace,
            background,
            handle: Handle::new(),
            stopped: CancellationToken::new(),
        }
    }

    /// Server handle, e.g. to learn the bound address via `listening()`.
    pub fn handle(&self) -> Handle<SocketAddr> {
        self.handle.clone()
    }

    /// Cancelled once the drain has completed (or the server died).
    pub fn stopped(&self) -> CancellationToken {
        self.stopped.clone()
    }

    /// Serve `app` on `addr` until `signal` resolves, then drain.
    pub async fn serve<F>(&self, addr: SocketAddr, app: Router, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let requested = CancellationToken::new();
        let watcher = {
            let handle = self.handle.clone();
            let requested = requested.clone();
            tokio::spawn(async move {
                signal.await;
                info!("Shutdown requested, no longer accepting connections");
                requested.cancel();
                handle.graceful_shutdown(None);
            })
        };

        info!(%addr, "Server listening (docs at /docs)");
        let server = axum_server::bind(addr)
            .handle(self.handle.clone())
            .serve(app.into_make_service_with_connect_info::<SocketAddr>());
        tokio::pin!(server);

        let grace = self.grace;
        let outcome = tokio::select! {
            result = &mut server => {
                if requested.is_cancelled() {
                    result.map_err(ServerError::from)
                } else {
                    watcher.abort();
                    self.stopped.cancel();
                    return Err(match result {
                        Err(e) => ServerError::Serve(e),
                        Ok(()) => ServerError::UnexpectedStop,
                    });
                }
            }
            _ = async {
                requested.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                let open_connections = self.handle.connection_count();
                warn!(open_connections, ?grace, "Grace period expired, closing connections");
                self.handle.shutdown();
                if let Err(e) = server.await {
                    error!(error = %e, "Server failed while closing connections");
                }
                Err(ServerError::DrainTimeout { open_connections, grace })
            }
        };

        let pending = self.background.pending();
        if pending > 0 {
            info!(pending, "Waiting for background tasks");
        }
        self.background.drain().await;
        self.stopped.cancel();

        match &outcome {
            Ok(()) => info!("Server stopped"),
            Err(e) => error!(error = %e, "Server stopped with error"),
        }
        outcome
    }
}

/// Resolves on SIGINT (Ctrl-C) or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(signal = "SIGINT", "Caught signal"),
        _ = terminate => info!(signal = "SIGTERM", "Caught signal"),
    }
}
