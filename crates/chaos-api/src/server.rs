//! HTTP server lifecycle.
//!
//! [`start_server`] binds the configured address and serves until
//! `Ctrl-C`. The two halves are public on their own so callers (and tests)
//! can bind an ephemeral port and choose their own shutdown trigger.

use std::future::Future;
use std::sync::Arc;

use chaos_core::config::ServerSection;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Bind the configured host and port, then serve until `Ctrl-C`.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address cannot be bound and
/// [`ServerError::Serve`] if the accept loop fails.
pub async fn start_server(server: &ServerSection, state: Arc<AppState>) -> Result<(), ServerError> {
    let listener = bind(server).await?;
    serve(listener, state, ctrl_c()).await
}

/// Bind a listener for `server.host:server.port`. Host names are
/// resolved; port 0 picks a free port.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] naming the address on failure.
pub async fn bind(server: &ServerSection) -> Result<TcpListener, ServerError> {
    TcpListener::bind((server.host.as_str(), server.port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: format!("{}:{}", server.host, server.port),
            source,
        })
}

/// Serve the API on `listener` until `shutdown` resolves. In-flight
/// requests are allowed to finish.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] if the accept loop fails.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Chaos API listening");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Chaos API stopped");
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
}

/// Errors that stop the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// `host:port` as configured.
        addr: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The accept loop failed.
    #[error("serve error: {0}")]
    Serve(#[from] std::io::Error),
}
