//! Session server lifecycle management.
//!
//! [`bind`] opens the listener, [`serve`] runs the Axum server on it until
//! a shutdown future resolves, and [`start_server`] combines the two and
//! stops on `Ctrl-C`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use atrium_core::EngineFactory;
use atrium_core::config::ServerSettings;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Bind a listener to the configured host and port.
///
/// Port `0` picks a free port; read it back with
/// [`TcpListener::local_addr`].
pub async fn bind(settings: &ServerSettings) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = settings
        .bind_addr()
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))
}

/// Serve the router on `listener` until `shutdown` resolves.
///
/// Connections already open when shutdown begins run to completion.
pub async fn serve<F, S>(
    listener: TcpListener,
    state: Arc<AppState<F>>,
    shutdown: S,
) -> Result<(), ServerError>
where
    F: EngineFactory,
    S: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "session server listening");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))
}

/// Bind to the address in `state.settings` and serve until `Ctrl-C`.
pub async fn start_server<F: EngineFactory>(state: Arc<AppState<F>>) -> Result<(), ServerError> {
    let listener = bind(&state.settings).await?;
    serve(listener, state, shutdown_signal()).await?;
    info!("session server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the task is aborted.
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// Errors that can occur when starting or running the session server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
