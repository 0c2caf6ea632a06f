//! Background startup helper.
//!
//! [`spawn_server`] binds eagerly, so address errors surface to the
//! caller, then serves on a background Tokio task. The integration tests
//! use it with port `0`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use atrium_server::startup::spawn_server;
//!
//! let (addr, handle) = spawn_server(state).await?;
//! // Connect to ws://{addr}/ws. Abort the handle to stop serving.
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use atrium_core::EngineFactory;
use tokio::task::JoinHandle;

use crate::server::{self, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the session server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),

    /// The bound listener has no local address.
    #[error("listener address unavailable: {0}")]
    Address(#[from] std::io::Error),
}

/// Bind to `state.settings` and serve on a background task.
///
/// Returns the bound address and the task handle. The server runs until
/// the handle is aborted or the runtime shuts down.
pub async fn spawn_server<F: EngineFactory>(
    state: Arc<AppState<F>>,
) -> Result<(SocketAddr, JoinHandle<()>), StartupError> {
    let listener = server::bind(&state.settings).await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, std::future::pending()).await {
            tracing::error!(error = %e, "session server exited with error");
        }
    });

    tracing::info!(%addr, "session server spawned on background task");

    Ok((addr, handle))
}
