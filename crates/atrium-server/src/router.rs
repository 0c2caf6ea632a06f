//! Axum router construction for the session server.

use std::sync::Arc;

use atrium_core::EngineFactory;
use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws` -- session `WebSocket`, one session per connection
/// - `GET /api/status` -- connection counters and uptime
/// - `GET /api/commands` -- accepted command names
pub fn build_router<F: EngineFactory>(state: Arc<AppState<F>>) -> Router {
    Router::new()
        // Status page
        .route("/", get(handlers::index::<F>))
        // Session socket
        .route("/ws", get(ws::ws_session::<F>))
        // REST API
        .route("/api/status", get(handlers::status::<F>))
        .route("/api/commands", get(handlers::commands))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
