//! HTTP handlers served next to the session socket.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/status` | Connection counters and uptime |
//! | `GET` | `/api/commands` | Command names the socket accepts |

use std::sync::Arc;

use atrium_core::{Command, EngineFactory};
use axum::Json;
use axum::extract::State;
use axum::response::{Html, IntoResponse};

use crate::state::{AppState, ServerStatus};

// ---------------------------------------------------------------------------
// Status page
// ---------------------------------------------------------------------------

/// Minimal HTML status page.
///
/// # Route
///
/// `GET /`
pub async fn index<F: EngineFactory>(State(state): State<Arc<AppState<F>>>) -> impl IntoResponse {
    let status = state.status();
    let active = status.active_connections;
    let total = status.total_connections;
    let uptime = status.uptime_seconds;
    let timeout = state.settings.ping_timeout_secs;

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Atrium</title></head>
<body>
<h1>Atrium</h1>
<p>active sessions: {active}<br>total sessions: {total}<br>uptime: {uptime}s<br>idle timeout: {timeout}s</p>
<p>socket: <code>/ws</code> | <a href="/api/status">/api/status</a> | <a href="/api/commands">/api/commands</a></p>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// JSON endpoints
// ---------------------------------------------------------------------------

/// Connection counters and uptime.
///
/// # Route
///
/// `GET /api/status`
pub async fn status<F: EngineFactory>(
    State(state): State<Arc<AppState<F>>>,
) -> Json<ServerStatus> {
    Json(state.status())
}

/// Command names accepted on the session socket.
///
/// # Route
///
/// `GET /api/commands`
pub async fn commands() -> Json<Vec<&'static str>> {
    Json(Command::NAMES.to_vec())
}
