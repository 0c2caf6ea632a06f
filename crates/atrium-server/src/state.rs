//! Shared application state for the session server.
//!
//! [`AppState`] holds the engine factory every connection draws its
//! engine from, the keepalive settings, and connection counters served by
//! `GET /api/status`. Sessions themselves are never shared: each
//! `WebSocket` connection owns its own dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use atrium_core::EngineFactory;
use atrium_core::config::ServerSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide server state.
#[derive(Debug)]
pub struct AppState<F: EngineFactory> {
    /// Factory for per-connection engines.
    pub factory: Arc<F>,
    /// Bind address and keepalive settings.
    pub settings: ServerSettings,
    stats: Arc<ConnectionStats>,
    started_at: DateTime<Utc>,
}

impl<F: EngineFactory> AppState<F> {
    /// Create state with zeroed counters.
    pub fn new(factory: Arc<F>, settings: ServerSettings) -> Self {
        Self {
            factory,
            settings,
            stats: Arc::new(ConnectionStats::default()),
            started_at: Utc::now(),
        }
    }

    /// Interval between server pings.
    pub fn ping_interval(&self) -> Duration {
        // `tokio::time::interval` rejects a zero period.
        self.settings.ping_interval().max(Duration::from_millis(10))
    }

    /// Silence after which a connection is dropped.
    pub const fn ping_timeout(&self) -> Duration {
        self.settings.ping_timeout()
    }

    /// Count a new connection. It stays active until the guard drops.
    pub fn open_connection(&self) -> ConnectionGuard {
        self.stats.active.fetch_add(1, Ordering::Relaxed);
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            stats: Arc::clone(&self.stats),
        }
    }

    /// Snapshot for the status endpoint.
    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            active_connections: self.stats.active.load(Ordering::Relaxed),
            total_connections: self.stats.total.load(Ordering::Relaxed),
            uptime_seconds: Utc::now()
                .signed_duration_since(self.started_at)
                .num_seconds()
                .max(0),
            started_at: self.started_at,
        }
    }
}

#[derive(Debug, Default)]
struct ConnectionStats {
    active: AtomicU64,
    total: AtomicU64,
}

/// Marks one live connection. Dropping it decrements the active count.
#[derive(Debug)]
pub struct ConnectionGuard {
    stats: Arc<ConnectionStats>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// JSON body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Connections currently open.
    pub active_connections: u64,
    /// Connections accepted since startup.
    pub total_connections: u64,
    /// Seconds since startup.
    pub uptime_seconds: i64,
    /// Startup time.
    pub started_at: DateTime<Utc>,
}
