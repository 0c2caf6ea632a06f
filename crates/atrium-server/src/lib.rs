//! `WebSocket` session server for the Atrium simulator.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **Session socket** (`/ws`): one session and one engine per
//!   connection, JSON request/response frames, server pings and an idle
//!   timeout
//! - **Status endpoints** (`/api/status`, `/api/commands`) and a minimal
//!   HTML page (`/`)
//!
//! The server is generic over [`EngineFactory`]; the binary wires in the
//! in-process stub engine.
//!
//! [`EngineFactory`]: atrium_core::EngineFactory

pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use startup::{StartupError, spawn_server};
pub use state::{AppState, ServerStatus};
pub use ws::{DisconnectEvent, DisconnectReason};
