//! Session server binary for the Atrium simulator.
//!
//! Serves the session `WebSocket` backed by the in-process stub engine.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `atrium.yaml` (or `ATRIUM_CONFIG`)
//! 2. Apply `ATRIUM_*` environment overrides
//! 3. Initialize structured logging (tracing); `RUST_LOG` wins over the
//!    configured filter
//! 4. Create the engine factory from the `engine` section
//! 5. Serve until `Ctrl-C`

use std::path::PathBuf;
use std::sync::Arc;

use atrium_core::StubEngineFactory;
use atrium_core::config::{AtriumConfig, LoggingConfig};
use atrium_server::server::start_server;
use atrium_server::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "atrium.yaml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet; its format comes
    //    from this file.
    let config_path = std::env::var("ATRIUM_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config_found = config_path.exists();
    let mut config = AtriumConfig::load_or_default(&config_path)?;

    // 2. Environment overrides.
    config.server.apply_env_overrides();

    // 3. Initialize structured logging.
    init_tracing(&config.logging);
    if config_found {
        info!(path = %config_path.display(), "Loaded configuration");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    // 4. Engine factory.
    let factory = Arc::new(StubEngineFactory::from_config(&config.engine));
    info!(
        scenes = config.engine.scenes.len(),
        width = config.engine.width,
        height = config.engine.height,
        "Stub engine ready"
    );

    // 5. Serve.
    info!(
        addr = %config.server.bind_addr(),
        ping_interval_secs = config.server.ping_interval_secs,
        ping_timeout_secs = config.server.ping_timeout_secs,
        "Starting session server"
    );
    let state = Arc::new(AppState::new(factory, config.server));
    start_server(state).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
