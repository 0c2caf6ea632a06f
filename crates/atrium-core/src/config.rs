//! Configuration loading and typed config structures for the Atrium server.
//!
//! The canonical configuration lives in `atrium.yaml` next to the binary.
//! Every section and field has a default, so an empty or missing file yields
//! a working server backed by the stub engine.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration, mirroring `atrium.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AtriumConfig {
    /// Listener address and connection keepalive.
    #[serde(default)]
    pub server: ServerSettings,

    /// Engine construction settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Log filter and output format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AtriumConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file) when the file is present.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Listener and keepalive settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between server-initiated WebSocket pings.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Seconds without any inbound frame before the connection is dropped
    /// and its session closed.
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
}

impl ServerSettings {
    /// Override listener settings with environment variables when set.
    ///
    /// Unparseable numeric values are ignored and the configured value kept.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ATRIUM_HOST") {
            self.host = val;
        }
        if let Some(port) = std::env::var("ATRIUM_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.port = port;
        }
        if let Some(secs) = std::env::var("ATRIUM_PING_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.ping_timeout_secs = secs;
        }
    }

    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval as a [`Duration`].
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Idle timeout as a [`Duration`].
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ping_interval_secs: default_ping_interval_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
        }
    }
}

/// Engine construction settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Scene ids the engine can build.
    #[serde(default = "default_scenes")]
    pub scenes: Vec<String>,

    /// Sensor frame width in pixels.
    #[serde(default = "default_frame_size")]
    pub width: u32,

    /// Sensor frame height in pixels.
    #[serde(default = "default_frame_size")]
    pub height: u32,

    /// Artificial scene build latency in milliseconds.
    #[serde(default)]
    pub build_delay_ms: u64,
}

impl EngineConfig {
    /// Build delay as a [`Duration`].
    pub const fn build_delay(&self) -> Duration {
        Duration::from_millis(self.build_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scenes: default_scenes(),
            width: default_frame_size(),
            height: default_frame_size(),
            build_delay_ms: 0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    1234
}

const fn default_ping_interval_secs() -> u64 {
    25
}

const fn default_ping_timeout_secs() -> u64 {
    300
}

fn default_scenes() -> Vec<String> {
    vec![
        "apartment_0".to_owned(),
        "office_1".to_owned(),
        "warehouse_2".to_owned(),
    ]
}

const fn default_frame_size() -> u32 {
    64
}

fn default_log_filter() -> String {
    "info".to_owned()
}
