//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`ember.toml`, `/etc/ember/ember.toml`,
//!   `~/.config/ember/ember.toml`)
//! - Environment variables (`EMBER__SECTION__KEY`, plus `EMBER_HOST` and
//!   `EMBER_PORT` for the bind address)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Like quota for non-premium users.
    #[serde(default)]
    pub likes: LikesConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum inbound frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Ping interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// Close after this long without inbound traffic, in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

/// Like quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikesConfig {
    /// Likes per UTC day for users without an active subscription.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("EMBER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("EMBER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_heartbeat_interval() -> u64 {
    25_000 // 25 seconds
}

fn default_heartbeat_timeout() -> u64 {
    60_000 // 60 seconds
}

fn default_daily_limit() -> u32 {
    10
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            likes: LikesConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl Default for LikesConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

const CONFIG_PATHS: [&str; 3] = [
    "ember.toml",
    "/etc/ember/ember.toml",
    "~/.config/ember/ember.toml",
];

impl Config {
    /// Load configuration from the first config file found, layered with
    /// `EMBER__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = Self::find_config_file() {
            tracing::debug!(path = %path.display(), "Loading config file");
            builder = builder.add_source(::config::File::from(path).format(::config::FileFormat::Toml));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix("EMBER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|layered| layered.try_deserialize())
            .context("Failed to load configuration")
    }

    fn find_config_file() -> Option<PathBuf> {
        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.limits.max_connections, 100_000);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
        assert_eq!(config.heartbeat.interval_ms, 25_000);
        assert_eq!(config.heartbeat.timeout_ms, 60_000);
        assert_eq!(config.likes.daily_limit, 10);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 5000,
            ..Config::default()
        };
        assert_eq!(config.bind_addr().unwrap().port(), 5000);

        let broken = Config {
            host: "not a host".to_string(),
            ..config
        };
        assert!(broken.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_connections = 50000

            [likes]
            daily_limit = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_connections, 50000);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
        assert_eq!(config.likes.daily_limit, 3);
    }

    #[test]
    fn test_config_from_file() {
        let path = std::env::temp_dir().join(format!("ember-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[heartbeat]\ninterval_ms = 1000\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.heartbeat.interval_ms, 1000);
        assert_eq!(config.heartbeat.timeout_ms, 60_000);

        std::fs::remove_file(&path).unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
