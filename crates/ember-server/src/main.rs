//! # Ember Server
//!
//! Realtime presence, call signaling and notification relay for a dating
//! app backend.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! ember
//!
//! # Run with custom config
//! ember --config /path/to/ember.toml
//!
//! # Run with environment variables
//! EMBER_PORT=8080 EMBER_HOST=0.0.0.0 ember
//!
//! # Override one config key
//! EMBER__LIKES__DAILY_LIMIT=25 ember
//! ```

mod api;
mod config;
mod metrics;
mod server;
mod state;
mod store;
mod ws;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(version)]
#[command(about = "Realtime presence, signaling and notification server")]
struct Cli {
    /// Read configuration from this TOML file instead of the search path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match cli.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!("Starting Ember server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    server::run_server(config).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_flag() {
        let cli = Cli::parse_from(["ember", "--config", "/etc/ember/ember.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/ember/ember.toml")));

        let cli = Cli::parse_from(["ember"]);
        assert!(cli.config.is_none());
    }
}
