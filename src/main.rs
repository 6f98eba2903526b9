//! # Headwall
//!
//! Per-route HTTP security policy engine: security headers, CSP nonces and
//! hashes, rate limiting, request size and method gates.
//!
//! ## Usage
//!
//! ```bash
//! # Start with ./headwall.toml, or built-in defaults if it does not exist
//! headwall
//!
//! # Start with a custom config file
//! HEADWALL_CONFIG=/etc/headwall.yaml headwall
//!
//! # Start with environment overrides
//! HEADWALL_BIND_ADDRESS=0.0.0.0:8080 HEADWALL_LOG_FORMAT=json headwall
//! ```

use anyhow::Context;
use headwall_config::{load_config_or_default, LogFormat};
use headwall_server::Server;
use headwall_telemetry::{init_logging, LoggingConfig, OutputFormat};
use std::env;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "headwall.toml";

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Headwall failed");
        eprintln!("headwall: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let path = env::var("HEADWALL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let loaded = load_config_or_default(&path)
        .await
        .with_context(|| format!("loading configuration from {path}"))?;

    let format = match loaded.config.logging.format {
        LogFormat::Pretty => OutputFormat::Pretty,
        LogFormat::Json => OutputFormat::Json,
    };
    if let Err(e) = init_logging(&LoggingConfig::new(&loaded.config.logging.level).with_format(format)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path,
        routes = loaded.resolver.rules().len(),
        "Starting Headwall"
    );

    let server = Server::from_loaded(loaded)?;
    server.run().await?;
    Ok(())
}
