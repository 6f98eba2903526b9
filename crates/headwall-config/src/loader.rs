//! Configuration loading from disk.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::resolver::PolicyResolver;
use crate::schema::{HeadwallConfig, LogFormat};
use crate::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// The file extension is not a known format.
    #[error("unsupported configuration format `{0}` (expected toml, yaml, yml or json)")]
    UnsupportedFormat(String),

    /// The configuration parsed but is invalid.
    #[error("invalid configuration: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML.
    Toml,
    /// YAML.
    Yaml,
    /// JSON.
    Json,
}

impl ConfigFormat {
    /// Pick a format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A validated configuration with its compiled resolver.
#[derive(Debug)]
pub struct LoadedConfig {
    /// The parsed configuration.
    pub config: HeadwallConfig,
    /// Resolver built from the global policy and route rules.
    pub resolver: PolicyResolver,
}

/// Parse configuration text.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<HeadwallConfig, ConfigError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string())),
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }
}

/// Load, apply environment overrides and validate a configuration file.
pub async fn load_config(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let config = parse_config(&content, format)?;
    info!(path = %path.display(), routes = config.routes.len(), "Configuration loaded");
    finish(config)
}

/// Like [`load_config`], but falls back to defaults when the file does not exist.
pub async fn load_config_or_default(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let path = path.as_ref();
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        load_config(path).await
    } else {
        warn!(path = %path.display(), "Configuration file not found, using defaults");
        finish(HeadwallConfig::default())
    }
}

fn finish(mut config: HeadwallConfig) -> Result<LoadedConfig, ConfigError> {
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    let resolver = validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(LoadedConfig { config, resolver })
}

/// Apply `HEADWALL_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut HeadwallConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = lookup("HEADWALL_BIND_ADDRESS") {
        config.server.bind_address = addr;
    }
    if let Some(level) = lookup("HEADWALL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = lookup("HEADWALL_LOG_FORMAT") {
        match format.to_ascii_lowercase().as_str() {
            "json" => config.logging.format = LogFormat::Json,
            "pretty" => config.logging.format = LogFormat::Pretty,
            other => warn!(value = %other, "Ignoring unknown HEADWALL_LOG_FORMAT"),
        }
    }
}
