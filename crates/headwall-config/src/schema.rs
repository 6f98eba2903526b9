//! Configuration file schema.

use headwall_core::PolicyValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::defaults::default_policy;
use crate::merge::merge;
use crate::routes::RouteRule;
use crate::validation::ValidationError;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadwallConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Global security policy, layered over the built-in defaults.
    pub security: PolicyValue,
    /// Per-route overrides, in registration order.
    pub routes: Vec<RouteConfig>,
}

impl Default for HeadwallConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingSettings::default(),
            security: PolicyValue::empty_map(),
            routes: Vec::new(),
        }
    }
}

impl HeadwallConfig {
    /// Built-in defaults merged with the `security` section.
    #[must_use]
    pub fn global_policy(&self) -> PolicyValue {
        merge(&default_policy(), &self.security)
    }

    /// Parse every `[[routes]]` entry into a rule.
    pub fn route_rules(&self) -> Result<Vec<RouteRule>, Vec<ValidationError>> {
        let mut rules = Vec::with_capacity(self.routes.len());
        let mut errors = Vec::new();
        for route in &self.routes {
            match RouteRule::from_route_headers(&route.pattern, route.security.clone(), route.headers.clone()) {
                Ok(rule) => rules.push(rule),
                Err(reason) => errors.push(ValidationError::InvalidRoute {
                    pattern: route.pattern.clone(),
                    reason,
                }),
            }
        }
        if errors.is_empty() {
            Ok(rules)
        } else {
            Err(errors)
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_address: String,
    /// Directory served as static files, if any.
    pub public_dir: Option<PathBuf>,
    /// Largest response body buffered for HTML rewriting.
    pub body_limit_bytes: usize,
    /// Path of the Prometheus endpoint.
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            public_dir: None,
            body_limit_bytes: 10 * 1024 * 1024,
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// One `[[routes]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Route pattern, e.g. `/api/**`.
    pub pattern: String,
    /// Partial security policy for the route.
    #[serde(default)]
    pub security: Option<PolicyValue>,
    /// Route headers. Strings are host headers; structured security headers
    /// are moved into `security.headers`.
    #[serde(default)]
    pub headers: IndexMap<String, PolicyValue>,
}
