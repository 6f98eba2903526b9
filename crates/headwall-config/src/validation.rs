//! Semantic validation of a loaded configuration.

use std::net::SocketAddr;
use thiserror::Error;

use crate::resolver::PolicyResolver;
use crate::schema::HeadwallConfig;

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `server.bind_address` is not a socket address.
    #[error("server.bind_address `{0}` is not a valid socket address")]
    InvalidBindAddress(String),

    /// `server.body_limit_bytes` is zero.
    #[error("server.body_limit_bytes must be greater than 0")]
    InvalidBodyLimit,

    /// `server.metrics_path` does not start with `/`.
    #[error("server.metrics_path `{0}` must start with `/`")]
    InvalidMetricsPath(String),

    /// A route pattern could not be parsed.
    #[error("route `{pattern}`: {reason}")]
    InvalidRoute {
        /// Raw pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The security policy has a shape problem.
    #[error("{0}")]
    Policy(String),
}

/// Validate everything and return all problems found.
pub fn validate_config(config: &HeadwallConfig) -> Result<PolicyResolver, Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }
    if config.server.body_limit_bytes == 0 {
        errors.push(ValidationError::InvalidBodyLimit);
    }
    if !config.server.metrics_path.starts_with('/') {
        errors.push(ValidationError::InvalidMetricsPath(
            config.server.metrics_path.clone(),
        ));
    }

    let rules = match config.route_rules() {
        Ok(rules) => rules,
        Err(route_errors) => {
            errors.extend(route_errors);
            return Err(errors);
        }
    };

    match PolicyResolver::new(config.global_policy(), rules) {
        Ok(resolver) if errors.is_empty() => Ok(resolver),
        Ok(_) => Err(errors),
        Err(headwall_core::SecurityError::Configuration(problems)) => {
            errors.extend(problems.into_iter().map(ValidationError::Policy));
            Err(errors)
        }
        Err(other) => {
            errors.push(ValidationError::Policy(other.to_string()));
            Err(errors)
        }
    }
}
