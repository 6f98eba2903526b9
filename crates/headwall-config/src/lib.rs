//! # Headwall Config
//!
//! Configuration loading and policy resolution.
//!
//! ## Features
//!
//! - **Merge engine**: deep merge where lists replace and maps merge
//! - **Route resolution**: longest-prefix matching with `/**` as the base layer
//! - **Loading**: TOML, YAML or JSON files with `HEADWALL_*` overrides
//! - **Validation**: every problem reported at once, before serving traffic
//!
//! ## Example
//!
//! ```rust,no_run
//! use headwall_config::{default_policy, PolicyResolver, RouteRule};
//! use headwall_core::PolicyValue;
//!
//! let rules = vec![RouteRule::new("/api/**", PolicyValue::map([("nonce", PolicyValue::Enabled)])).unwrap()];
//! let resolver = PolicyResolver::new(default_policy(), rules).unwrap();
//! let policy = resolver.resolve("/api/users").unwrap();
//! assert!(policy.nonce);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod defaults;
pub mod loader;
pub mod merge;
pub mod resolver;
pub mod routes;
pub mod schema;
pub mod validation;

pub use defaults::default_policy;
pub use loader::{
    apply_env_overrides, load_config, load_config_or_default, parse_config, ConfigError,
    ConfigFormat, LoadedConfig,
};
pub use merge::{merge, merge_into};
pub use resolver::{resolve, PolicyResolver};
pub use routes::{RoutePattern, RouteRule};
pub use schema::{HeadwallConfig, LogFormat, LoggingSettings, RouteConfig, ServerConfig};
pub use validation::{validate_config, ValidationError};
