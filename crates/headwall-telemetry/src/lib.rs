//! # Headwall Telemetry
//!
//! Observability for Headwall:
//! - Structured logging through `tracing-subscriber`
//! - Prometheus counters for policy decisions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingConfig, LoggingError, OutputFormat};
pub use metrics::{Metrics, MetricsError, RateLimitOutcome};
