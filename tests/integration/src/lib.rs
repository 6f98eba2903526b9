//! Integration tests for Headwall
//!
//! Drives a secured axum router end to end with `tower::ServiceExt::oneshot`:
//! - Security header compilation and route layering
//! - CSP nonces and prerender hashes
//! - Rate limiting
//! - Request size and method gates

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;

#[cfg(test)]
mod csp_tests;
#[cfg(test)]
mod header_tests;
#[cfg(test)]
mod rate_limit_tests;
#[cfg(test)]
mod validator_tests;
