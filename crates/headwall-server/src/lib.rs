//! # Headwall Server
//!
//! Axum integration for the Headwall policy engine.
//!
//! - [`security_middleware`]: applies the resolved route policy to every request
//! - [`CspNonce`]: extractor for the request's nonce
//! - [`secure`]: wraps an existing router
//! - [`Server`]: standalone server with static files, `/metrics` and graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

pub use extractors::CspNonce;
pub use middleware::{error_response, security_middleware, PRERENDER_HEADER};
pub use routes::{create_router, secure};
pub use server::{Server, ServerError};
pub use shutdown::shutdown_signal;
pub use state::{SecurityState, DEFAULT_BODY_LIMIT};
