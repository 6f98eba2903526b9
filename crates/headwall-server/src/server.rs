//! Standalone HTTP server.

use axum::Router;
use headwall_config::{LoadedConfig, ServerConfig};
use headwall_core::SecurityError;
use headwall_ratelimit::RateLimiter;
use headwall_telemetry::{Metrics, MetricsError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::create_router;
use crate::shutdown::shutdown_signal;
use crate::state::SecurityState;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Listener could not bind
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Serving failed
    #[error("Server error: {0}")]
    Serve(std::io::Error),

    /// Invalid security setup
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Metrics registry could not be built
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// HTTP server serving the secured router.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: Router,
}

impl Server {
    /// Server from explicit settings and state.
    #[must_use]
    pub fn new(config: ServerConfig, state: SecurityState) -> Self {
        let router = create_router(state, &config);
        Self { config, router }
    }

    /// Server from a loaded configuration, with fresh metrics and limiter.
    pub fn from_loaded(loaded: LoadedConfig) -> Result<Self, ServerError> {
        let metrics = Arc::new(Metrics::new()?);
        let limiter = Arc::new(RateLimiter::new().with_metrics(Arc::clone(&metrics)));
        let state = SecurityState::new(Arc::new(loaded.resolver), limiter, metrics)?
            .with_body_limit(loaded.config.server.body_limit_bytes);
        Ok(Self::new(loaded.config.server, state))
    }

    /// The router, for embedding or tests.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.bind_address.clone(),
                source,
            })?;

        info!(
            address = %self.config.bind_address,
            public_dir = ?self.config.public_dir,
            "Headwall listening"
        );

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

        info!("Server stopped");
        Ok(())
    }
}
