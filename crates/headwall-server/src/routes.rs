//! Router assembly.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use headwall_config::ServerConfig;
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::error;

use crate::middleware::security_middleware;
use crate::state::SecurityState;

/// Wrap any router in the security middleware.
pub fn secure(app: Router, state: SecurityState) -> Router {
    app.layer(axum::middleware::from_fn_with_state(state, security_middleware))
}

/// The standalone server's router: metrics, optional static files, security.
pub fn create_router(state: SecurityState, config: &ServerConfig) -> Router {
    let router = Router::new()
        .route(&config.metrics_path, get(metrics_endpoint))
        .with_state(state.clone());

    let router = match &config.public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(not_found),
    };

    secure(router, state).layer(TraceLayer::new_for_http())
}

async fn metrics_endpoint(State(state): State<SecurityState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "statusCode": 404, "statusMessage": "Not Found" })),
    )
}
