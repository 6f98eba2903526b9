//! Test helper utilities for integration tests

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use headwall_config::{parse_config, validate_config, ConfigFormat};
use headwall_ratelimit::{ManualClock, RateLimiter};
use headwall_security::PrerenderManifest;
use headwall_server::{secure, SecurityState};
use headwall_telemetry::Metrics;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;

use crate::fixtures::app_routes;

/// Start of the manual clock, milliseconds since the epoch.
pub const CLOCK_START: u64 = 1_700_000_000_000;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// A secured app with handles on its clock, metrics and prerender manifest.
pub struct TestApp {
    /// Router under test
    pub router: Router,
    /// Counters shared with the middleware
    pub metrics: Arc<Metrics>,
    /// Clock driving rate limit windows
    pub clock: Arc<ManualClock>,
    /// Header rules of pre-rendered pages, filled only by a prerender pass
    pub manifest: Arc<Mutex<PrerenderManifest>>,
}

impl TestApp {
    /// Secure the fixture routes with a TOML configuration, as a live server.
    pub fn from_toml(config: &str) -> Self {
        Self::with_app(config, app_routes(), false)
    }

    /// Secure the fixture routes for a prerender pass.
    pub fn prerendering(config: &str) -> Self {
        Self::with_app(config, app_routes(), true)
    }

    /// Secure `app` with a TOML configuration.
    pub fn with_app(config: &str, app: Router, prerender: bool) -> Self {
        init_tracing();

        let config = parse_config(config, ConfigFormat::Toml).expect("config parses");
        let resolver = validate_config(&config).expect("config validates");

        let metrics = Arc::new(Metrics::new().expect("metrics registry"));
        let clock = Arc::new(ManualClock::new(CLOCK_START));
        let limiter = Arc::new(
            RateLimiter::with_clock(clock.clone()).with_metrics(Arc::clone(&metrics)),
        );
        let manifest = Arc::new(Mutex::new(PrerenderManifest::new()));

        let state = SecurityState::new(Arc::new(resolver), limiter, Arc::clone(&metrics))
            .expect("security state");
        let state = if prerender {
            state.with_prerender(Arc::clone(&manifest))
        } else {
            state
        };

        Self {
            router: secure(app, state),
            metrics,
            clock,
            manifest,
        }
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");

        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).expect("utf-8 body"),
        }
    }

    /// GET `path`.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(request(Method::GET, path).body(Body::empty()).expect("request"))
            .await
    }

    /// GET `path` as client `ip`.
    pub async fn get_from(&self, path: &str, ip: &str) -> TestResponse {
        self.send(
            request(Method::GET, path)
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }
}

/// Request builder for `method` and `path`.
pub fn request(method: Method, path: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(path)
}

/// Buffered response.
#[derive(Debug)]
pub struct TestResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Body text
    pub body: String,
}

impl TestResponse {
    /// Header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body parsed as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("JSON body")
    }

    /// Directive of the CSP header, e.g. `script-src 'self'`.
    pub fn csp_directive(&self, name: &str) -> Option<String> {
        self.header("content-security-policy")?
            .split(';')
            .map(str::trim)
            .find(|d| d.split_whitespace().next() == Some(name))
            .map(str::to_string)
    }
}

/// Assert response status
pub fn assert_status(response: &TestResponse, expected: u16) {
    assert_eq!(
        response.status.as_u16(),
        expected,
        "unexpected status, body: {}",
        response.body
    );
}
