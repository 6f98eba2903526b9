//! Security header compilation through the middleware

use crate::fixtures::{DEFAULT_CONFIG, LAYERED_CONFIG};
use crate::helpers::{assert_status, TestApp};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_default_headers() {
    let app = TestApp::from_toml(DEFAULT_CONFIG);
    let response = app.get("/api/data").await;

    assert_status(&response, 200);
    assert_eq!(response.header("x-frame-options"), Some("SAMEORIGIN"));
    assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
    assert_eq!(response.header("referrer-policy"), Some("no-referrer"));
    assert_eq!(response.header("cross-origin-embedder-policy"), Some("require-corp"));
    assert_eq!(
        response.header("strict-transport-security"),
        Some("max-age=15552000; includeSubDomains")
    );
    assert_eq!(
        response.header("permissions-policy"),
        Some("camera=(), display-capture=(), fullscreen=(), geolocation=(), microphone=()")
    );
    assert_eq!(
        response.csp_directive("object-src").as_deref(),
        Some("object-src 'none'")
    );
    assert_eq!(
        response.csp_directive("upgrade-insecure-requests").as_deref(),
        Some("upgrade-insecure-requests")
    );
    assert_eq!(response.json()["items"][1], 2);
}

#[tokio::test]
async fn test_route_override_replaces_directive() {
    let app = TestApp::from_toml(LAYERED_CONFIG);

    let api = app.get("/api/data").await;
    assert_eq!(api.csp_directive("script-src").as_deref(), Some("script-src 'none'"));
    // Other directives come from the global policy.
    assert_eq!(api.csp_directive("base-uri").as_deref(), Some("base-uri 'self'"));

    let home = app.get("/").await;
    let script_src = home.csp_directive("script-src").expect("script-src");
    assert!(script_src.starts_with("script-src 'self' 'nonce-"));
}

#[tokio::test]
async fn test_disabled_route_is_untouched() {
    let app = TestApp::from_toml(LAYERED_CONFIG);
    let response = app.get("/powered").await;

    assert_status(&response, 200);
    assert!(response.header("content-security-policy").is_none());
    assert!(response.header("x-frame-options").is_none());
    assert_eq!(response.header("x-powered-by"), Some("Express"));
}

#[tokio::test]
async fn test_hide_powered_by() {
    let app = TestApp::from_toml(DEFAULT_CONFIG);
    let response = app.get("/powered").await;

    assert_status(&response, 200);
    assert!(response.header("x-powered-by").is_none());
    assert_eq!(response.body, "ok");
}

#[tokio::test]
async fn test_legacy_route_headers() {
    let app = TestApp::from_toml(LAYERED_CONFIG);
    let response = app.get("/legacy").await;

    assert_eq!(response.header("cache-control"), Some("no-store"));
    assert!(response.header("x-frame-options").is_none());
    assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
}

#[tokio::test]
async fn test_unmatched_route_still_secured() {
    let app = TestApp::from_toml(DEFAULT_CONFIG);
    let response = app.get("/missing").await;

    assert_status(&response, 404);
    assert_eq!(response.header("x-frame-options"), Some("SAMEORIGIN"));
}
