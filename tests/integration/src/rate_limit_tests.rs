//! Rate limiting integration tests
//!
//! Token bucket behavior, rate limit headers, per-client identities and the
//! return mode.

use headwall_core::ViolationKind;
use headwall_telemetry::RateLimitOutcome;
use pretty_assertions::assert_eq;
use std::time::Duration;

use crate::fixtures::{RATE_LIMIT_CONFIG, SCOPED_RATE_LIMIT_CONFIG};
use crate::helpers::{assert_status, TestApp, CLOCK_START};

/// The first request takes a token too: three tokens admit three requests.
#[tokio::test]
async fn test_bucket_exhausts_then_refills() {
    let app = TestApp::from_toml(RATE_LIMIT_CONFIG);

    for _ in 0..3 {
        assert_status(&app.get_from("/api/data", "203.0.113.7").await, 200);
    }
    let denied = app.get_from("/api/data", "203.0.113.7").await;
    assert_status(&denied, 429);
    assert_eq!(denied.json()["statusCode"], 429);
    assert_eq!(denied.json()["statusMessage"], "Too Many Requests");

    app.clock.advance(Duration::from_millis(1001));
    assert_status(&app.get_from("/api/data", "203.0.113.7").await, 200);

    assert_eq!(app.metrics.rate_limit_count(RateLimitOutcome::Allowed), 4);
    assert_eq!(app.metrics.rate_limit_count(RateLimitOutcome::Denied), 1);
    assert_eq!(app.metrics.violation_count(ViolationKind::RateLimited), 1);
}

#[tokio::test]
async fn test_rate_limit_headers() {
    let app = TestApp::from_toml(RATE_LIMIT_CONFIG);
    let reset = (CLOCK_START + 1000).to_string();

    let first = app.get_from("/api/data", "203.0.113.7").await;
    assert_eq!(first.header("x-ratelimit-limit"), Some("3"));
    assert_eq!(first.header("x-ratelimit-remaining"), Some("2"));
    assert_eq!(first.header("x-ratelimit-reset"), Some(reset.as_str()));

    app.get_from("/api/data", "203.0.113.7").await;
    app.get_from("/api/data", "203.0.113.7").await;
    let denied = app.get_from("/api/data", "203.0.113.7").await;
    assert_eq!(denied.header("x-ratelimit-remaining"), Some("0"));
    // Rejections carry the security headers as well.
    assert_eq!(denied.header("x-frame-options"), Some("SAMEORIGIN"));
}

#[tokio::test]
async fn test_identities_are_independent() {
    let app = TestApp::from_toml(RATE_LIMIT_CONFIG);

    for _ in 0..3 {
        app.get_from("/api/data", "198.51.100.1").await;
    }
    assert_status(&app.get_from("/api/data", "198.51.100.1").await, 429);
    assert_status(&app.get_from("/api/data", "198.51.100.2").await, 200);
    // Left-most forwarded entry is the client.
    assert_status(
        &app.get_from("/api/data", "198.51.100.1, 10.0.0.1").await,
        429,
    );
}

#[tokio::test]
async fn test_return_mode_sends_payload_as_body() {
    let app = TestApp::from_toml(RATE_LIMIT_CONFIG);

    for _ in 0..3 {
        assert_status(&app.get_from("/page", "192.0.2.10").await, 200);
    }
    let returned = app.get_from("/page", "192.0.2.10").await;
    assert_status(&returned, 200);
    assert_eq!(returned.json()["statusCode"], 429);
    assert_eq!(returned.header("x-ratelimit-remaining"), Some("0"));
}

/// Traffic on a route with default limits must not lend tokens to a route
/// with a tighter bucket.
#[tokio::test]
async fn test_route_limit_holds_after_other_routes() {
    let app = TestApp::from_toml(SCOPED_RATE_LIMIT_CONFIG);

    assert_status(&app.get_from("/", "9.9.9.9").await, 200);
    let mut statuses = Vec::new();
    for _ in 0..4 {
        statuses.push(app.get_from("/api/data", "9.9.9.9").await.status.as_u16());
    }
    assert_eq!(statuses, vec![200, 200, 200, 429]);

    // The default bucket is untouched by the API's denials.
    assert_status(&app.get_from("/", "9.9.9.9").await, 200);
}
