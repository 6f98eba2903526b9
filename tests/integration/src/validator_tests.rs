//! Request size and allowed method gates

use axum::body::Body;
use axum::http::{header, Method};
use headwall_core::ViolationKind;
use pretty_assertions::assert_eq;

use crate::fixtures::{DEFAULT_CONFIG, GATE_CONFIG};
use crate::helpers::{assert_status, request, TestApp, TestResponse};

async fn send_body(app: &TestApp, method: Method, path: &str, len: usize, content_type: &str) -> TestResponse {
    app.send(
        request(method, path)
            .header(header::CONTENT_LENGTH, len.to_string())
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(vec![b'a'; len]))
            .expect("request"),
    )
    .await
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let app = TestApp::from_toml(GATE_CONFIG);
    let response = send_body(&app, Method::GET, "/api/data", 500, "application/json").await;

    assert_status(&response, 413);
    assert_eq!(response.json()["statusMessage"], "Payload Too Large");
    assert_eq!(app.metrics.violation_count(ViolationKind::PayloadTooLarge), 1);
}

#[tokio::test]
async fn test_body_within_limit_passes() {
    let app = TestApp::from_toml(GATE_CONFIG);
    let response = send_body(&app, Method::GET, "/api/data", 100, "application/json").await;
    assert_status(&response, 200);
}

#[tokio::test]
async fn test_multipart_uses_upload_limit() {
    let app = TestApp::from_toml(GATE_CONFIG);

    let upload = send_body(&app, Method::GET, "/api/data", 500, "multipart/form-data; boundary=x").await;
    assert_status(&upload, 200);

    let too_big = send_body(&app, Method::GET, "/api/data", 1500, "multipart/form-data; boundary=x").await;
    assert_status(&too_big, 413);
}

#[tokio::test]
async fn test_method_not_allowed() {
    let app = TestApp::from_toml(GATE_CONFIG);
    let response = send_body(&app, Method::POST, "/api/data", 2, "application/json").await;

    assert_status(&response, 405);
    assert_eq!(response.header("allow"), Some("GET"));
    assert_eq!(response.json()["statusCode"], 405);
    assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
}

#[tokio::test]
async fn test_method_gate_runs_before_size_gate() {
    let app = TestApp::from_toml(GATE_CONFIG);
    let response = send_body(&app, Method::POST, "/api/data", 5000, "application/json").await;
    assert_status(&response, 405);
}

#[tokio::test]
async fn test_any_method_allowed_by_default() {
    let app = TestApp::from_toml(DEFAULT_CONFIG);
    let response = send_body(&app, Method::POST, "/api/data", 2, "application/json").await;
    assert_status(&response, 200);
}
