//! CSP nonces on dynamic pages and hashes on pre-rendered pages

use axum::body::Body;
use axum::http::Method;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use headwall_server::PRERENDER_HEADER;
use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};

use crate::fixtures::{DEFAULT_CONFIG, LAYERED_CONFIG, PRERENDER_SCRIPT, PRERENDER_STYLE};
use crate::helpers::{assert_status, request, TestApp, TestResponse};

fn nonce_of(response: &TestResponse) -> String {
    let script_src = response.csp_directive("script-src").expect("script-src");
    script_src
        .split_whitespace()
        .find_map(|token| token.strip_prefix("'nonce-"))
        .and_then(|token| token.strip_suffix('\''))
        .expect("nonce source")
        .to_string()
}

fn sha256(content: &str) -> String {
    format!("'sha256-{}'", STANDARD.encode(Sha256::digest(content.as_bytes())))
}

async fn prerender(app: &TestApp, path: &str, target: &str) -> TestResponse {
    app.send(
        request(Method::GET, path)
            .header(PRERENDER_HEADER, target)
            .body(Body::empty())
            .expect("request"),
    )
    .await
}

#[tokio::test]
async fn test_nonce_matches_header_and_html() {
    let app = TestApp::from_toml(LAYERED_CONFIG);
    let response = app.get("/").await;

    assert_status(&response, 200);
    let nonce = nonce_of(&response);
    assert_eq!(nonce.len(), 22);
    assert!(response.body.contains(&format!(r#"<script nonce="{nonce}">"#)));
    assert!(!response.body.contains("{{nonce}}"));
}

#[tokio::test]
async fn test_nonce_is_fresh_per_request() {
    let app = TestApp::from_toml(LAYERED_CONFIG);
    let first = nonce_of(&app.get("/").await);
    let second = nonce_of(&app.get("/").await);
    assert_ne!(first, second);
    let rendered = app.metrics.render().expect("metrics render");
    assert!(rendered.contains("headwall_csp_nonces_issued_total 2"));
}

#[tokio::test]
async fn test_extractor_sees_request_nonce() {
    let app = TestApp::from_toml(LAYERED_CONFIG);
    let response = app.get("/page").await;

    let nonce = nonce_of(&response);
    assert_eq!(response.header("x-page-nonce"), Some(nonce.as_str()));
    assert_eq!(response.body, format!("<p>{nonce}</p>"));
}

#[tokio::test]
async fn test_disabled_nonce_strips_placeholders() {
    let app = TestApp::from_toml(DEFAULT_CONFIG);
    let response = app.get("/").await;

    assert!(response.body.contains("<script>boot()</script>"));
    assert!(!response.body.contains("nonce"));
    let csp = response.header("content-security-policy").expect("csp");
    assert!(!csp.contains("nonce"));
}

#[tokio::test]
async fn test_prerender_injects_hashes() {
    let app = TestApp::prerendering(LAYERED_CONFIG);
    let response = prerender(&app, "/static/index", "/static/index.html").await;

    assert_status(&response, 200);
    let script_src = response.csp_directive("script-src").expect("script-src");
    assert_eq!(
        script_src,
        format!("script-src 'self' {} 'sha384-XYZ'", sha256(PRERENDER_SCRIPT))
    );
    let style_src = response.csp_directive("style-src").expect("style-src");
    assert!(style_src.ends_with(&sha256(PRERENDER_STYLE)));

    // No nonce while pre-rendering.
    assert!(!response.header("content-security-policy").unwrap_or_default().contains("nonce"));

    let head_end = response.body.find("</head>").expect("head");
    let meta = response.body.find(r#"<meta http-equiv="Content-Security-Policy""#).expect("meta");
    assert!(meta < head_end);
    assert!(!response.body[meta..head_end].contains("frame-ancestors"));
}

#[tokio::test]
async fn test_prerender_records_manifest() {
    let app = TestApp::prerendering(LAYERED_CONFIG);
    let response = prerender(&app, "/static/index", "/static/index.html").await;

    let manifest = app.manifest.lock();
    let rules = manifest.get("/static/index").expect("manifest entry");
    assert_eq!(
        rules.get("Content-Security-Policy").map(String::as_str),
        response.header("content-security-policy")
    );
    assert_eq!(rules.get("X-Frame-Options").map(String::as_str), Some("SAMEORIGIN"));
}

#[tokio::test]
async fn test_prerender_skips_non_html_targets() {
    let app = TestApp::prerendering(LAYERED_CONFIG);
    let response = prerender(&app, "/static/index", "/static/index.json").await;

    assert!(!response.body.contains("http-equiv"));
    assert!(response.csp_directive("script-src").expect("script-src").contains("'nonce-"));
    assert!(app.manifest.lock().is_empty());
}

#[tokio::test]
async fn test_live_server_ignores_prerender_header() {
    let app = TestApp::from_toml(LAYERED_CONFIG);
    let response = prerender(&app, "/", "/x").await;

    assert_status(&response, 200);
    let nonce = nonce_of(&response);
    let script_src = response.csp_directive("script-src").expect("script-src");
    assert!(!script_src.contains("'sha256-"));
    assert!(response.body.contains(&format!(r#"<script nonce="{nonce}">boot()</script>"#)));
    assert!(!response.body.contains("http-equiv"));
    assert!(app.manifest.lock().is_empty());
}

#[tokio::test]
async fn test_live_server_hides_prerender_header_from_handlers() {
    let app = TestApp::from_toml(LAYERED_CONFIG);
    let response = prerender(&app, "/echo-prerender", "/static/index.html").await;
    assert_eq!(response.body, "absent");
}

#[tokio::test]
async fn test_streamed_html_is_counted_as_skipped() {
    let app = TestApp::from_toml(LAYERED_CONFIG);
    let response = app.get("/streamed").await;

    assert_status(&response, 200);
    // The body could not be rewritten, so the placeholder is still there.
    assert!(response.body.contains(r#"nonce="{{nonce}}""#));
    assert_eq!(app.metrics.rewrite_skipped_count(), 1);

    app.get("/").await;
    assert_eq!(app.metrics.rewrite_skipped_count(), 1);
}
