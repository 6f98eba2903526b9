//! Test fixtures: the application under test and its configurations

use axum::{
    body::Body,
    http::{header, HeaderMap},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use headwall_server::{CspNonce, PRERENDER_HEADER};
use serde_json::json;

/// Inline script of the pre-rendered page.
pub const PRERENDER_SCRIPT: &str = "console.log(\"hello\")";

/// Inline style of the pre-rendered page.
pub const PRERENDER_STYLE: &str = "body { margin: 0 }";

/// Routes of a small site: HTML pages, a JSON API and a static page.
pub fn app_routes() -> Router {
    Router::new()
        .route("/", get(home))
        .route("/page", get(page))
        .route("/api/data", get(api_data).post(api_data))
        .route("/static/index", get(static_index))
        .route("/powered", get(powered))
        .route("/legacy", get(home))
        .route("/streamed", get(streamed))
        .route("/echo-prerender", get(echo_prerender))
}

async fn home() -> Html<&'static str> {
    Html(r#"<html><head></head><body><script nonce="{{nonce}}">boot()</script></body></html>"#)
}

async fn page(nonce: CspNonce) -> impl IntoResponse {
    let value = nonce.value().unwrap_or_default().to_string();
    ([("x-page-nonce", value.clone())], Html(format!("<p>{value}</p>")))
}

async fn api_data() -> Json<serde_json::Value> {
    Json(json!({ "items": [1, 2, 3] }))
}

async fn static_index() -> Html<String> {
    Html(format!(
        concat!(
            "<html><head><title>Static</title></head><body>",
            "<script>{}</script>",
            "<style>{}</style>",
            r#"<script src="/app.js" integrity="sha384-XYZ"></script>"#,
            "</body></html>"
        ),
        PRERENDER_SCRIPT, PRERENDER_STYLE
    ))
}

/// HTML streamed in chunks, with no declared length.
async fn streamed() -> impl IntoResponse {
    let chunks = [
        "<html><head></head><body>",
        r#"<script nonce="{{nonce}}">boot()</script>"#,
        "</body></html>",
    ]
    .map(|chunk| Ok::<_, std::io::Error>(chunk.to_string()));
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        Body::from_stream(futures::stream::iter(chunks)),
    )
}

async fn echo_prerender(headers: HeaderMap) -> &'static str {
    if headers.contains_key(PRERENDER_HEADER) {
        "present"
    } else {
        "absent"
    }
}

async fn powered() -> impl IntoResponse {
    ([(header::HeaderName::from_static("x-powered-by"), "Express")], "ok")
}

/// Built-in defaults only.
pub const DEFAULT_CONFIG: &str = "";

/// Nonces on, with per-route overrides.
pub const LAYERED_CONFIG: &str = r#"
[security]
nonce = true

[security.headers.contentSecurityPolicy]
"script-src" = ["'self'", "'nonce-{{nonce}}'"]

[[routes]]
pattern = "/api/**"

[routes.security.headers.contentSecurityPolicy]
"script-src" = ["'none'"]

[[routes]]
pattern = "/powered"

[routes.security]
enabled = false

[[routes]]
pattern = "/legacy"

[routes.headers]
"Cache-Control" = "no-store"
"X-Frame-Options" = false
"#;

/// Small token bucket with rate limit headers.
pub const RATE_LIMIT_CONFIG: &str = r#"
[security.rateLimiter]
tokensPerInterval = 3
interval = 1000
headers = true

[[routes]]
pattern = "/page"

[routes.security.rateLimiter]
throwError = false
"#;

/// Tight size limits and a GET-only API.
pub const GATE_CONFIG: &str = r#"
[security.requestSizeLimiter]
maxRequestSizeInBytes = 100
maxUploadFileRequestInBytes = 1000

[[routes]]
pattern = "/api/**"

[routes.security.allowedMethodsRestricter]
methods = ["GET"]
"#;

/// Default limits everywhere except a 3-token API.
pub const SCOPED_RATE_LIMIT_CONFIG: &str = r#"
[[routes]]
pattern = "/api/**"

[routes.security.rateLimiter]
tokensPerInterval = 3
interval = 1000
"#;
