//! The per-request security pipeline.
//!
//! 1. Resolve the route policy; a disabled policy passes the request through.
//! 2. Run the gates: allowed methods, request size, rate limiter.
//! 3. Attach a fresh nonce to the request when the route enables nonces. The
//!    prerender header only counts on a prerender pass, see
//!    [`SecurityState::with_prerender`].
//! 4. Run the inner service.
//! 5. Write host headers, then compiled security headers over them.
//! 6. Rewrite HTML bodies: prerender hash injection, then nonce attributes.

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use headwall_core::{EffectivePolicy, Result, SecurityError, SecurityHeader, Verdict, Violation};
use headwall_ratelimit::client_identity;
use headwall_security::{
    apply_nonce, apply_nonce_to_html, check_method, check_request_size, compile,
    inject_into_document, insert_header, CompiledHeaders, NonceContext, RenderContext,
};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

use crate::state::SecurityState;

/// Request header carrying the output path of a pre-render pass.
pub const PRERENDER_HEADER: &str = "x-headwall-prerender";

/// Why the gates stopped a request.
enum GateFailure {
    /// Return mode: the payload goes back as a normal body.
    Returned(Violation),
    /// Throw mode: the violation's status is the response status.
    Raised(Violation),
    /// Anything else, e.g. an unknown store driver.
    Failed(SecurityError),
}

/// Axum middleware applying the resolved route policy.
pub async fn security_middleware(
    State(state): State<SecurityState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let policy = match state.resolver.resolve(&path) {
        Ok(policy) => policy,
        Err(err) => {
            error!(path = %path, error = %err, "Policy resolution failed");
            return error_response(&err);
        }
    };
    if !policy.enabled {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let method = request.method().clone();
    let gate_headers = match run_gates(&state, &policy, &method, request.headers(), peer).await {
        Ok(headers) => headers,
        Err(GateFailure::Returned(violation)) => {
            return violation_response(&state, &policy, &path, &violation, StatusCode::OK)
        }
        Err(GateFailure::Raised(violation)) => {
            let status = StatusCode::from_u16(violation.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return violation_response(&state, &policy, &path, &violation, status);
        }
        Err(GateFailure::Failed(err)) => {
            error!(path = %path, error = %err, "Security gate failed");
            return error_response(&err);
        }
    };

    let context = render_context(&state, &mut request, &path);

    let nonce = (policy.nonce && !context.is_prerendering()).then(NonceContext::generate);
    if let Some(nonce) = &nonce {
        state.metrics.record_nonce();
        request.extensions_mut().insert(nonce.clone());
    }

    let mut response = next.run(request).await;

    for (name, value) in &gate_headers {
        insert_header(response.headers_mut(), name, value);
    }
    let compiled = apply_policy_headers(response.headers_mut(), &policy, nonce.as_ref());

    if is_html(response.headers()) {
        response = rewrite_html(&state, &policy, compiled, nonce.as_ref(), &context, &path, response).await;
    }
    response
}

/// Prerender context from the request header, honored only on a prerender
/// pass. Live traffic has the header removed before the inner service runs.
fn render_context(state: &SecurityState, request: &mut Request, path: &str) -> RenderContext {
    if !state.prerender {
        if request.headers_mut().remove(PRERENDER_HEADER).is_some() {
            debug!(path = %path, "Ignoring prerender header outside a prerender pass");
        }
        return RenderContext::dynamic();
    }
    request
        .headers()
        .get(PRERENDER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(RenderContext::dynamic, RenderContext::prerender)
}

async fn run_gates(
    state: &SecurityState,
    policy: &EffectivePolicy,
    method: &Method,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> std::result::Result<Vec<(String, String)>, GateFailure> {
    let mut collected = Vec::new();
    if let Some(config) = &policy.allowed_methods_restricter {
        collect(check_method(config, method), &mut collected)?;
    }
    if let Some(config) = &policy.request_size_limiter {
        collect(check_request_size(config, headers), &mut collected)?;
    }
    if let Some(config) = &policy.rate_limiter {
        let identity = client_identity(headers, peer);
        collect(state.limiter.check(&identity, config).await, &mut collected)?;
    }
    Ok(collected)
}

fn collect(
    result: Result<Verdict>,
    collected: &mut Vec<(String, String)>,
) -> std::result::Result<(), GateFailure> {
    match result {
        Ok(Verdict::Pass { headers }) => {
            collected.extend(headers);
            Ok(())
        }
        Ok(Verdict::Reject(violation)) => Err(GateFailure::Returned(violation)),
        Err(SecurityError::PolicyViolation(violation)) => Err(GateFailure::Raised(violation)),
        Err(err) => Err(GateFailure::Failed(err)),
    }
}

/// Host headers first, then security headers over them.
fn apply_policy_headers(
    headers: &mut HeaderMap,
    policy: &EffectivePolicy,
    nonce: Option<&NonceContext>,
) -> CompiledHeaders {
    for (name, value) in &policy.standard_headers {
        insert_header(headers, name, value);
    }

    let mut compiled = compile(policy);
    if let Some(csp) = compiled
        .get(SecurityHeader::ContentSecurityPolicy)
        .map(|csp| apply_nonce(csp, nonce))
    {
        compiled.set(SecurityHeader::ContentSecurityPolicy, csp);
    }
    compiled.apply_to(headers);

    if policy.hide_powered_by {
        headers.remove("x-powered-by");
    }
    compiled
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok())
        .is_some_and(|m| m.type_() == mime::TEXT && m.subtype() == mime::HTML)
}

fn body_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| response.body().size_hint().exact())
}

async fn rewrite_html(
    state: &SecurityState,
    policy: &EffectivePolicy,
    mut compiled: CompiledHeaders,
    nonce: Option<&NonceContext>,
    context: &RenderContext,
    path: &str,
    response: Response,
) -> Response {
    let fits = body_length(&response)
        .is_some_and(|len| usize::try_from(len).is_ok_and(|len| len <= state.body_limit));
    if !fits {
        state.metrics.record_rewrite_skipped();
        if nonce.is_some() {
            warn!(
                path = %path,
                "HTML body not rewritten (length unknown or over the rewrite limit); nonce placeholders stay unfilled"
            );
        } else {
            debug!(path = %path, "HTML body left as is: length unknown or over the rewrite limit");
        }
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(path = %path, error = %err, "Failed to buffer HTML body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let mut html = match String::from_utf8(Vec::from(bytes)) {
        Ok(html) => html,
        Err(err) => return Response::from_parts(parts, Body::from(err.into_bytes())),
    };

    if context.is_prerendering() {
        if let (Some(ssg), Some(csp)) = (
            policy.ssg.as_ref(),
            policy.header(SecurityHeader::ContentSecurityPolicy),
        ) {
            match inject_into_document(&html, csp, ssg, context) {
                Ok((document, injection)) => {
                    html = document;
                    state.metrics.record_hashes(injection.hashes.len());
                    insert_header(
                        &mut parts.headers,
                        SecurityHeader::ContentSecurityPolicy.header_name(),
                        &injection.header_value,
                    );
                    compiled.set(SecurityHeader::ContentSecurityPolicy, injection.header_value);
                }
                Err(err) => debug!(path = %path, error = %err, "Skipping CSP hash injection"),
            }
        }
        if let Some(manifest) = &state.manifest {
            manifest.lock().record(path, &compiled);
        }
    }

    let html = apply_nonce_to_html(&html, nonce).into_owned();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

fn violation_response(
    state: &SecurityState,
    policy: &EffectivePolicy,
    path: &str,
    violation: &Violation,
    status: StatusCode,
) -> Response {
    info!(
        path = %path,
        kind = %violation.kind,
        status = violation.status,
        "Request rejected"
    );
    state.metrics.record_violation(violation.kind);

    let mut response = (status, Json(violation.payload())).into_response();
    for (name, value) in &violation.headers {
        insert_header(response.headers_mut(), name, value);
    }
    apply_policy_headers(response.headers_mut(), policy, None);
    response
}

/// JSON error response for failures that are not policy violations.
pub fn error_response(error: &SecurityError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "statusCode": status.as_u16(),
        "statusMessage": status.canonical_reason().unwrap_or("Error"),
    });
    (status, Json(body)).into_response()
}
