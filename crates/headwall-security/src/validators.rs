//! Request gates that need nothing but the request head.

use headwall_core::{
    AllowedMethods, AllowedMethodsConfig, RequestSizeLimiterConfig, Result, Verdict, Violation,
};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method};
use tracing::debug;

/// Check the declared `Content-Length` against the route's size limits.
///
/// `multipart/form-data` bodies use the upload limit. Requests without a
/// parseable length pass; the body limit of the host applies to those.
pub fn check_request_size(config: &RequestSizeLimiterConfig, headers: &HeaderMap) -> Result<Verdict> {
    let Some(length) = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    else {
        return Ok(Verdict::pass());
    };

    let limit = if is_multipart(headers) {
        config.max_upload_file_request_in_bytes
    } else {
        config.max_request_size_in_bytes
    };

    if length > limit {
        debug!(length, limit, "Request body over size limit");
        return Violation::payload_too_large().into_verdict(config.throw_error);
    }
    Ok(Verdict::pass())
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("multipart/form-data"))
}

/// Reject methods outside the route's allowlist with 405 and an `Allow` header.
pub fn check_method(config: &AllowedMethodsConfig, method: &Method) -> Result<Verdict> {
    if config.methods.allows(method.as_str()) {
        return Ok(Verdict::pass());
    }
    let allow = match &config.methods {
        AllowedMethods::Any => String::new(),
        AllowedMethods::Only(methods) => methods.join(", "),
    };
    debug!(method = %method, allow = %allow, "Method not allowed");
    Violation::method_not_allowed()
        .with_headers(vec![("Allow".to_string(), allow)])
        .into_verdict(config.throw_error)
}
