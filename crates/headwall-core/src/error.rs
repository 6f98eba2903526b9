//! Security error types.

use serde::Serialize;
use std::fmt;

/// Result type for security operations.
pub type Result<T> = std::result::Result<T, SecurityError>;

/// Which gate produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Rate limiter ran out of tokens.
    RateLimited,
    /// Declared request body is over the size limit.
    PayloadTooLarge,
    /// Request method is not in the allowlist.
    MethodNotAllowed,
    /// Rate limiter store failed and the limiter is strict.
    StoreUnavailable,
}

impl ViolationKind {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::PayloadTooLarge => "payload_too_large",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected request: status, message and any headers to send along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Gate that rejected the request.
    pub kind: ViolationKind,
    /// HTTP status code.
    pub status: u16,
    /// Human readable status message.
    pub message: String,
    /// Extra response headers (rate limit counters, `Allow`, ...).
    pub headers: Vec<(String, String)>,
}

impl Violation {
    /// 429 Too Many Requests.
    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(ViolationKind::RateLimited, 429, "Too Many Requests")
    }

    /// 413 Payload Too Large.
    #[must_use]
    pub fn payload_too_large() -> Self {
        Self::new(ViolationKind::PayloadTooLarge, 413, "Payload Too Large")
    }

    /// 405 Method Not Allowed.
    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self::new(ViolationKind::MethodNotAllowed, 405, "Method Not Allowed")
    }

    /// 503 when a strict rate limiter cannot reach its store.
    #[must_use]
    pub fn store_unavailable() -> Self {
        Self::new(ViolationKind::StoreUnavailable, 503, "Service Unavailable")
    }

    fn new(kind: ViolationKind, status: u16, message: &str) -> Self {
        Self {
            kind,
            status,
            message: message.to_string(),
            headers: Vec::new(),
        }
    }

    /// Attach response headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// JSON body sent to the client.
    #[must_use]
    pub fn payload(&self) -> ViolationPayload<'_> {
        ViolationPayload {
            status_code: self.status,
            status_message: &self.message,
        }
    }

    /// Raise (`throw_error`) or hand back as a rejection the caller relays.
    pub fn into_verdict(self, throw_error: bool) -> Result<Verdict> {
        if throw_error {
            Err(SecurityError::PolicyViolation(self))
        } else {
            Ok(Verdict::Reject(self))
        }
    }
}

/// Serialized form of a [`Violation`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationPayload<'a> {
    /// HTTP status code.
    pub status_code: u16,
    /// Status message.
    pub status_message: &'a str,
}

/// Outcome of a request gate that did not raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Continue; attach these headers to the eventual response.
    Pass {
        /// Headers produced by the gate.
        headers: Vec<(String, String)>,
    },
    /// Stop and send the violation payload as a normal response body.
    Reject(Violation),
}

impl Verdict {
    /// Pass without headers.
    #[must_use]
    pub fn pass() -> Self {
        Self::Pass {
            headers: Vec::new(),
        }
    }
}

/// Security error type.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// Invalid configuration. Fatal at startup.
    #[error("Configuration error: {}", .0.join("; "))]
    Configuration(Vec<String>),

    /// A request gate rejected the request.
    #[error("Policy violation: {} {}", .0.status, .0.message)]
    PolicyViolation(Violation),

    /// Hash injection was asked to run outside a prerender pass.
    #[error("Rendering precondition not met: {0}")]
    RenderingPrecondition(String),

    /// The rate limiter store failed.
    #[error("Rate limit store unavailable: {0}")]
    StoreUnavailable(String),
}

impl SecurityError {
    /// Create a configuration error with a single problem.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(vec![msg.into()])
    }

    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Check if error is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::PolicyViolation(v) if (400..500).contains(&v.status))
    }

    /// Get HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::PolicyViolation(v) => v.status,
            Self::StoreUnavailable(_) => 503,
            Self::Configuration(_) | Self::RenderingPrecondition(_) => 500,
        }
    }
}
