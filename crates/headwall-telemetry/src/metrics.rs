//! Prometheus metrics.

use headwall_core::ViolationKind;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Metric creation or registration failed
    #[error("Metrics registration failed: {0}")]
    Registration(String),
    /// Text encoding failed
    #[error("Metrics encoding failed: {0}")]
    Encoding(String),
}

/// Rate limiter decision labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    /// Token consumed.
    Allowed,
    /// Bucket empty.
    Denied,
    /// Store failed, request let through.
    Bypassed,
}

impl RateLimitOutcome {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Bypassed => "bypassed",
        }
    }
}

/// Counters exported at `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    violations: IntCounterVec,
    rate_limit_decisions: IntCounterVec,
    store_failures: IntCounter,
    hashes_injected: IntCounter,
    nonces_issued: IntCounter,
    html_rewrites_skipped: IntCounter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("store_failures", &self.store_failures.get())
            .field("hashes_injected", &self.hashes_injected.get())
            .field("nonces_issued", &self.nonces_issued.get())
            .field("html_rewrites_skipped", &self.html_rewrites_skipped.get())
            .finish_non_exhaustive()
    }
}

fn registration(e: prometheus::Error) -> MetricsError {
    MetricsError::Registration(e.to_string())
}

impl Metrics {
    /// Create the counters in a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let violations = IntCounterVec::new(
            Opts::new("headwall_policy_violations_total", "Requests rejected by a policy gate"),
            &["kind"],
        )
        .map_err(registration)?;

        let rate_limit_decisions = IntCounterVec::new(
            Opts::new("headwall_rate_limit_decisions_total", "Rate limiter decisions"),
            &["outcome"],
        )
        .map_err(registration)?;

        let store_failures = IntCounter::with_opts(Opts::new(
            "headwall_rate_limit_store_failures_total",
            "Rate limiter store read or write failures",
        ))
        .map_err(registration)?;

        let hashes_injected = IntCounter::with_opts(Opts::new(
            "headwall_csp_hashes_injected_total",
            "CSP hash tokens added to pre-rendered documents",
        ))
        .map_err(registration)?;

        let nonces_issued = IntCounter::with_opts(Opts::new(
            "headwall_csp_nonces_issued_total",
            "Per-request CSP nonces generated",
        ))
        .map_err(registration)?;

        let html_rewrites_skipped = IntCounter::with_opts(Opts::new(
            "headwall_html_rewrites_skipped_total",
            "HTML responses passed through unmodified: length unknown or over the rewrite limit",
        ))
        .map_err(registration)?;

        registry.register(Box::new(violations.clone())).map_err(registration)?;
        registry
            .register(Box::new(rate_limit_decisions.clone()))
            .map_err(registration)?;
        registry.register(Box::new(store_failures.clone())).map_err(registration)?;
        registry.register(Box::new(hashes_injected.clone())).map_err(registration)?;
        registry.register(Box::new(nonces_issued.clone())).map_err(registration)?;
        registry
            .register(Box::new(html_rewrites_skipped.clone()))
            .map_err(registration)?;

        Ok(Self {
            registry,
            violations,
            rate_limit_decisions,
            store_failures,
            hashes_injected,
            nonces_issued,
            html_rewrites_skipped,
        })
    }

    /// Count a rejected request.
    pub fn record_violation(&self, kind: ViolationKind) {
        self.violations.with_label_values(&[kind.as_str()]).inc();
    }

    /// Count a rate limiter decision.
    pub fn record_rate_limit(&self, outcome: RateLimitOutcome) {
        self.rate_limit_decisions
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Count a store failure.
    pub fn record_store_failure(&self) {
        self.store_failures.inc();
    }

    /// Count hash tokens added to a document.
    pub fn record_hashes(&self, count: usize) {
        self.hashes_injected.inc_by(count as u64);
    }

    /// Count a generated nonce.
    pub fn record_nonce(&self) {
        self.nonces_issued.inc();
    }

    /// Count an HTML response that could not be rewritten.
    pub fn record_rewrite_skipped(&self) {
        self.html_rewrites_skipped.inc();
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }

    /// Current count for a violation kind.
    #[must_use]
    pub fn violation_count(&self, kind: ViolationKind) -> u64 {
        self.violations.with_label_values(&[kind.as_str()]).get()
    }

    /// Current count for a rate limiter outcome.
    #[must_use]
    pub fn rate_limit_count(&self, outcome: RateLimitOutcome) -> u64 {
        self.rate_limit_decisions
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Current store failure count.
    #[must_use]
    pub fn store_failure_count(&self) -> u64 {
        self.store_failures.get()
    }

    /// Current count of HTML responses left unmodified.
    #[must_use]
    pub fn rewrite_skipped_count(&self) -> u64 {
        self.html_rewrites_skipped.get()
    }
}
