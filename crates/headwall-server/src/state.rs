//! Shared state of the security middleware.

use headwall_config::PolicyResolver;
use headwall_core::{keys, PolicyValue, SecurityError};
use headwall_ratelimit::{driver_name, RateLimiter};
use headwall_security::PrerenderManifest;
use headwall_telemetry::Metrics;
use parking_lot::Mutex;
use std::sync::Arc;

/// Largest response body buffered for HTML rewriting when not configured.
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Everything the middleware needs, cheap to clone.
#[derive(Debug, Clone)]
pub struct SecurityState {
    /// Route policy lookup.
    pub resolver: Arc<PolicyResolver>,
    /// Rate limiter and its stores.
    pub limiter: Arc<RateLimiter>,
    /// Counters.
    pub metrics: Arc<Metrics>,
    /// Largest HTML body rewritten in place.
    pub body_limit: usize,
    /// Whether the prerender request header is honored. Off for live traffic.
    pub prerender: bool,
    /// Collects header rules of pre-rendered pages during a prerender pass.
    pub manifest: Option<Arc<Mutex<PrerenderManifest>>>,
}

impl SecurityState {
    /// Build the state, checking that every configured store driver exists.
    pub fn new(
        resolver: Arc<PolicyResolver>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, SecurityError> {
        let layers = std::iter::once(("global", resolver.global()))
            .chain(resolver.rules().iter().map(|rule| ("route", &rule.security)));

        let problems: Vec<String> = layers
            .filter_map(|(scope, policy)| {
                let name = policy.get(keys::RATE_LIMITER).and_then(driver_name)?;
                (!limiter.supports_driver(name))
                    .then(|| format!("{scope}: unknown rate limiter driver '{name}'"))
            })
            .collect();
        if !problems.is_empty() {
            return Err(SecurityError::Configuration(problems));
        }

        Ok(Self {
            resolver,
            limiter,
            metrics,
            body_limit: DEFAULT_BODY_LIMIT,
            prerender: false,
            manifest: None,
        })
    }

    /// Set the HTML rewrite limit.
    #[must_use]
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// State for a prerender pass: the prerender header is honored and
    /// rendered pages are recorded into `manifest`.
    ///
    /// Never use this for a server facing clients, who could otherwise turn
    /// off nonces and get their inline content hashed into the policy.
    #[must_use]
    pub fn with_prerender(mut self, manifest: Arc<Mutex<PrerenderManifest>>) -> Self {
        self.prerender = true;
        self.manifest = Some(manifest);
        self
    }

    /// The global policy tree.
    #[must_use]
    pub fn global_policy(&self) -> &PolicyValue {
        self.resolver.global()
    }
}
