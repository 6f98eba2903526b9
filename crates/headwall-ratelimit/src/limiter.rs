//! Token bucket rate limiter.
//!
//! Each identity owns one record per bucket shape (tokens and interval),
//! holding the remaining tokens and the start of its window. Routes with the
//! same limits share a bucket; a route with its own limits gets its own. Once the window has elapsed the record starts over with a full
//! bucket. Reads and writes go through a [`StorageBackend`] without any
//! atomic update, so concurrent requests from one identity may both spend
//! from the same stale read.

use dashmap::DashMap;
use headwall_core::{RateLimiterConfig, Result, StorageDriverConfig, Verdict, Violation};
use headwall_telemetry::{Metrics, RateLimitOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::store::{build_backend, is_builtin_driver, StorageBackend, StoreError};

/// Remaining tokens header.
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Bucket size header.
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
/// Window end header, in milliseconds since the epoch.
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Persisted state of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    /// Who the record belongs to.
    pub identity: String,
    /// Tokens left in the current window.
    pub tokens_remaining: u32,
    /// Window start, milliseconds since the epoch.
    pub window_start: u64,
}

impl RateLimitRecord {
    /// A full bucket starting at `now`.
    #[must_use]
    pub fn fresh(identity: &str, tokens: u32, now: u64) -> Self {
        Self {
            identity: identity.to_string(),
            tokens_remaining: tokens,
            window_start: now,
        }
    }

    /// End of the window.
    #[must_use]
    pub fn reset_at(&self, interval_ms: u64) -> u64 {
        self.window_start.saturating_add(interval_ms)
    }

    /// Whether the window is over at `now`.
    #[must_use]
    pub fn is_expired(&self, now: u64, interval_ms: u64) -> bool {
        now >= self.reset_at(interval_ms)
    }

    fn encode(&self) -> std::result::Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Store key of the record for `identity` under `config`'s bucket.
#[must_use]
pub fn record_key(identity: &str, config: &RateLimiterConfig) -> String {
    format!(
        "{identity}|{}/{}",
        config.tokens_per_interval,
        config.interval.as_millis()
    )
}

/// Cache key of a built-in store: driver name plus its options.
fn store_key(driver: &StorageDriverConfig) -> String {
    if driver.options.is_empty() {
        return driver.name.clone();
    }
    let options = serde_json::to_string(&driver.options).unwrap_or_default();
    format!("{}{options}", driver.name)
}

/// Rate limiter shared by every request.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    backends: DashMap<String, Arc<dyn StorageBackend>>,
    stores: DashMap<String, Arc<dyn StorageBackend>>,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("clock", &self.clock)
            .field("backends", &self.backends.len())
            .field("stores", &self.stores.len())
            .finish_non_exhaustive()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Limiter on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Limiter on a custom clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            backends: DashMap::new(),
            stores: DashMap::new(),
            metrics: None,
        }
    }

    /// Record decisions in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Serve driver `name` from `backend` instead of a built-in store.
    #[must_use]
    pub fn with_backend(self, name: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    /// Whether a driver name can be served.
    #[must_use]
    pub fn supports_driver(&self, name: &str) -> bool {
        is_builtin_driver(name) || self.backends.contains_key(name)
    }

    /// Store for a driver. Registered backends win; built-in stores are
    /// built on first use, one per distinct set of driver options.
    fn store(&self, driver: &StorageDriverConfig) -> Result<Arc<dyn StorageBackend>> {
        if let Some(backend) = self.backends.get(&driver.name) {
            return Ok(Arc::clone(backend.value()));
        }
        let key = store_key(driver);
        if let Some(store) = self.stores.get(&key) {
            return Ok(Arc::clone(store.value()));
        }
        let built = build_backend(driver)?;
        Ok(Arc::clone(self.stores.entry(key).or_insert(built).value()))
    }

    /// Spend one token for `identity`.
    pub async fn check(&self, identity: &str, config: &RateLimiterConfig) -> Result<Verdict> {
        let store = self.store(&config.driver)?;
        let now = self.clock.now_millis();
        let interval = u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX);
        let key = record_key(identity, config);

        let stored = match store.get(&key).await {
            Ok(bytes) => bytes.and_then(|bytes| match RateLimitRecord::decode(&bytes) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(identity = %identity, error = %err, "Discarding unreadable rate limit record");
                    None
                }
            }),
            Err(err) => return self.store_failure(config, &err),
        };

        let mut record = stored
            .filter(|record| !record.is_expired(now, interval))
            .unwrap_or_else(|| RateLimitRecord::fresh(identity, config.tokens_per_interval, now));
        let reset = record.reset_at(interval);

        if record.tokens_remaining == 0 {
            debug!(identity = %identity, reset, "Rate limit exceeded");
            self.record(RateLimitOutcome::Denied);
            return Violation::rate_limited()
                .with_headers(headers(config, 0, reset))
                .into_verdict(config.throw_error);
        }

        record.tokens_remaining -= 1;
        let persisted = match record.encode() {
            Ok(bytes) => store.set(&key, bytes).await,
            Err(err) => Err(err),
        };
        if let Err(err) = persisted {
            return self.store_failure(config, &err);
        }

        self.record(RateLimitOutcome::Allowed);
        Ok(Verdict::Pass {
            headers: headers(config, record.tokens_remaining, reset),
        })
    }

    fn store_failure(&self, config: &RateLimiterConfig, err: &StoreError) -> Result<Verdict> {
        if let Some(metrics) = &self.metrics {
            metrics.record_store_failure();
        }
        if config.strict {
            warn!(driver = %config.driver.name, error = %err, "Rate limit store failed, denying request");
            return Violation::store_unavailable().into_verdict(config.throw_error);
        }
        warn!(driver = %config.driver.name, error = %err, "Rate limit store failed, allowing request");
        self.record(RateLimitOutcome::Bypassed);
        Ok(Verdict::pass())
    }

    fn record(&self, outcome: RateLimitOutcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rate_limit(outcome);
        }
    }
}

fn headers(config: &RateLimiterConfig, remaining: u32, reset: u64) -> Vec<(String, String)> {
    if !config.emit_headers {
        return Vec::new();
    }
    vec![
        (HEADER_REMAINING.to_string(), remaining.to_string()),
        (HEADER_LIMIT.to_string(), config.tokens_per_interval.to_string()),
        (HEADER_RESET.to_string(), reset.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemoryBackend, StoreResult};
    use async_trait::async_trait;
    use headwall_core::{PolicyValue, SecurityError, ViolationKind};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config(tokens: u32, interval_ms: u64) -> RateLimiterConfig {
        RateLimiterConfig {
            tokens_per_interval: tokens,
            interval: Duration::from_millis(interval_ms),
            ..RateLimiterConfig::default()
        }
    }

    fn allowed(result: &Result<Verdict>) -> bool {
        matches!(result, Ok(Verdict::Pass { .. }))
    }

    #[derive(Debug)]
    struct FailingBackend;

    #[async_trait]
    impl StorageBackend for FailingBackend {
        async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn set(&self, _key: &str, _value: Vec<u8>) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn health_check(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        fn name(&self) -> &'static str {
            "failing"
        }
        fn is_distributed(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_three_tokens_then_deny_then_reset() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let limiter = RateLimiter::with_clock(clock.clone());
        let config = config(3, 1000);

        let mut decisions = Vec::new();
        for _ in 0..4 {
            decisions.push(allowed(&limiter.check("1.2.3.4", &config).await));
        }
        assert_eq!(decisions, vec![true, true, true, false]);

        clock.advance(Duration::from_millis(1000));
        for _ in 0..3 {
            assert!(allowed(&limiter.check("1.2.3.4", &config).await));
        }
        assert!(!allowed(&limiter.check("1.2.3.4", &config).await));
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new(0)));
        let config = config(1, 1000);
        assert!(allowed(&limiter.check("a", &config).await));
        assert!(!allowed(&limiter.check("a", &config).await));
        assert!(allowed(&limiter.check("b", &config).await));
    }

    #[tokio::test]
    async fn test_concurrent_identities() {
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new(0)));
        let config = config(1, 1000);
        let identities: Vec<String> = (0..32).map(|i| format!("10.0.0.{i}")).collect();

        let results = futures::future::join_all(
            identities.iter().map(|id| limiter.check(id, &config)),
        )
        .await;
        assert!(results.iter().all(allowed));
        assert_eq!(limiter.store(&config.driver).unwrap().name(), "lruCache");
    }

    #[tokio::test]
    async fn test_route_limits_get_their_own_bucket() {
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new(0)));
        let wide = config(150, 300_000);
        let narrow = config(3, 1000);

        assert!(allowed(&limiter.check("9.9.9.9", &wide).await));
        let mut decisions = Vec::new();
        for _ in 0..4 {
            decisions.push(allowed(&limiter.check("9.9.9.9", &narrow).await));
        }
        assert_eq!(decisions, vec![true, true, true, false]);
        assert!(allowed(&limiter.check("9.9.9.9", &wide).await));
    }

    #[tokio::test]
    async fn test_stores_split_by_driver_options() {
        let limiter = RateLimiter::new();
        let mut small = config(5, 1000);
        small.driver.options.insert("max".to_string(), PolicyValue::from(1_u64));
        let mut large = config(5, 1000);
        large.driver.options.insert("max".to_string(), PolicyValue::from(500_u64));

        let a = limiter.store(&small.driver).unwrap();
        let b = limiter.store(&large.driver).unwrap();
        let c = limiter.store(&small.driver).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        assert!(!Arc::ptr_eq(&a, &limiter.store(&config(5, 1000).driver).unwrap()));
    }

    #[tokio::test]
    async fn test_headers_reflect_state() {
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new(5000)));
        let config = RateLimiterConfig {
            emit_headers: true,
            throw_error: false,
            ..config(2, 1000)
        };

        let first = limiter.check("a", &config).await.unwrap();
        assert_eq!(
            first,
            Verdict::Pass {
                headers: vec![
                    (HEADER_REMAINING.to_string(), "1".to_string()),
                    (HEADER_LIMIT.to_string(), "2".to_string()),
                    (HEADER_RESET.to_string(), "6000".to_string()),
                ]
            }
        );

        limiter.check("a", &config).await.unwrap();
        let Verdict::Reject(violation) = limiter.check("a", &config).await.unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(violation.status, 429);
        assert_eq!(violation.headers[0], (HEADER_REMAINING.to_string(), "0".to_string()));
    }

    #[tokio::test]
    async fn test_deny_raises_by_default() {
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new(0)));
        let config = config(0, 1000);
        let err = limiter.check("a", &config).await.unwrap_err();
        assert_eq!(err.status_code(), 429);
    }

    #[tokio::test]
    async fn test_store_failure_lenient_and_strict() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let limiter = RateLimiter::new()
            .with_backend("failing", Arc::new(FailingBackend))
            .with_metrics(metrics.clone());
        let mut config = config(10, 1000);
        config.driver.name = "failing".to_string();

        assert_eq!(limiter.check("a", &config).await.unwrap(), Verdict::pass());
        assert_eq!(metrics.rate_limit_count(RateLimitOutcome::Bypassed), 1);

        config.strict = true;
        let err = limiter.check("a", &config).await.unwrap_err();
        let SecurityError::PolicyViolation(violation) = err else {
            panic!("expected violation");
        };
        assert_eq!(violation.kind, ViolationKind::StoreUnavailable);
        assert_eq!(violation.status, 503);
        assert_eq!(metrics.store_failure_count(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_record_starts_fresh() {
        let store = Arc::new(MemoryBackend::unbounded());
        let mut config = config(5, 1000);
        config.driver.name = "memory".to_string();
        let key = record_key("a", &config);
        store.set(&key, b"not json".to_vec()).await.unwrap();
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new(0)))
            .with_backend("memory", store.clone());

        assert!(allowed(&limiter.check("a", &config).await));
        let record: RateLimitRecord =
            serde_json::from_slice(&store.get(&key).await.unwrap().unwrap()).unwrap();
        assert_eq!(record.tokens_remaining, 4);
    }

    #[tokio::test]
    async fn test_unknown_driver_is_configuration_error() {
        let limiter = RateLimiter::new();
        let mut config = config(5, 1000);
        config.driver.name = "redis".to_string();
        assert!(!limiter.supports_driver("redis"));
        assert!(matches!(
            limiter.check("a", &config).await,
            Err(SecurityError::Configuration(_))
        ));
    }
}
