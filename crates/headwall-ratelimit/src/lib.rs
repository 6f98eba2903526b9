//! # Headwall Rate Limit
//!
//! Token bucket rate limiting keyed by client identity.
//!
//! - [`RateLimiter`]: spends tokens and builds `x-ratelimit-*` headers
//! - [`StorageBackend`]: async bytes store; [`MemoryBackend`] is the default
//! - [`client_identity`]: derives the key from `X-Forwarded-For` or the peer
//! - [`Clock`]: injectable time source, [`ManualClock`] for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod identity;
pub mod limiter;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{client_identity, normalize, UNKNOWN_IDENTITY};
pub use limiter::{
    record_key, RateLimitRecord, RateLimiter, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET,
};
pub use store::{
    build_backend, driver_name, is_builtin_driver, MemoryBackend, StorageBackend, StoreError,
    StoreResult, DEFAULT_LRU_CAPACITY,
};
