//! # Headwall Core
//!
//! Shared vocabulary for the Headwall security policy engine.
//!
//! - [`PolicyValue`]: the tagged union every policy field is expressed in
//! - [`EffectivePolicy`]: typed view of a resolved route policy
//! - [`SecurityHeader`]: the canonical header name table
//! - [`SecurityError`]: the error taxonomy shared by every crate

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod header;
pub mod policy;
pub mod value;

pub use error::{Result, SecurityError, Verdict, Violation, ViolationKind, ViolationPayload};
pub use header::{HeaderKind, SecurityHeader};
pub use policy::{
    keys, AllowedMethods, AllowedMethodsConfig, EffectivePolicy, RateLimiterConfig,
    RequestSizeLimiterConfig, SsgConfig, StorageDriverConfig,
};
pub use value::{DirectiveMap, PolicyValue};
