//! # Headwall Security
//!
//! The pure parts of the pipeline: header compilation, CSP nonces, prerender
//! hash injection and the request validators. Nothing here does I/O.
//!
//! ## Example
//!
//! ```rust,no_run
//! use headwall_core::{EffectivePolicy, PolicyValue, SecurityHeader};
//! use headwall_security::compile;
//!
//! let tree = serde_json::from_str::<PolicyValue>(r#"{"headers": {"xFrameOptions": "DENY"}}"#).unwrap();
//! let policy = EffectivePolicy::from_tree(tree, Default::default()).unwrap();
//! let headers = compile(&policy);
//! assert_eq!(headers.get(SecurityHeader::XFrameOptions), Some("DENY"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod hashes;
pub mod headers;
pub mod nonce;
pub mod validators;

pub use hashes::{
    collect_hashes, inject_hashes, inject_into_document, sha256_source, CollectedHashes,
    HashInjection, HtmlSections, PrerenderManifest, RenderContext, META_UNSUPPORTED_DIRECTIVES,
};
pub use headers::{
    build_hsts_header, compile, compile_csp, compile_csp_except, compile_header,
    compile_permissions_policy, insert_header, CompiledHeaders,
};
pub use nonce::{
    apply_nonce, apply_nonce_to_html, strip_nonce_placeholders, strip_nonce_sources, NonceContext,
    NONCE_PLACEHOLDER, NONCE_SOURCE_PLACEHOLDER,
};
pub use validators::{check_method, check_request_size};
