//! Per-request CSP nonces.
//!
//! Policies reference the nonce through the `{{nonce}}` placeholder, usually as
//! the source token `'nonce-{{nonce}}'`. Rendered pages mark inline elements
//! with `nonce="{{nonce}}"`. Both are filled in once the request's nonce is
//! known, or removed when the route has nonces turned off.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use headwall_core::{DirectiveMap, PolicyValue};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use std::borrow::Cow;
use std::fmt;

/// Placeholder substituted with the nonce value.
pub const NONCE_PLACEHOLDER: &str = "{{nonce}}";

/// Source token carrying the placeholder.
pub const NONCE_SOURCE_PLACEHOLDER: &str = "'nonce-{{nonce}}'";

const NONCE_BYTES: usize = 16;

static NONCE_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s+nonce\s*=\s*(?:"\{\{nonce\}\}"|'\{\{nonce\}\}')"#).unwrap());

/// The nonce of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonceContext {
    value: String,
}

impl NonceContext {
    /// Generate a fresh 128-bit nonce.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            value: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    /// The encoded nonce.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The CSP source token, `'nonce-<value>'`.
    #[must_use]
    pub fn source_token(&self) -> String {
        format!("'nonce-{}'", self.value)
    }
}

impl fmt::Display for NonceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Fill in or strip nonce placeholders in a compiled CSP header.
#[must_use]
pub fn apply_nonce(csp: &str, nonce: Option<&NonceContext>) -> String {
    match nonce {
        Some(nonce) => csp.replace(NONCE_PLACEHOLDER, nonce.as_str()),
        None => strip_nonce_placeholders(csp),
    }
}

/// Remove `'nonce-{{nonce}}'` tokens from a compiled CSP header.
#[must_use]
pub fn strip_nonce_placeholders(csp: &str) -> String {
    if !csp.contains(NONCE_PLACEHOLDER) {
        return csp.to_string();
    }
    csp.split(';')
        .map(|directive| {
            directive
                .split_whitespace()
                .filter(|token| *token != NONCE_SOURCE_PLACEHOLDER)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|directive| !directive.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Remove `'nonce-{{nonce}}'` tokens from a structured CSP.
pub fn strip_nonce_sources(directives: &mut DirectiveMap) {
    for value in directives.values_mut() {
        match value {
            PolicyValue::TokenList(tokens) => tokens.retain(|t| t != NONCE_SOURCE_PLACEHOLDER),
            PolicyValue::Scalar(text) if text.contains(NONCE_PLACEHOLDER) => {
                *text = text
                    .split_whitespace()
                    .filter(|t| *t != NONCE_SOURCE_PLACEHOLDER)
                    .collect::<Vec<_>>()
                    .join(" ");
            }
            _ => {}
        }
    }
}

/// Fill in or remove `nonce="{{nonce}}"` attributes in rendered HTML.
#[must_use]
pub fn apply_nonce_to_html<'a>(html: &'a str, nonce: Option<&NonceContext>) -> Cow<'a, str> {
    if !html.contains(NONCE_PLACEHOLDER) {
        return Cow::Borrowed(html);
    }
    match nonce {
        Some(nonce) => {
            let attribute = format!(r#" nonce="{}""#, nonce.as_str());
            NONCE_ATTRIBUTE.replace_all(html, regex::NoExpand(&attribute))
        }
        None => NONCE_ATTRIBUTE.replace_all(html, ""),
    }
}
