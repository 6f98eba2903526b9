//! Extractors for handlers running behind the security middleware.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use headwall_security::NonceContext;

/// The request's CSP nonce, if its route enables nonces.
///
/// ```ignore
/// async fn page(CspNonce(nonce): CspNonce) -> Html<String> {
///     let attr = nonce.map(|n| format!(r#" nonce="{n}""#)).unwrap_or_default();
///     Html(format!("<script{attr}>boot()</script>"))
/// }
/// ```
///
/// Handlers may also emit `nonce="{{nonce}}"` and let the middleware fill it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspNonce(pub Option<NonceContext>);

impl CspNonce {
    /// Nonce value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.0.as_ref().map(NonceContext::as_str)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CspNonce
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<NonceContext>().cloned()))
    }
}
