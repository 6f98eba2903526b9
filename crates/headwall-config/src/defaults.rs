//! Built-in policy applied beneath user configuration.

use headwall_core::{keys, PolicyValue};

/// The default security policy tree.
#[must_use]
pub fn default_policy() -> PolicyValue {
    PolicyValue::map([
        (keys::HEADERS, default_headers()),
        (
            keys::REQUEST_SIZE_LIMITER,
            PolicyValue::map([
                ("maxRequestSizeInBytes", PolicyValue::from(2_000_000_u64)),
                ("maxUploadFileRequestInBytes", PolicyValue::from(8_000_000_u64)),
                ("throwError", PolicyValue::Enabled),
            ]),
        ),
        (
            keys::RATE_LIMITER,
            PolicyValue::map([
                ("tokensPerInterval", PolicyValue::from(150_u64)),
                ("interval", PolicyValue::from(300_000_u64)),
                ("headers", PolicyValue::Disabled),
                ("driver", PolicyValue::map([("name", PolicyValue::scalar("lruCache"))])),
                ("throwError", PolicyValue::Enabled),
            ]),
        ),
        (
            keys::ALLOWED_METHODS_RESTRICTER,
            PolicyValue::map([
                ("methods", PolicyValue::scalar("*")),
                ("throwError", PolicyValue::Enabled),
            ]),
        ),
        (keys::HIDE_POWERED_BY, PolicyValue::Enabled),
        ("basicAuth", PolicyValue::Disabled),
        ("csrf", PolicyValue::Disabled),
        (keys::NONCE, PolicyValue::Disabled),
        (keys::ENABLED, PolicyValue::Enabled),
        (
            keys::SSG,
            PolicyValue::map([("hashScripts", PolicyValue::Enabled)]),
        ),
    ])
}

fn default_headers() -> PolicyValue {
    PolicyValue::map([
        ("crossOriginResourcePolicy", PolicyValue::scalar("same-origin")),
        ("crossOriginOpenerPolicy", PolicyValue::scalar("same-origin")),
        ("crossOriginEmbedderPolicy", PolicyValue::scalar("require-corp")),
        ("contentSecurityPolicy", default_csp()),
        ("originAgentCluster", PolicyValue::scalar("?1")),
        ("referrerPolicy", PolicyValue::scalar("no-referrer")),
        (
            "strictTransportSecurity",
            PolicyValue::map([
                ("maxAge", PolicyValue::from(15_552_000_u64)),
                ("includeSubdomains", PolicyValue::Enabled),
            ]),
        ),
        ("xContentTypeOptions", PolicyValue::scalar("nosniff")),
        ("xDNSPrefetchControl", PolicyValue::scalar("off")),
        ("xDownloadOptions", PolicyValue::scalar("noopen")),
        ("xFrameOptions", PolicyValue::scalar("SAMEORIGIN")),
        ("xPermittedCrossDomainPolicies", PolicyValue::scalar("none")),
        ("xXSSProtection", PolicyValue::scalar("0")),
        (
            "permissionsPolicy",
            PolicyValue::map([
                ("camera", PolicyValue::list(Vec::<String>::new())),
                ("display-capture", PolicyValue::list(Vec::<String>::new())),
                ("fullscreen", PolicyValue::list(Vec::<String>::new())),
                ("geolocation", PolicyValue::list(Vec::<String>::new())),
                ("microphone", PolicyValue::list(Vec::<String>::new())),
            ]),
        ),
    ])
}

fn default_csp() -> PolicyValue {
    PolicyValue::map([
        ("base-uri", PolicyValue::list(["'self'"])),
        ("font-src", PolicyValue::list(["'self'", "https:", "data:"])),
        ("form-action", PolicyValue::list(["'self'"])),
        ("frame-ancestors", PolicyValue::list(["'self'"])),
        ("img-src", PolicyValue::list(["'self'", "data:"])),
        ("object-src", PolicyValue::list(["'none'"])),
        ("script-src-attr", PolicyValue::list(["'none'"])),
        ("style-src", PolicyValue::list(["'self'", "https:", "'unsafe-inline'"])),
        ("upgrade-insecure-requests", PolicyValue::Enabled),
    ])
}
