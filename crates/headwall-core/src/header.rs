//! Canonical security header table.
//!
//! Option names (as they appear under `headers` in a policy) map one-to-one
//! onto HTTP header names. The table is fixed; lookups work both ways.

use std::fmt;

/// How a header's [`PolicyValue`](crate::PolicyValue) is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// Content-Security-Policy directive map.
    ContentSecurityPolicy,
    /// Strict-Transport-Security parameter map.
    StrictTransportSecurity,
    /// Permissions-Policy feature map.
    PermissionsPolicy,
    /// Plain value passed through.
    Scalar,
}

/// A header Headwall knows how to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityHeader {
    /// `Content-Security-Policy`
    ContentSecurityPolicy,
    /// `Cross-Origin-Embedder-Policy`
    CrossOriginEmbedderPolicy,
    /// `Cross-Origin-Opener-Policy`
    CrossOriginOpenerPolicy,
    /// `Cross-Origin-Resource-Policy`
    CrossOriginResourcePolicy,
    /// `Origin-Agent-Cluster`
    OriginAgentCluster,
    /// `Referrer-Policy`
    ReferrerPolicy,
    /// `Strict-Transport-Security`
    StrictTransportSecurity,
    /// `X-Content-Type-Options`
    XContentTypeOptions,
    /// `X-DNS-Prefetch-Control`
    XDnsPrefetchControl,
    /// `X-Download-Options`
    XDownloadOptions,
    /// `X-Frame-Options`
    XFrameOptions,
    /// `X-Permitted-Cross-Domain-Policies`
    XPermittedCrossDomainPolicies,
    /// `X-XSS-Protection`
    XXssProtection,
    /// `Permissions-Policy`
    PermissionsPolicy,
}

impl SecurityHeader {
    /// Every header, in emission order.
    pub const ALL: [Self; 14] = [
        Self::ContentSecurityPolicy,
        Self::CrossOriginEmbedderPolicy,
        Self::CrossOriginOpenerPolicy,
        Self::CrossOriginResourcePolicy,
        Self::OriginAgentCluster,
        Self::ReferrerPolicy,
        Self::StrictTransportSecurity,
        Self::XContentTypeOptions,
        Self::XDnsPrefetchControl,
        Self::XDownloadOptions,
        Self::XFrameOptions,
        Self::XPermittedCrossDomainPolicies,
        Self::XXssProtection,
        Self::PermissionsPolicy,
    ];

    /// Key used under `headers` in a policy.
    #[must_use]
    pub const fn option_name(self) -> &'static str {
        match self {
            Self::ContentSecurityPolicy => "contentSecurityPolicy",
            Self::CrossOriginEmbedderPolicy => "crossOriginEmbedderPolicy",
            Self::CrossOriginOpenerPolicy => "crossOriginOpenerPolicy",
            Self::CrossOriginResourcePolicy => "crossOriginResourcePolicy",
            Self::OriginAgentCluster => "originAgentCluster",
            Self::ReferrerPolicy => "referrerPolicy",
            Self::StrictTransportSecurity => "strictTransportSecurity",
            Self::XContentTypeOptions => "xContentTypeOptions",
            Self::XDnsPrefetchControl => "xDNSPrefetchControl",
            Self::XDownloadOptions => "xDownloadOptions",
            Self::XFrameOptions => "xFrameOptions",
            Self::XPermittedCrossDomainPolicies => "xPermittedCrossDomainPolicies",
            Self::XXssProtection => "xXSSProtection",
            Self::PermissionsPolicy => "permissionsPolicy",
        }
    }

    /// Canonical HTTP header name.
    #[must_use]
    pub const fn header_name(self) -> &'static str {
        match self {
            Self::ContentSecurityPolicy => "Content-Security-Policy",
            Self::CrossOriginEmbedderPolicy => "Cross-Origin-Embedder-Policy",
            Self::CrossOriginOpenerPolicy => "Cross-Origin-Opener-Policy",
            Self::CrossOriginResourcePolicy => "Cross-Origin-Resource-Policy",
            Self::OriginAgentCluster => "Origin-Agent-Cluster",
            Self::ReferrerPolicy => "Referrer-Policy",
            Self::StrictTransportSecurity => "Strict-Transport-Security",
            Self::XContentTypeOptions => "X-Content-Type-Options",
            Self::XDnsPrefetchControl => "X-DNS-Prefetch-Control",
            Self::XDownloadOptions => "X-Download-Options",
            Self::XFrameOptions => "X-Frame-Options",
            Self::XPermittedCrossDomainPolicies => "X-Permitted-Cross-Domain-Policies",
            Self::XXssProtection => "X-XSS-Protection",
            Self::PermissionsPolicy => "Permissions-Policy",
        }
    }

    /// Serialization family.
    #[must_use]
    pub const fn kind(self) -> HeaderKind {
        match self {
            Self::ContentSecurityPolicy => HeaderKind::ContentSecurityPolicy,
            Self::StrictTransportSecurity => HeaderKind::StrictTransportSecurity,
            Self::PermissionsPolicy => HeaderKind::PermissionsPolicy,
            _ => HeaderKind::Scalar,
        }
    }

    /// Value emitted when a scalar header is set to `true`, if it has one.
    #[must_use]
    pub const fn enabled_value(self) -> Option<&'static str> {
        match self {
            Self::OriginAgentCluster => Some("?1"),
            Self::XContentTypeOptions => Some("nosniff"),
            Self::XDnsPrefetchControl => Some("on"),
            Self::XDownloadOptions => Some("noopen"),
            Self::XXssProtection => Some("1; mode=block"),
            _ => None,
        }
    }

    /// Look up by option name (exact match).
    #[must_use]
    pub fn from_option_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.option_name() == name)
    }

    /// Look up by HTTP header name (case-insensitive).
    #[must_use]
    pub fn from_header_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|h| h.header_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SecurityHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_name())
    }
}
