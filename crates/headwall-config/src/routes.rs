//! Route patterns and rules.

use headwall_core::{keys, DirectiveMap, PolicyValue, SecurityHeader};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use tracing::warn;

use crate::merge::merge;

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutePattern {
    /// Matches one path exactly.
    Exact(String),
    /// `/prefix/**` or `/prefix/*`: the prefix itself and everything below it.
    /// An empty prefix is the universal pattern `/**`.
    Segment(String),
    /// `/prefix*`: any path starting with the prefix.
    Prefix(String),
}

impl RoutePattern {
    /// Parse a pattern. A missing leading slash is added.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("route pattern cannot be empty".to_string());
        }
        let pattern = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };

        let literal = |part: &str| {
            if part.contains('*') {
                Err(format!("route pattern `{raw}` may only use `*` as a trailing wildcard"))
            } else {
                Ok(normalize_path(part).to_string())
            }
        };

        if let Some(prefix) = pattern.strip_suffix("/**").or_else(|| pattern.strip_suffix("/*")) {
            literal(prefix).map(Self::Segment)
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            literal(prefix.trim_end_matches('*')).map(Self::Prefix)
        } else {
            literal(&pattern).map(Self::Exact)
        }
    }

    /// Whether `path` is covered by this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize_path(path);
        match self {
            Self::Exact(literal) => path == literal,
            Self::Segment(prefix) if prefix.is_empty() || prefix == "/" => true,
            Self::Segment(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }

    /// The literal part of the pattern.
    #[must_use]
    pub fn literal(&self) -> &str {
        match self {
            Self::Exact(s) | Self::Segment(s) | Self::Prefix(s) => s,
        }
    }

    /// Whether this is a wildcard pattern.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    /// Compare specificity: longer literals win, exact beats wildcard at equal length.
    #[must_use]
    pub fn cmp_specificity(&self, other: &Self) -> Ordering {
        self.literal()
            .len()
            .cmp(&other.literal().len())
            .then_with(|| other.is_wildcard().cmp(&self.is_wildcard()))
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => f.write_str(s),
            Self::Segment(s) => write!(f, "{s}/**"),
            Self::Prefix(s) => write!(f, "{s}*"),
        }
    }
}

/// Strip a trailing slash except on the root path.
fn normalize_path(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// A per-route policy override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    /// Where the rule applies.
    pub pattern: RoutePattern,
    /// Partial security policy layered over less specific scopes.
    pub security: PolicyValue,
    /// Standard host headers for the route.
    pub headers: IndexMap<String, String>,
}

impl RouteRule {
    /// Create a rule from a pattern and a partial policy.
    pub fn new(pattern: &str, security: PolicyValue) -> Result<Self, String> {
        Ok(Self {
            pattern: RoutePattern::parse(pattern)?,
            security,
            headers: IndexMap::new(),
        })
    }

    /// Create a rule from raw route headers, moving structured security
    /// headers (the legacy format) into `security.headers`.
    ///
    /// Headers moved this way take precedence over the same option set in
    /// `security.headers`. String values stay host headers.
    pub fn from_route_headers(
        pattern: &str,
        security: Option<PolicyValue>,
        headers: IndexMap<String, PolicyValue>,
    ) -> Result<Self, String> {
        let mut rule = Self::new(pattern, security.unwrap_or_else(PolicyValue::empty_map))?;
        let mut moved = DirectiveMap::new();

        for (name, value) in headers {
            match value {
                PolicyValue::Scalar(text) => {
                    rule.headers.insert(name, text);
                }
                other => match SecurityHeader::from_header_name(&name) {
                    Some(header) => {
                        moved.insert(header.option_name().to_string(), other);
                    }
                    None => warn!(
                        route = %rule.pattern,
                        header = %name,
                        "Ignoring non-string route header"
                    ),
                },
            }
        }

        if !moved.is_empty() {
            let legacy = PolicyValue::map([(keys::HEADERS, PolicyValue::StructuredMap(moved))]);
            rule.security = merge(&rule.security, &legacy);
        }
        Ok(rule)
    }

    /// Attach host headers.
    #[must_use]
    pub fn with_headers(mut self, headers: IndexMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}
