//! Header value compiler.
//!
//! Turns the structured header options of an [`EffectivePolicy`] into header
//! strings. Every [`PolicyValue`] shape has a defined rendering; shapes that
//! validation rejects are skipped with a warning if they ever get here.

use headwall_core::{DirectiveMap, EffectivePolicy, HeaderKind, PolicyValue, SecurityHeader};
use http::header::{HeaderName, HeaderValue};
use indexmap::IndexMap;
use tracing::warn;

/// Compiled security headers in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledHeaders {
    entries: Vec<(SecurityHeader, String)>,
}

impl CompiledHeaders {
    /// Value for a header, if emitted.
    #[must_use]
    pub fn get(&self, header: SecurityHeader) -> Option<&str> {
        self.entries
            .iter()
            .find(|(h, _)| *h == header)
            .map(|(_, v)| v.as_str())
    }

    /// Replace (or add) a header value.
    pub fn set(&mut self, header: SecurityHeader, value: String) {
        match self.entries.iter_mut().find(|(h, _)| *h == header) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((header, value)),
        }
    }

    /// Drop a header.
    pub fn remove(&mut self, header: SecurityHeader) {
        self.entries.retain(|(h, _)| *h != header);
    }

    /// Iterate headers in emission order.
    pub fn iter(&self) -> impl Iterator<Item = (SecurityHeader, &str)> {
        self.entries.iter().map(|(h, v)| (*h, v.as_str()))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical name → value.
    #[must_use]
    pub fn to_map(&self) -> IndexMap<&'static str, String> {
        self.entries
            .iter()
            .map(|(h, v)| (h.header_name(), v.clone()))
            .collect()
    }

    /// Write into a response header map, replacing any existing values.
    pub fn apply_to(&self, headers: &mut http::HeaderMap) {
        for (header, value) in &self.entries {
            insert_header(headers, header.header_name(), value);
        }
    }
}

/// Insert a header by name, skipping (and logging) invalid names or values.
pub fn insert_header(headers: &mut http::HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => warn!(header = %name, "Skipping header with invalid name or value"),
    }
}

/// Compile every security header of a policy.
#[must_use]
pub fn compile(policy: &EffectivePolicy) -> CompiledHeaders {
    let mut compiled = CompiledHeaders::default();
    if !policy.enabled {
        return compiled;
    }
    for header in SecurityHeader::ALL {
        if let Some(value) = policy.header(header).and_then(|v| compile_header(header, v)) {
            compiled.entries.push((header, value));
        }
    }
    compiled
}

/// Compile one header option. `None` means the header is not emitted.
#[must_use]
pub fn compile_header(header: SecurityHeader, value: &PolicyValue) -> Option<String> {
    let compiled = match (header.kind(), value) {
        (_, PolicyValue::Disabled) => return None,
        (_, PolicyValue::Scalar(s)) => s.clone(),
        (HeaderKind::ContentSecurityPolicy, PolicyValue::StructuredMap(directives)) => {
            compile_csp(directives)
        }
        (HeaderKind::StrictTransportSecurity, PolicyValue::StructuredMap(params)) => {
            compile_hsts(params)?
        }
        (HeaderKind::PermissionsPolicy, PolicyValue::StructuredMap(features)) => {
            compile_permissions_policy(features)
        }
        (HeaderKind::Scalar, PolicyValue::TokenList(tokens)) => tokens.join(", "),
        (HeaderKind::Scalar, PolicyValue::Enabled) if header.enabled_value().is_some() => {
            header.enabled_value()?.to_string()
        }
        (_, other) => {
            warn!(header = %header, kind = other.kind(), "Unsupported header value shape");
            return None;
        }
    };
    (!compiled.is_empty()).then_some(compiled)
}

/// Render a CSP directive map.
#[must_use]
pub fn compile_csp(directives: &DirectiveMap) -> String {
    compile_csp_except(directives, &[])
}

/// Render a CSP directive map, leaving out the named directives.
#[must_use]
pub fn compile_csp_except(directives: &DirectiveMap, skip: &[&str]) -> String {
    directives
        .iter()
        .filter(|(name, _)| !skip.contains(&name.as_str()))
        .filter_map(|(name, value)| render_directive(name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_directive(name: &str, value: &PolicyValue) -> Option<String> {
    match value {
        PolicyValue::Disabled => None,
        PolicyValue::Enabled => Some(name.to_string()),
        PolicyValue::Scalar(s) if s.trim().is_empty() => Some(name.to_string()),
        PolicyValue::Scalar(s) => Some(format!("{name} {}", s.trim())),
        PolicyValue::TokenList(tokens) if tokens.is_empty() => Some(name.to_string()),
        PolicyValue::TokenList(tokens) => Some(format!("{name} {}", tokens.join(" "))),
        PolicyValue::StructuredMap(_) => {
            warn!(directive = %name, "CSP directive cannot be a table");
            None
        }
    }
}

/// Render Strict-Transport-Security parameters.
#[must_use]
pub fn compile_hsts(params: &DirectiveMap) -> Option<String> {
    let Some(max_age) = params.get("maxAge").and_then(PolicyValue::as_u64) else {
        warn!("Strict-Transport-Security needs a numeric maxAge");
        return None;
    };
    let flag = |key: &str| params.get(key).and_then(PolicyValue::as_bool).unwrap_or(false);
    Some(build_hsts_header(max_age, flag("includeSubdomains"), flag("preload")))
}

/// Build HSTS header value.
#[must_use]
pub fn build_hsts_header(max_age: u64, include_subdomains: bool, preload: bool) -> String {
    let mut value = format!("max-age={max_age}");
    if include_subdomains {
        value.push_str("; includeSubDomains");
    }
    if preload {
        value.push_str("; preload");
    }
    value
}

/// Render a Permissions-Policy feature map.
#[must_use]
pub fn compile_permissions_policy(features: &DirectiveMap) -> String {
    features
        .iter()
        .filter_map(|(feature, value)| match value {
            PolicyValue::Disabled => None,
            PolicyValue::Enabled => Some(format!("{feature}=*")),
            PolicyValue::Scalar(s) => Some(format!("{feature}={s}")),
            PolicyValue::TokenList(tokens) => Some(format!("{feature}=({})", tokens.join(" "))),
            PolicyValue::StructuredMap(_) => {
                warn!(feature = %feature, "Permissions-Policy feature cannot be a table");
                None
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
