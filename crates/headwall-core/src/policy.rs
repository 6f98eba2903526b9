//! Typed views over a resolved policy tree.
//!
//! Resolution works on untyped [`PolicyValue`] trees so that merge semantics
//! stay uniform. Once a tree is final it is decoded into an
//! [`EffectivePolicy`], which fills defaults for missing keys and reports every
//! shape problem at once.

use crate::error::{Result, SecurityError};
use crate::header::{HeaderKind, SecurityHeader};
use crate::value::{DirectiveMap, PolicyValue};
use indexmap::IndexMap;
use std::time::Duration;

/// Top-level policy keys.
pub mod keys {
    /// Whole-policy switch.
    pub const ENABLED: &str = "enabled";
    /// Security header options.
    pub const HEADERS: &str = "headers";
    /// Request size limiter section.
    pub const REQUEST_SIZE_LIMITER: &str = "requestSizeLimiter";
    /// Rate limiter section.
    pub const RATE_LIMITER: &str = "rateLimiter";
    /// Allowed methods restricter section.
    pub const ALLOWED_METHODS_RESTRICTER: &str = "allowedMethodsRestricter";
    /// Per-request nonce switch.
    pub const NONCE: &str = "nonce";
    /// Prerender hash injection section.
    pub const SSG: &str = "ssg";
    /// `X-Powered-By` removal switch.
    pub const HIDE_POWERED_BY: &str = "hidePoweredBy";
    /// Opaque sections carried for the host.
    pub const PASS_THROUGH: [&str; 3] = ["corsHandler", "basicAuth", "csrf"];
}

const KNOWN_KEYS: [&str; 8] = [
    keys::ENABLED,
    keys::HEADERS,
    keys::REQUEST_SIZE_LIMITER,
    keys::RATE_LIMITER,
    keys::ALLOWED_METHODS_RESTRICTER,
    keys::NONCE,
    keys::SSG,
    keys::HIDE_POWERED_BY,
];

/// Request size limiter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSizeLimiterConfig {
    /// Limit for ordinary bodies.
    pub max_request_size_in_bytes: u64,
    /// Limit for `multipart/form-data` bodies.
    pub max_upload_file_request_in_bytes: u64,
    /// Raise instead of returning the payload.
    pub throw_error: bool,
}

impl Default for RequestSizeLimiterConfig {
    fn default() -> Self {
        Self {
            max_request_size_in_bytes: 2_000_000,
            max_upload_file_request_in_bytes: 8_000_000,
            throw_error: true,
        }
    }
}

/// Which store backs the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDriverConfig {
    /// Driver name, e.g. `lruCache`.
    pub name: String,
    /// Driver specific options.
    pub options: DirectiveMap,
}

impl Default for StorageDriverConfig {
    fn default() -> Self {
        Self {
            name: "lruCache".to_string(),
            options: DirectiveMap::new(),
        }
    }
}

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Bucket size per window.
    pub tokens_per_interval: u32,
    /// Window length.
    pub interval: Duration,
    /// Emit `x-ratelimit-*` headers.
    pub emit_headers: bool,
    /// Raise instead of returning the payload.
    pub throw_error: bool,
    /// Deny when the store fails instead of letting requests through.
    pub strict: bool,
    /// Store driver.
    pub driver: StorageDriverConfig,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            tokens_per_interval: 150,
            interval: Duration::from_millis(300_000),
            emit_headers: false,
            throw_error: true,
            strict: false,
            driver: StorageDriverConfig::default(),
        }
    }
}

/// Method allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedMethods {
    /// `"*"`: every method.
    Any,
    /// Upper-cased method names.
    Only(Vec<String>),
}

impl AllowedMethods {
    /// Whether `method` passes.
    #[must_use]
    pub fn allows(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(method)),
        }
    }
}

/// Allowed methods restricter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedMethodsConfig {
    /// Allowlist.
    pub methods: AllowedMethods,
    /// Raise instead of returning the payload.
    pub throw_error: bool,
}

impl Default for AllowedMethodsConfig {
    fn default() -> Self {
        Self {
            methods: AllowedMethods::Any,
            throw_error: true,
        }
    }
}

/// Prerender hash injection switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsgConfig {
    /// Hash inline scripts and collect script integrity tokens.
    pub hash_scripts: bool,
    /// Hash inline styles and collect stylesheet integrity tokens.
    pub hash_styles: bool,
}

impl Default for SsgConfig {
    fn default() -> Self {
        Self {
            hash_scripts: true,
            hash_styles: true,
        }
    }
}

/// The fully resolved policy for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePolicy {
    /// When false every other component is skipped for this scope.
    pub enabled: bool,
    /// Header options, `None` when `headers = false`.
    pub headers: Option<DirectiveMap>,
    /// Size gate.
    pub request_size_limiter: Option<RequestSizeLimiterConfig>,
    /// Rate limiter gate.
    pub rate_limiter: Option<RateLimiterConfig>,
    /// Method gate.
    pub allowed_methods_restricter: Option<AllowedMethodsConfig>,
    /// Generate a nonce per request.
    pub nonce: bool,
    /// Prerender hash injection.
    pub ssg: Option<SsgConfig>,
    /// Strip `X-Powered-By`.
    pub hide_powered_by: bool,
    /// Host headers attached to the route, overridden by security headers.
    pub standard_headers: IndexMap<String, String>,
    tree: PolicyValue,
}

impl EffectivePolicy {
    /// Decode a merged policy tree.
    pub fn from_tree(tree: PolicyValue, standard_headers: IndexMap<String, String>) -> Result<Self> {
        let mut problems = Problems::default();
        let policy = {
            let Some(root) = tree.as_map() else {
                return Err(SecurityError::config(format!(
                    "policy must be a table, found {}",
                    tree.kind()
                )));
            };
            Self::decode(root, &mut problems)
        };
        problems.into_result()?;

        Ok(Self {
            standard_headers,
            tree,
            ..policy
        })
    }

    fn decode(root: &DirectiveMap, problems: &mut Problems) -> Self {
        for key in root.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) && !keys::PASS_THROUGH.contains(&key.as_str()) {
                problems.push(format!("unknown policy key `{key}`"));
            }
        }

        let headers = match problems.section(root, keys::HEADERS) {
            Some(Some(map)) => {
                validate_headers(map, problems);
                Some(map.clone())
            }
            Some(None) => Some(DirectiveMap::new()),
            None => None,
        };

        Self {
            enabled: problems.flag(root, "", keys::ENABLED, true),
            headers,
            request_size_limiter: problems
                .section(root, keys::REQUEST_SIZE_LIMITER)
                .map(|map| RequestSizeLimiterConfig::decode(map, problems)),
            rate_limiter: problems
                .section(root, keys::RATE_LIMITER)
                .map(|map| RateLimiterConfig::decode(map, problems)),
            allowed_methods_restricter: problems
                .section(root, keys::ALLOWED_METHODS_RESTRICTER)
                .map(|map| AllowedMethodsConfig::decode(map, problems)),
            nonce: problems.flag(root, "", keys::NONCE, false),
            ssg: problems
                .section(root, keys::SSG)
                .map(|map| SsgConfig::decode(map, problems)),
            hide_powered_by: problems.flag(root, "", keys::HIDE_POWERED_BY, false),
            standard_headers: IndexMap::new(),
            tree: PolicyValue::Disabled,
        }
    }

    /// Value of one header option, if configured.
    #[must_use]
    pub fn header(&self, header: SecurityHeader) -> Option<&PolicyValue> {
        self.headers.as_ref()?.get(header.option_name())
    }

    /// Opaque section carried for the host (`corsHandler`, `basicAuth`, `csrf`).
    #[must_use]
    pub fn extension(&self, key: &str) -> Option<&PolicyValue> {
        self.tree.get(key)
    }

    /// The merged tree this policy was decoded from.
    #[must_use]
    pub fn tree(&self) -> &PolicyValue {
        &self.tree
    }
}

impl RequestSizeLimiterConfig {
    fn decode(map: Option<&DirectiveMap>, problems: &mut Problems) -> Self {
        let defaults = Self::default();
        let Some(map) = map else { return defaults };
        let path = keys::REQUEST_SIZE_LIMITER;
        Self {
            max_request_size_in_bytes: problems.number(
                map,
                path,
                "maxRequestSizeInBytes",
                defaults.max_request_size_in_bytes,
            ),
            max_upload_file_request_in_bytes: problems.number(
                map,
                path,
                "maxUploadFileRequestInBytes",
                defaults.max_upload_file_request_in_bytes,
            ),
            throw_error: problems.flag(map, path, "throwError", defaults.throw_error),
        }
    }
}

impl RateLimiterConfig {
    fn decode(map: Option<&DirectiveMap>, problems: &mut Problems) -> Self {
        let defaults = Self::default();
        let Some(map) = map else { return defaults };
        let path = keys::RATE_LIMITER;

        let tokens = problems.number(
            map,
            path,
            "tokensPerInterval",
            u64::from(defaults.tokens_per_interval),
        );
        let tokens_per_interval = match u32::try_from(tokens) {
            Ok(0) => {
                problems.push(format!("`{path}.tokensPerInterval` must be at least 1"));
                defaults.tokens_per_interval
            }
            Ok(n) => n,
            Err(_) => {
                problems.push(format!("`{path}.tokensPerInterval` is too large"));
                defaults.tokens_per_interval
            }
        };

        let interval_ms = problems.number(map, path, "interval", defaults.interval.as_millis() as u64);
        if interval_ms == 0 {
            problems.push(format!("`{path}.interval` must be greater than 0"));
        }

        let driver = match map.get("driver") {
            None => defaults.driver.clone(),
            Some(PolicyValue::Scalar(name)) => StorageDriverConfig {
                name: name.clone(),
                options: DirectiveMap::new(),
            },
            Some(PolicyValue::StructuredMap(driver)) => {
                let name = match driver.get("name").and_then(PolicyValue::as_scalar) {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => {
                        problems.push(format!("`{path}.driver.name` must be a non-empty string"));
                        defaults.driver.name.clone()
                    }
                };
                let options = match driver.get("options") {
                    None => DirectiveMap::new(),
                    Some(PolicyValue::StructuredMap(options)) => options.clone(),
                    Some(other) => {
                        problems.push(format!(
                            "`{path}.driver.options` must be a table, found {}",
                            other.kind()
                        ));
                        DirectiveMap::new()
                    }
                };
                StorageDriverConfig { name, options }
            }
            Some(other) => {
                problems.push(format!(
                    "`{path}.driver` must be a name or a table, found {}",
                    other.kind()
                ));
                defaults.driver.clone()
            }
        };

        Self {
            tokens_per_interval,
            interval: Duration::from_millis(interval_ms.max(1)),
            emit_headers: problems.flag(map, path, "headers", defaults.emit_headers),
            throw_error: problems.flag(map, path, "throwError", defaults.throw_error),
            strict: problems.flag(map, path, "strict", defaults.strict),
            driver,
        }
    }
}

impl AllowedMethodsConfig {
    fn decode(map: Option<&DirectiveMap>, problems: &mut Problems) -> Self {
        let defaults = Self::default();
        let Some(map) = map else { return defaults };
        let path = keys::ALLOWED_METHODS_RESTRICTER;

        let methods = match map.get("methods") {
            None => AllowedMethods::Any,
            Some(PolicyValue::Scalar(s)) if s == "*" => AllowedMethods::Any,
            Some(PolicyValue::Scalar(s)) => AllowedMethods::Only(vec![s.to_ascii_uppercase()]),
            Some(PolicyValue::TokenList(list)) if list.iter().any(|m| m == "*") => AllowedMethods::Any,
            Some(PolicyValue::TokenList(list)) => {
                if list.is_empty() {
                    problems.push(format!("`{path}.methods` must list at least one method"));
                }
                AllowedMethods::Only(list.iter().map(|m| m.to_ascii_uppercase()).collect())
            }
            Some(other) => {
                problems.push(format!(
                    "`{path}.methods` must be \"*\" or a list of methods, found {}",
                    other.kind()
                ));
                AllowedMethods::Any
            }
        };

        if let AllowedMethods::Only(list) = &methods {
            for method in list {
                if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
                    problems.push(format!("`{path}.methods` contains invalid method `{method}`"));
                }
            }
        }

        Self {
            methods,
            throw_error: problems.flag(map, path, "throwError", defaults.throw_error),
        }
    }
}

impl SsgConfig {
    fn decode(map: Option<&DirectiveMap>, problems: &mut Problems) -> Self {
        let Some(map) = map else { return Self::default() };
        let hash_scripts = problems.flag(map, keys::SSG, "hashScripts", true);
        Self {
            hash_scripts,
            hash_styles: problems.flag(map, keys::SSG, "hashStyles", hash_scripts),
        }
    }
}

fn validate_headers(headers: &DirectiveMap, problems: &mut Problems) {
    for (name, value) in headers {
        let Some(header) = SecurityHeader::from_option_name(name) else {
            problems.push(format!("unknown security header option `headers.{name}`"));
            continue;
        };
        let path = format!("headers.{name}");

        match (header.kind(), value) {
            (_, PolicyValue::Disabled | PolicyValue::Scalar(_)) => {}
            (HeaderKind::ContentSecurityPolicy, PolicyValue::StructuredMap(directives)) => {
                for (directive, v) in directives {
                    if matches!(v, PolicyValue::StructuredMap(_)) {
                        problems.push(format!("`{path}.{directive}` cannot be a table"));
                    }
                }
            }
            (HeaderKind::PermissionsPolicy, PolicyValue::StructuredMap(features)) => {
                for (feature, v) in features {
                    if matches!(v, PolicyValue::StructuredMap(_)) {
                        problems.push(format!("`{path}.{feature}` cannot be a table"));
                    }
                }
            }
            (HeaderKind::StrictTransportSecurity, PolicyValue::StructuredMap(params)) => {
                match params.get("maxAge") {
                    Some(v) if v.as_u64().is_some() => {}
                    _ => problems.push(format!("`{path}.maxAge` must be an unsigned integer")),
                }
                for (key, v) in params {
                    match key.as_str() {
                        "maxAge" => {}
                        "includeSubdomains" | "preload" if v.as_bool().is_some() => {}
                        "includeSubdomains" | "preload" => {
                            problems.push(format!("`{path}.{key}` must be true or false"));
                        }
                        _ => problems.push(format!("unknown option `{path}.{key}`")),
                    }
                }
            }
            (HeaderKind::Scalar, PolicyValue::TokenList(_)) => {}
            (HeaderKind::Scalar, PolicyValue::Enabled) if header.enabled_value().is_some() => {}
            (_, other) => problems.push(format!(
                "`{path}` does not accept a {} value",
                other.kind()
            )),
        }
    }
}

#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
    fn push(&mut self, problem: String) {
        self.0.push(problem);
    }

    fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(SecurityError::Configuration(self.0))
        }
    }

    /// `None`: section off. `Some(None)`: on with defaults. `Some(Some(map))`: configured.
    fn section<'a>(&mut self, root: &'a DirectiveMap, key: &str) -> Option<Option<&'a DirectiveMap>> {
        match root.get(key) {
            None | Some(PolicyValue::Disabled) => None,
            Some(PolicyValue::Enabled) => Some(None),
            Some(PolicyValue::StructuredMap(map)) => Some(Some(map)),
            Some(other) => {
                self.push(format!(
                    "`{key}` must be false, true or a table, found {}",
                    other.kind()
                ));
                None
            }
        }
    }

    fn flag(&mut self, map: &DirectiveMap, path: &str, key: &str, default: bool) -> bool {
        match map.get(key) {
            None => default,
            Some(value) => value.as_bool().unwrap_or_else(|| {
                self.push(format!("`{}` must be true or false", join(path, key)));
                default
            }),
        }
    }

    fn number(&mut self, map: &DirectiveMap, path: &str, key: &str, default: u64) -> u64 {
        match map.get(key) {
            None => default,
            Some(value) => value.as_u64().unwrap_or_else(|| {
                self.push(format!("`{}` must be an unsigned integer", join(path, key)));
                default
            }),
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
