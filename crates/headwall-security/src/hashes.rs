//! CSP hash injection for pre-rendered documents.
//!
//! A pre-rendered page cannot carry a per-request nonce, so its inline scripts
//! and styles are allowed by hash instead. The document is scanned after
//! rendering, SHA-256 hashes and SRI integrity tokens are folded into the
//! structured CSP, and the result is emitted both as a `<meta>` tag in the
//! head and as a header value for static hosts.

use base64::{engine::general_purpose::STANDARD, Engine};
use headwall_core::{DirectiveMap, PolicyValue, Result, SecurityError, SsgConfig};
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

use crate::headers::{compile_csp, compile_csp_except, CompiledHeaders};
use crate::nonce::strip_nonce_sources;

/// Directives browsers ignore when the policy is delivered in a `<meta>` tag.
pub const META_UNSUPPORTED_DIRECTIVES: [&str; 3] = ["frame-ancestors", "report-uri", "sandbox"];

/// `<link rel="preload">` destinations that are governed by `script-src`.
const SCRIPT_PRELOAD_DESTINATIONS: [&str; 4] = ["script", "audioworklet", "paintworklet", "xslt"];

static SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap());
static STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b([^>]*)>(.*?)</style\s*>").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<link\b([^>]*)>").unwrap());
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .unwrap()
});
static CSP_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta\b[^>]*http-equiv\s*=\s*["']?content-security-policy["']?[^>]*>"#)
        .unwrap()
});
static HEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head\s*>").unwrap());

/// HTML fragments of a rendered document, grouped by where they land.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlSections {
    /// Fragments rendered inside `<head>`.
    pub head: Vec<String>,
    /// Fragments rendered at the start of `<body>`.
    pub body_prepend: Vec<String>,
    /// Main body fragments.
    pub body: Vec<String>,
    /// Fragments rendered at the end of `<body>`.
    pub body_append: Vec<String>,
}

impl HtmlSections {
    fn fragments(&self) -> impl Iterator<Item = &str> {
        self.head
            .iter()
            .chain(&self.body_prepend)
            .chain(&self.body)
            .chain(&self.body_append)
            .map(String::as_str)
    }
}

/// What the rendering pipeline is producing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    prerender_target: Option<String>,
}

impl RenderContext {
    /// A response rendered for one live request.
    #[must_use]
    pub fn dynamic() -> Self {
        Self::default()
    }

    /// A static artifact written to `target` (e.g. `/blog/index.html`).
    pub fn prerender(target: impl Into<String>) -> Self {
        Self {
            prerender_target: Some(target.into()),
        }
    }

    /// Whether this is a pre-rendered HTML document.
    #[must_use]
    pub fn is_prerendering(&self) -> bool {
        self.prerender_target.as_deref().is_some_and(|target| {
            match Path::new(target.split(['?', '#']).next().unwrap_or(target)).extension() {
                None => true,
                Some(ext) => ext.eq_ignore_ascii_case("html"),
            }
        })
    }
}

/// Hash tokens collected from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedHashes {
    /// Tokens for `script-src`.
    pub script: IndexSet<String>,
    /// Tokens for `style-src`.
    pub style: IndexSet<String>,
}

impl CollectedHashes {
    /// Total number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.script.len() + self.style.len()
    }

    /// Whether nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.script.is_empty() && self.style.is_empty()
    }
}

/// `'sha256-<base64>'` of the exact bytes of `content`.
#[must_use]
pub fn sha256_source(content: &str) -> String {
    format!("'sha256-{}'", STANDARD.encode(Sha256::digest(content.as_bytes())))
}

fn attributes(raw: &str) -> IndexMap<String, String> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|caps: Captures<'_>| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            (name, value.to_string())
        })
        .collect()
}

fn integrity_sources(integrity: &str) -> impl Iterator<Item = String> + '_ {
    integrity.split_whitespace().map(|token| format!("'{token}'"))
}

fn has_token(list: Option<&String>, wanted: &str) -> bool {
    list.is_some_and(|v| v.split_whitespace().any(|t| t.eq_ignore_ascii_case(wanted)))
}

/// Scan every fragment for inline content and integrity attributes.
#[must_use]
pub fn collect_hashes(sections: &HtmlSections, ssg: &SsgConfig) -> CollectedHashes {
    let mut hashes = CollectedHashes::default();

    for fragment in sections.fragments() {
        if ssg.hash_scripts {
            for caps in SCRIPT.captures_iter(fragment) {
                let attrs = attributes(&caps[1]);
                let content = &caps[2];
                if attrs.contains_key("src") {
                    if let Some(integrity) = attrs.get("integrity") {
                        hashes.script.extend(integrity_sources(integrity));
                    }
                } else if !content.is_empty() {
                    hashes.script.insert(sha256_source(content));
                }
            }
        }

        if ssg.hash_styles {
            for caps in STYLE.captures_iter(fragment) {
                let content = &caps[2];
                if !content.is_empty() {
                    hashes.style.insert(sha256_source(content));
                }
            }
        }

        for caps in LINK.captures_iter(fragment) {
            let attrs = attributes(&caps[1]);
            let Some(integrity) = attrs.get("integrity") else {
                continue;
            };
            let rel = attrs.get("rel");
            if ssg.hash_styles && has_token(rel, "stylesheet") {
                hashes.style.extend(integrity_sources(integrity));
            }
            if ssg.hash_scripts {
                let preloads_script = has_token(rel, "preload")
                    && attrs.get("as").is_some_and(|dest| {
                        SCRIPT_PRELOAD_DESTINATIONS
                            .iter()
                            .any(|d| d.eq_ignore_ascii_case(dest))
                    });
                if preloads_script || has_token(rel, "modulepreload") {
                    hashes.script.extend(integrity_sources(integrity));
                }
            }
        }
    }

    hashes
}

/// Append tokens to a directive, keeping existing entries first and skipping duplicates.
fn append_sources(directives: &mut DirectiveMap, directive: &str, tokens: &IndexSet<String>) {
    if tokens.is_empty() {
        return;
    }
    let entry = directives
        .entry(directive.to_string())
        .or_insert_with(|| PolicyValue::TokenList(Vec::new()));

    let mut list = match std::mem::replace(entry, PolicyValue::Disabled) {
        PolicyValue::TokenList(list) => list,
        PolicyValue::Scalar(text) => text.split_whitespace().map(str::to_string).collect(),
        PolicyValue::Enabled => Vec::new(),
        untouched @ (PolicyValue::Disabled | PolicyValue::StructuredMap(_)) => {
            *entry = untouched;
            return;
        }
    };
    for token in tokens {
        if !list.contains(token) {
            list.push(token.clone());
        }
    }
    *entry = PolicyValue::TokenList(list);
}

/// Result of a hash injection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashInjection {
    /// CSP directives with hashes folded in and nonce placeholders removed.
    pub directives: DirectiveMap,
    /// Value for the `Content-Security-Policy` header.
    pub header_value: String,
    /// `<meta http-equiv="Content-Security-Policy">` tag for the head.
    pub meta_tag: String,
    /// What was found in the document.
    pub hashes: CollectedHashes,
}

/// Fold hashes of `sections` into `csp` and add the meta tag to the head.
///
/// Fails with [`SecurityError::RenderingPrecondition`] outside a prerender
/// pass or when `csp` is not a directive map; callers skip the phase then.
pub fn inject_hashes(
    csp: &PolicyValue,
    sections: &mut HtmlSections,
    ssg: &SsgConfig,
    context: &RenderContext,
) -> Result<HashInjection> {
    if !context.is_prerendering() {
        return Err(SecurityError::RenderingPrecondition(
            "not a pre-rendered HTML document".to_string(),
        ));
    }
    let Some(base) = csp.as_map() else {
        return Err(SecurityError::RenderingPrecondition(format!(
            "Content-Security-Policy is a {}, not a directive map",
            csp.kind()
        )));
    };

    let hashes = collect_hashes(sections, ssg);
    let mut directives = base.clone();
    append_sources(&mut directives, "script-src", &hashes.script);
    append_sources(&mut directives, "style-src", &hashes.style);
    strip_nonce_sources(&mut directives);

    let header_value = compile_csp(&directives);
    let meta_tag = meta_tag(&compile_csp_except(&directives, &META_UNSUPPORTED_DIRECTIVES));

    sections.head.retain(|fragment| !CSP_META.is_match(fragment));
    sections.head.push(meta_tag.clone());

    debug!(
        script_hashes = hashes.script.len(),
        style_hashes = hashes.style.len(),
        "Injected CSP hashes"
    );

    Ok(HashInjection {
        directives,
        header_value,
        meta_tag,
        hashes,
    })
}

/// Run hash injection over a whole HTML document.
///
/// The document is scanned as a single body fragment. Any existing CSP meta
/// tag is removed and the new one is inserted before `</head>`.
pub fn inject_into_document(
    html: &str,
    csp: &PolicyValue,
    ssg: &SsgConfig,
    context: &RenderContext,
) -> Result<(String, HashInjection)> {
    let mut sections = HtmlSections {
        body: vec![html.to_string()],
        ..HtmlSections::default()
    };
    let injection = inject_hashes(csp, &mut sections, ssg, context)?;

    let cleaned = CSP_META.replace_all(html, "");
    let document = match HEAD_CLOSE.find(&cleaned) {
        Some(close) => format!(
            "{}{}{}",
            &cleaned[..close.start()],
            injection.meta_tag,
            &cleaned[close.start()..]
        ),
        None => format!("{}{}", injection.meta_tag, cleaned),
    };
    Ok((document, injection))
}

fn meta_tag(policy: &str) -> String {
    let escaped = policy.replace('&', "&amp;").replace('"', "&quot;");
    format!(r#"<meta http-equiv="Content-Security-Policy" content="{escaped}">"#)
}

/// Per-path header rules collected while pre-rendering, for static hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrerenderManifest {
    routes: IndexMap<String, IndexMap<String, String>>,
}

impl PrerenderManifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the headers served for `path`, replacing earlier entries.
    pub fn record(&mut self, path: impl Into<String>, headers: &CompiledHeaders) {
        let entry = headers
            .iter()
            .map(|(header, value)| (header.header_name().to_string(), value.to_string()))
            .collect();
        self.routes.insert(path.into(), entry);
    }

    /// Headers recorded for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&IndexMap<String, String>> {
        self.routes.get(path)
    }

    /// Number of recorded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Pretty JSON `{ path: { header: value } }`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.routes)
    }
}
