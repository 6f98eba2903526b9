//! Effective policy resolution.
//!
//! Every rule whose pattern matches the request path is layered over the
//! global policy, least specific first, so that `/**` acts as the base layer
//! and the longest matching literal has the final say. Rules with equal
//! specificity apply in registration order, so later registrations win.

use dashmap::DashMap;
use headwall_core::{EffectivePolicy, PolicyValue, Result};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

use crate::merge::merge_into;
use crate::routes::RouteRule;

/// Resolve the effective policy for `path` without any caching.
pub fn resolve(global: &PolicyValue, rules: &[RouteRule], path: &str) -> Result<EffectivePolicy> {
    build(global, rules, &matching_rules(rules, path))
}

/// Indices of the rules matching `path`, in layering order.
fn matching_rules(rules: &[RouteRule], path: &str) -> Vec<usize> {
    let mut matched: Vec<usize> = rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.pattern.matches(path))
        .map(|(index, _)| index)
        .collect();
    matched.sort_by(|&a, &b| {
        rules[a]
            .pattern
            .cmp_specificity(&rules[b].pattern)
            .then(a.cmp(&b))
    });
    matched
}

fn build(global: &PolicyValue, rules: &[RouteRule], layers: &[usize]) -> Result<EffectivePolicy> {
    let mut tree = global.clone();
    let mut headers = IndexMap::new();
    for &index in layers {
        let rule = &rules[index];
        merge_into(&mut tree, &rule.security);
        for (name, value) in &rule.headers {
            headers.insert(name.clone(), value.clone());
        }
    }
    EffectivePolicy::from_tree(tree, headers)
}

/// Resolver over a fixed rule set.
///
/// Rules are registered once. Effective policies are memoized per set of
/// matching rules, so repeated lookups share one immutable value.
#[derive(Debug)]
pub struct PolicyResolver {
    global: PolicyValue,
    rules: Vec<RouteRule>,
    resolved: DashMap<Vec<usize>, Arc<EffectivePolicy>>,
}

impl PolicyResolver {
    /// Build a resolver and validate every registered scope.
    pub fn new(global: PolicyValue, rules: Vec<RouteRule>) -> Result<Self> {
        let resolver = Self {
            global,
            rules,
            resolved: DashMap::new(),
        };

        let mut problems = Vec::new();
        match build(&resolver.global, &resolver.rules, &[]) {
            Ok(policy) => {
                resolver.resolved.insert(Vec::new(), Arc::new(policy));
            }
            Err(e) => problems.extend(scoped("global policy", e)),
        }
        for rule in &resolver.rules {
            if let Err(e) = resolver.resolve(rule.pattern.literal()) {
                problems.extend(scoped(&format!("route `{}`", rule.pattern), e));
            }
        }
        if !problems.is_empty() {
            return Err(headwall_core::SecurityError::Configuration(problems));
        }

        debug!(
            rules = resolver.rules.len(),
            scopes = resolver.resolved.len(),
            "Policy resolver ready"
        );
        Ok(resolver)
    }

    /// Effective policy for a request path.
    pub fn resolve(&self, path: &str) -> Result<Arc<EffectivePolicy>> {
        let layers = matching_rules(&self.rules, path);
        if let Some(policy) = self.resolved.get(&layers) {
            return Ok(Arc::clone(policy.value()));
        }

        let policy = Arc::new(build(&self.global, &self.rules, &layers)?);
        self.resolved.insert(layers, Arc::clone(&policy));
        Ok(policy)
    }

    /// The global policy tree.
    #[must_use]
    pub fn global(&self) -> &PolicyValue {
        &self.global
    }

    /// Registered rules.
    #[must_use]
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

fn scoped(scope: &str, error: headwall_core::SecurityError) -> Vec<String> {
    match error {
        headwall_core::SecurityError::Configuration(problems) => problems
            .into_iter()
            .map(|p| format!("{scope}: {p}"))
            .collect(),
        other => vec![format!("{scope}: {other}")],
    }
}
