//! Deep merge of policy trees.
//!
//! Maps merge key by key, recursively. Anything else, lists included, is
//! replaced outright by the override. Keys missing from the override are
//! inherited from the base.

use headwall_core::PolicyValue;

/// Merge `overlay` on top of `base`, returning a new tree.
#[must_use]
pub fn merge(base: &PolicyValue, overlay: &PolicyValue) -> PolicyValue {
    let mut merged = base.clone();
    merge_into(&mut merged, overlay);
    merged
}

/// Merge `overlay` into `base` in place.
pub fn merge_into(base: &mut PolicyValue, overlay: &PolicyValue) {
    match (base, overlay) {
        (PolicyValue::StructuredMap(target), PolicyValue::StructuredMap(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, value) => *target = value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v(json: &str) -> PolicyValue {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_lists_replace() {
        let merged = merge(
            &v(r#"{"script-src": ["'self'", "https:"]}"#),
            &v(r#"{"script-src": ["'none'"]}"#),
        );
        assert_eq!(merged, v(r#"{"script-src": ["'none'"]}"#));
    }

    #[test]
    fn test_maps_merge_recursively() {
        let merged = merge(
            &v(r#"{"headers": {"xFrameOptions": "DENY", "contentSecurityPolicy": {"img-src": ["'self'"]}}}"#),
            &v(r#"{"headers": {"contentSecurityPolicy": {"script-src": ["'self'"]}}}"#),
        );
        assert_eq!(
            merged,
            v(r#"{"headers": {"xFrameOptions": "DENY", "contentSecurityPolicy": {"img-src": ["'self'"], "script-src": ["'self'"]}}}"#)
        );
    }

    #[test]
    fn test_disabled_replaces_map_and_back() {
        let off = merge(&v(r#"{"rateLimiter": {"interval": 10}}"#), &v(r#"{"rateLimiter": false}"#));
        assert_eq!(off, v(r#"{"rateLimiter": false}"#));

        let on = merge(&off, &v(r#"{"rateLimiter": {"tokensPerInterval": 2}}"#));
        assert_eq!(on, v(r#"{"rateLimiter": {"tokensPerInterval": 2}}"#));
    }

    #[test]
    fn test_base_key_order_kept() {
        let merged = merge(&v(r#"{"a": "1", "b": "2"}"#), &v(r#"{"c": "3", "a": "9"}"#));
        let keys: Vec<_> = merged.as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(merged.get("a"), Some(&PolicyValue::scalar("9")));
    }
}
