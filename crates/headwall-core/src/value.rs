//! The directive model.
//!
//! Every configurable security field is a [`PolicyValue`]. Configuration
//! documents map onto it directly: `false`/`true` become
//! [`PolicyValue::Disabled`]/[`PolicyValue::Enabled`], strings and numbers
//! become [`PolicyValue::Scalar`], arrays become [`PolicyValue::TokenList`] and
//! tables become [`PolicyValue::StructuredMap`] with document order preserved.

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered map of directive or option names to values.
pub type DirectiveMap = IndexMap<String, PolicyValue>;

/// A single policy field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyValue {
    /// The field is switched off and never emits anything.
    Disabled,
    /// A boolean flag that is switched on.
    Enabled,
    /// A literal value, passed through as-is.
    Scalar(String),
    /// An ordered list of source tokens or allowlist entries.
    TokenList(Vec<String>),
    /// Nested named values, e.g. CSP directives or HSTS parameters.
    StructuredMap(DirectiveMap),
}

impl PolicyValue {
    /// Build a token list.
    pub fn list<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::TokenList(tokens.into_iter().map(Into::into).collect())
    }

    /// Build a structured map from `(name, value)` pairs, keeping their order.
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Self)>,
        K: Into<String>,
    {
        Self::StructuredMap(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a scalar.
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Empty structured map.
    #[must_use]
    pub fn empty_map() -> Self {
        Self::StructuredMap(DirectiveMap::new())
    }

    /// Whether this value is [`PolicyValue::Disabled`].
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Disabled => "false",
            Self::Enabled => "true",
            Self::Scalar(_) => "string",
            Self::TokenList(_) => "list",
            Self::StructuredMap(_) => "map",
        }
    }

    /// Boolean reading of a flag. Only `Enabled` and `Disabled` qualify.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Enabled => Some(true),
            Self::Disabled => Some(false),
            _ => None,
        }
    }

    /// The scalar text, if this is a scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Unsigned integer reading of a scalar.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.as_scalar().and_then(|s| s.trim().parse().ok())
    }

    /// The tokens, if this is a list.
    #[must_use]
    pub fn as_tokens(&self) -> Option<&[String]> {
        match self {
            Self::TokenList(tokens) => Some(tokens),
            _ => None,
        }
    }

    /// The nested map, if this is a structured map.
    #[must_use]
    pub fn as_map(&self) -> Option<&DirectiveMap> {
        match self {
            Self::StructuredMap(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable access to the nested map.
    pub fn as_map_mut(&mut self) -> Option<&mut DirectiveMap> {
        match self {
            Self::StructuredMap(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when this is a structured map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Follow a dotted path of map keys, e.g. `headers.contentSecurityPolicy`.
    #[must_use]
    pub fn pointer(&self, path: &str) -> Option<&Self> {
        path.split('.').try_fold(self, |value, key| value.get(key))
    }
}

impl From<bool> for PolicyValue {
    fn from(flag: bool) -> Self {
        if flag {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

impl From<&str> for PolicyValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for PolicyValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<u64> for PolicyValue {
    fn from(value: u64) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<DirectiveMap> for PolicyValue {
    fn from(map: DirectiveMap) -> Self {
        Self::StructuredMap(map)
    }
}

impl Serialize for PolicyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Disabled => serializer.serialize_bool(false),
            Self::Enabled => serializer.serialize_bool(true),
            Self::Scalar(s) => serializer.serialize_str(s),
            Self::TokenList(tokens) => {
                let mut seq = serializer.serialize_seq(Some(tokens.len()))?;
                for token in tokens {
                    seq.serialize_element(token)?;
                }
                seq.end()
            }
            Self::StructuredMap(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for PolicyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PolicyValueVisitor)
    }
}

struct PolicyValueVisitor;

impl<'de> Visitor<'de> for PolicyValueVisitor {
    type Value = PolicyValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean, string, number, list of strings or table")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(PolicyValue::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(PolicyValue::Scalar(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(PolicyValue::Scalar(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(PolicyValue::Scalar(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(PolicyValue::Scalar(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(PolicyValue::Scalar(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut tokens = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<PolicyValue>()? {
            match item {
                PolicyValue::Scalar(token) => tokens.push(token),
                other => {
                    return Err(de::Error::custom(format!(
                        "list entries must be strings, found {}",
                        other.kind()
                    )))
                }
            }
        }
        Ok(PolicyValue::TokenList(tokens))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = DirectiveMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, PolicyValue>()? {
            map.insert(key, value);
        }
        Ok(PolicyValue::StructuredMap(map))
    }
}
