//! Query keys and key matchers.
//!
//! A [`QueryKey`] is the identity of a cacheable remote read: a resource name
//! plus the parameters that affect the result. Keys compare structurally, so
//! two keys built independently from the same parameters address the same
//! cache slot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single parameter value inside a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<KeyValue>),
}

impl From<bool> for KeyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for KeyValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for KeyValue {
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<KeyValue>> From<Vec<T>> for KeyValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{:?}", v),
            Self::List(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Identity of a cacheable remote read.
///
/// Parameters are kept in a `BTreeMap` so insertion order never leaks into
/// equality or hashing. Absent optional parameters must be left out of the
/// key (see [`QueryKey::with_opt`]) or identical reads would occupy
/// different slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    resource: String,
    params: BTreeMap<String, KeyValue>,
}

impl QueryKey {
    /// Create a key for `resource` with no parameters.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add (or replace) a parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a parameter only when it is present.
    pub fn with_opt<V: Into<KeyValue>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn param(&self, name: &str) -> Option<&KeyValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// True when `other` names the same resource and carries every parameter
    /// of `self` with an equal value.
    ///
    /// `QueryKey::new("tickets")` is a prefix of every tickets key.
    pub fn is_prefix_of(&self, other: &QueryKey) -> bool {
        self.resource == other.resource
            && self
                .params
                .iter()
                .all(|(name, value)| other.params.get(name) == Some(value))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        if self.params.is_empty() {
            return Ok(());
        }
        write!(f, "{{")?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Selects a set of query keys, used for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    /// Exactly this key.
    Exact(QueryKey),
    /// Every key of the named resource.
    Resource(String),
    /// Every key that the given key is a prefix of.
    Prefix(QueryKey),
    /// Every key.
    All,
}

impl KeyMatch {
    pub fn resource(name: impl Into<String>) -> Self {
        Self::Resource(name.into())
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::Exact(k) => k == key,
            Self::Resource(name) => key.resource() == name,
            Self::Prefix(prefix) => prefix.is_prefix_of(key),
            Self::All => true,
        }
    }
}

impl From<QueryKey> for KeyMatch {
    fn from(key: QueryKey) -> Self {
        Self::Exact(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_order_does_not_affect_equality() {
        let a = QueryKey::new("tickets").with("status", "open").with("limit", 20u32);
        let b = QueryKey::new("tickets").with("limit", 20u32).with("status", "open");
        assert_eq!(a, b);
    }

    #[test]
    fn test_absent_param_is_omitted() {
        let a = QueryKey::new("tickets").with_opt("status", None::<String>);
        assert_eq!(a, QueryKey::new("tickets"));
        assert_eq!(a.param_count(), 0);
    }

    #[test]
    fn test_prefix_matching() {
        let all = QueryKey::new("tickets");
        let open = QueryKey::new("tickets").with("status", "open");
        let open_page = open.clone().with("offset", 20u32);
        let tags = QueryKey::new("tags");

        assert!(all.is_prefix_of(&open));
        assert!(open.is_prefix_of(&open_page));
        assert!(!open_page.is_prefix_of(&open));
        assert!(!all.is_prefix_of(&tags));
    }

    #[test]
    fn test_key_match_variants() {
        let key = QueryKey::new("tickets").with("q", "bug");
        assert!(KeyMatch::resource("tickets").matches(&key));
        assert!(!KeyMatch::resource("tags").matches(&key));
        assert!(KeyMatch::Exact(key.clone()).matches(&key));
        assert!(!KeyMatch::Exact(QueryKey::new("tickets")).matches(&key));
        assert!(KeyMatch::Prefix(QueryKey::new("tickets")).matches(&key));
        assert!(KeyMatch::All.matches(&key));
    }

    #[test]
    fn test_display() {
        let key = QueryKey::new("tickets")
            .with("status", "open")
            .with("tags", vec!["a", "b"]);
        assert_eq!(key.to_string(), "tickets{status=\"open\",tags=[\"a\",\"b\"]}");
        assert_eq!(QueryKey::new("tags").to_string(), "tags");
    }
}
