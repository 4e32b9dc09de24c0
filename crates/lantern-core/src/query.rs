//! Attribute-map queries.
//!
//! A `Query` describes a node by a set of named attributes (`type`, `path`,
//! `order_index`, `properties`, ...). The searcher produces one for any live
//! node and resolves one back to the nodes it matches. On the wire a query
//! travels as its canonical string: compact JSON with sorted keys.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute value type.
pub type Value = serde_json::Value;

/// A descriptor of a node, as an ordered attribute map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    attributes: BTreeMap<String, Value>,
}

impl Query {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Query matching nodes by type name.
    pub fn by_type(type_name: &str) -> Self {
        Self::new().with("type", type_name)
    }

    /// Query matching nodes by slash-separated path.
    pub fn by_path(path: &str) -> Self {
        Self::new().with("path", path)
    }

    /// Builder-style attribute insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Merges another query's attributes into this one.
    pub fn extend(&mut self, other: Query) {
        self.attributes.extend(other.attributes);
    }

    /// Parses a query from its string form.
    ///
    /// Anything that is not a JSON object yields the empty query. Use
    /// [`Query::try_parse`] when malformed input must be reported.
    pub fn parse(text: &str) -> Self {
        Self::try_parse(text).unwrap_or_default()
    }

    /// Parses a query, rejecting input that is not a JSON object.
    pub fn try_parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidArgument(format!("malformed query: {e}")))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                attributes: map.into_iter().collect(),
            }),
            other => Err(Error::InvalidArgument(format!(
                "query must be a JSON object, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(&self.attributes).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Query {
    /// Accepts either the canonical string form or an inline JSON object.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let parsed = match value {
            Value::String(text) => Query::try_parse(&text),
            other => Query::from_value(other),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}
