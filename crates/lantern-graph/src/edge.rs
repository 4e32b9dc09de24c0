//! Edge and node payloads for the object tree.

use lantern_core::{NodeId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parent → child containment edge.
///
/// `order` is a tree-wide sequence number. Sorting a node's outgoing links
/// by it yields the children in insertion order, and a reparented child
/// gets a fresh number so it lands last among its new siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLink {
    pub order: u64,
}

/// A single property value and whether clients may write it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySlot {
    pub value: Value,
    #[serde(default)]
    pub read_only: bool,
}

impl PropertySlot {
    pub fn new(value: Value, read_only: bool) -> Self {
        Self { value, read_only }
    }

    /// Whether `value` may replace the current one without changing its
    /// JSON kind. `null` is compatible with anything.
    pub fn accepts(&self, value: &Value) -> bool {
        same_kind(&self.value, value)
    }
}

/// Whether two values share a JSON kind. `null` matches every kind.
pub(crate) fn same_kind(current: &Value, value: &Value) -> bool {
    use serde_json::Value::*;
    match (current, value) {
        (Null, _) | (_, Null) => true,
        (Bool(_), Bool(_))
        | (Number(_), Number(_))
        | (String(_), String(_))
        | (Array(_), Array(_))
        | (Object(_), Object(_)) => true,
        _ => false,
    }
}

/// Node payload: identity, type and properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectData {
    pub id: NodeId,
    pub type_name: String,
    pub properties: BTreeMap<String, PropertySlot>,
}

impl ObjectData {
    /// A fresh object carrying the base properties every node has.
    pub fn new(type_name: impl Into<String>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("name".to_string(), PropertySlot::new(Value::from(""), false));
        properties.insert("visible".to_string(), PropertySlot::new(Value::from(true), false));
        properties.insert("enabled".to_string(), PropertySlot::new(Value::from(true), false));
        Self {
            id: NodeId::next(),
            type_name: type_name.into(),
            properties,
        }
    }
}
