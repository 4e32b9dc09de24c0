//! Minimal in-memory `HostGraph` for unit tests.

use crate::error::{Error, Result};
use crate::graph::HostGraph;
use crate::node::NodeId;
use crate::query::Value;
use std::collections::BTreeMap;

struct FakeNode {
    type_name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    properties: BTreeMap<String, Value>,
}

pub(crate) struct FakeGraph {
    nodes: BTreeMap<NodeId, FakeNode>,
    roots: Vec<NodeId>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            roots: Vec::new(),
        }
    }

    pub fn add(&mut self, type_name: &str, parent: Option<NodeId>) -> NodeId {
        let id = NodeId::next();
        self.nodes.insert(
            id,
            FakeNode {
                type_name: type_name.to_string(),
                parent,
                children: Vec::new(),
                properties: BTreeMap::new(),
            },
        );
        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(p) => p.children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn set(&mut self, node: NodeId, name: &str, value: Value) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.properties.insert(name.to_string(), value);
        }
    }

    /// Removes a leaf node.
    pub fn kill(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.remove(&node) {
            match n.parent.and_then(|p| self.nodes.get_mut(&p)) {
                Some(p) => p.children.retain(|c| *c != node),
                None => self.roots.retain(|r| *r != node),
            }
        }
    }
}

impl HostGraph for FakeGraph {
    fn roots(&self) -> Vec<NodeId> {
        self.roots.clone()
    }

    fn is_alive(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node)?.parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn type_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|n| n.type_name.as_str())
    }

    fn property(&self, node: NodeId, name: &str) -> Option<Value> {
        self.nodes.get(&node)?.properties.get(name).cloned()
    }

    fn property_names(&self, node: NodeId) -> Vec<String> {
        self.nodes
            .get(&node)
            .map(|n| n.properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn is_read_only(&self, _node: NodeId, _name: &str) -> bool {
        false
    }

    fn set_property(&mut self, node: NodeId, name: &str, value: Value) -> Result<()> {
        let n = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| Error::NotFound(node.to_string()))?;
        n.properties.insert(name.to_string(), value);
        Ok(())
    }
}
