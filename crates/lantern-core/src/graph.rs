//! The host graph contract.
//!
//! Lantern never owns the objects it observes. The application exposes its
//! live object tree through `HostGraph`, and everything above this trait
//! (searcher, observers, services) works purely in terms of `NodeId`s.

use crate::error::{Error, Result};
use crate::node::NodeId;
use crate::query::Value;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A method that can be invoked on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub parameters: Vec<ParameterInfo>,
}

/// One method parameter. The JSON kind of `default` is the kind an
/// argument must have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub default: Value,
}

impl MethodInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.parameters.push(ParameterInfo {
            name: name.into(),
            default: default.into(),
        });
        self
    }
}

/// Read/write access to a live, mutable object tree.
///
/// Implementations are only ever called from the thread that owns the tree.
pub trait HostGraph {
    /// Top-level nodes, in a stable order.
    fn roots(&self) -> Vec<NodeId>;

    /// Whether `node` still exists. Every other method treats a dead node
    /// as absent.
    fn is_alive(&self, node: NodeId) -> bool;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Direct children of `node`, in their stable sibling order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn type_name(&self, node: NodeId) -> Option<&str>;

    fn property(&self, node: NodeId, name: &str) -> Option<Value>;

    fn property_names(&self, node: NodeId) -> Vec<String>;

    fn is_read_only(&self, node: NodeId, name: &str) -> bool;

    /// Writes a property. Fails with `InvalidArgument` for unknown,
    /// read-only or type-incompatible properties.
    fn set_property(&mut self, node: NodeId, name: &str, value: Value) -> Result<()>;

    /// Methods callable on `node`. Graphs without methods report none.
    fn methods(&self, _node: NodeId) -> Vec<MethodInfo> {
        Vec::new()
    }

    /// Invokes a method and returns its result. Fails with
    /// `InvalidArgument` for unknown methods and for arguments that do not
    /// fit the parameters.
    fn call_method(&mut self, node: NodeId, name: &str, _args: Vec<Value>) -> Result<Value> {
        Err(Error::InvalidArgument(format!("{node} has no method {name:?}")))
    }
}

/// Breadth-first walk starting at `starts`, skipping dead nodes.
///
/// The starts themselves come first, in the order given.
pub fn walk_breadth_first<G, I>(graph: &G, starts: I) -> Vec<NodeId>
where
    G: HostGraph + ?Sized,
    I: IntoIterator<Item = NodeId>,
{
    let mut order = Vec::new();
    let mut queue: VecDeque<NodeId> = starts
        .into_iter()
        .filter(|n| graph.is_alive(*n))
        .collect();

    while let Some(node) = queue.pop_front() {
        order.push(node);
        queue.extend(graph.children(node));
    }

    order
}

/// Position of `node` among its siblings, or among the roots for a
/// top-level node.
pub fn order_index<G: HostGraph + ?Sized>(graph: &G, node: NodeId) -> Option<usize> {
    if !graph.is_alive(node) {
        return None;
    }
    let siblings = match graph.parent(node) {
        Some(parent) => graph.children(parent),
        None => graph.roots(),
    };
    siblings.iter().position(|n| *n == node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGraph;

    #[test]
    fn test_graph_without_methods() {
        let mut graph = FakeGraph::new();
        let node = graph.add("Button", None);
        assert!(graph.methods(node).is_empty());
        assert!(matches!(
            graph.call_method(node, "click", Vec::new()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_method_info_builder() {
        let info = MethodInfo::new("insert").param("text", "");
        assert_eq!(info.parameters.len(), 1);
        assert_eq!(info.parameters[0].name, "text");
        assert_eq!(info.parameters[0].default, Value::from(""));
    }
}
