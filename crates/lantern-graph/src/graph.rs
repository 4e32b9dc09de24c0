//! The object tree.
//!
//! `ObjectTree` wraps a petgraph `StableDiGraph` with parent → child edges
//! and keeps a `NodeId` index next to it. Stable indices matter here:
//! destroying a subtree must not shuffle the indices of unrelated nodes.

use crate::edge::{ChildLink, ObjectData, PropertySlot};
use crate::error::TreeError;
use crate::method::MethodTable;
use lantern_core::{Error, HostGraph, MethodInfo, NodeId, Value};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use tracing::debug;

/// A mutable tree of typed objects with named properties.
#[derive(Debug, Default)]
pub struct ObjectTree {
    graph: StableDiGraph<ObjectData, ChildLink>,
    index: HashMap<NodeId, NodeIndex>,
    next_order: u64,
    pub(crate) methods: MethodTable,
}

impl ObjectTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Creates an object, optionally under `parent`.
    pub fn create(&mut self, type_name: &str, parent: Option<NodeId>) -> Result<NodeId, TreeError> {
        let parent_idx = parent.map(|p| self.idx(p)).transpose()?;
        let data = ObjectData::new(type_name);
        let id = data.id;
        let idx = self.graph.add_node(data);
        self.index.insert(id, idx);
        if let Some(parent_idx) = parent_idx {
            self.link(parent_idx, idx);
        }
        debug!("created {} {}", type_name, id);
        Ok(id)
    }

    /// Moves `node` under `parent`, or to the top level for `None`.
    pub fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<(), TreeError> {
        let idx = self.idx(node)?;
        let parent_idx = parent.map(|p| self.idx(p)).transpose()?;

        if let (Some(parent), Some(_)) = (parent, parent_idx) {
            let mut ancestor = Some(parent);
            while let Some(a) = ancestor {
                if a == node {
                    return Err(TreeError::Cycle { node, parent });
                }
                ancestor = self.parent_of(a);
            }
        }

        let incoming: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        for edge in incoming {
            self.graph.remove_edge(edge);
        }
        if let Some(parent_idx) = parent_idx {
            self.link(parent_idx, idx);
        }
        Ok(())
    }

    /// Destroys `node` and everything below it.
    pub fn destroy(&mut self, node: NodeId) -> Result<(), TreeError> {
        let root = self.idx(node)?;
        let mut worklist = vec![root];
        let mut doomed = Vec::new();
        while let Some(idx) = worklist.pop() {
            doomed.push(idx);
            worklist.extend(self.graph.neighbors_directed(idx, Direction::Outgoing));
        }
        for idx in doomed {
            if let Some(data) = self.graph.remove_node(idx) {
                self.index.remove(&data.id);
            }
        }
        debug!("destroyed {} and its subtree", node);
        Ok(())
    }

    /// Sets the `name` property.
    pub fn set_name(&mut self, node: NodeId, name: &str) -> Result<(), TreeError> {
        let data = self.data_mut(node)?;
        data.properties
            .entry("name".to_string())
            .or_insert_with(|| PropertySlot::new(Value::Null, false))
            .value = Value::from(name);
        Ok(())
    }

    /// Adds or replaces a property, bypassing write checks.
    pub fn define_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: Value,
        read_only: bool,
    ) -> Result<(), TreeError> {
        self.data_mut(node)?
            .properties
            .insert(name.to_string(), PropertySlot::new(value, read_only));
        Ok(())
    }

    /// Removes a property. Returns the old slot, if any.
    pub fn remove_property(
        &mut self,
        node: NodeId,
        name: &str,
    ) -> Result<Option<PropertySlot>, TreeError> {
        Ok(self.data_mut(node)?.properties.remove(name))
    }

    /// Gets an object's payload.
    pub fn get(&self, node: NodeId) -> Option<&ObjectData> {
        let idx = self.index.get(&node)?;
        self.graph.node_weight(*idx)
    }

    fn data_mut(&mut self, node: NodeId) -> Result<&mut ObjectData, TreeError> {
        let idx = self.idx(node)?;
        self.graph
            .node_weight_mut(idx)
            .ok_or(TreeError::UnknownNode(node))
    }

    fn idx(&self, node: NodeId) -> Result<NodeIndex, TreeError> {
        self.index
            .get(&node)
            .copied()
            .ok_or(TreeError::UnknownNode(node))
    }

    fn link(&mut self, parent: NodeIndex, child: NodeIndex) {
        self.next_order += 1;
        self.graph.add_edge(
            parent,
            child,
            ChildLink {
                order: self.next_order,
            },
        );
    }

    fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        let idx = *self.index.get(&node)?;
        let parent = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .next()?;
        self.graph.node_weight(parent).map(|d| d.id)
    }
}

impl HostGraph for ObjectTree {
    fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|idx| {
                self.graph
                    .neighbors_directed(*idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx).map(|d| d.id))
            .collect();
        roots.sort();
        roots
    }

    fn is_alive(&self, node: NodeId) -> bool {
        self.index.contains_key(&node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.parent_of(node)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let Some(idx) = self.index.get(&node) else {
            return Vec::new();
        };
        let mut links: Vec<(u64, NodeIndex)> = self
            .graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|e| (e.weight().order, e.target()))
            .collect();
        links.sort_by_key(|(order, _)| *order);
        links
            .into_iter()
            .filter_map(|(_, child)| self.graph.node_weight(child).map(|d| d.id))
            .collect()
    }

    fn type_name(&self, node: NodeId) -> Option<&str> {
        self.get(node).map(|d| d.type_name.as_str())
    }

    fn property(&self, node: NodeId, name: &str) -> Option<Value> {
        self.get(node)?.properties.get(name).map(|s| s.value.clone())
    }

    fn property_names(&self, node: NodeId) -> Vec<String> {
        self.get(node)
            .map(|d| d.properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn is_read_only(&self, node: NodeId, name: &str) -> bool {
        self.get(node)
            .and_then(|d| d.properties.get(name))
            .map(|s| s.read_only)
            .unwrap_or(false)
    }

    fn set_property(&mut self, node: NodeId, name: &str, value: Value) -> lantern_core::Result<()> {
        let ObjectData {
            type_name,
            properties,
            ..
        } = self.data_mut(node)?;
        let slot = properties.get_mut(name).ok_or_else(|| {
            Error::InvalidArgument(format!("{type_name} has no property {name:?}"))
        })?;
        if slot.read_only {
            return Err(Error::InvalidArgument(format!(
                "property {name:?} is read-only"
            )));
        }
        if !slot.accepts(&value) {
            return Err(Error::InvalidArgument(format!(
                "property {name:?} cannot hold {value}"
            )));
        }
        slot.value = value;
        Ok(())
    }

    fn methods(&self, node: NodeId) -> Vec<MethodInfo> {
        self.get(node)
            .map(|d| self.methods.list(&d.type_name))
            .unwrap_or_default()
    }

    fn call_method(
        &mut self,
        node: NodeId,
        name: &str,
        args: Vec<Value>,
    ) -> lantern_core::Result<Value> {
        let type_name = self
            .get(node)
            .ok_or(TreeError::UnknownNode(node))?
            .type_name
            .clone();
        let handler = self.methods.resolve(&type_name, name, &args)?;
        debug!("calling {}.{} on {}", type_name, name, node);
        handler(self, node, &args)
    }
}
