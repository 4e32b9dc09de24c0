//! Builds an object tree from a JSON fixture.
//!
//! A fixture is a single node spec or an array of them:
//!
//! ```json
//! {
//!   "type": "Window",
//!   "name": "Main",
//!   "children": [
//!     { "type": "Button", "name": "ok", "properties": { "text": "OK" } },
//!     { "type": "Label", "properties": { "text": "Ready" }, "read_only": ["text"] }
//!   ]
//! }
//! ```

use crate::error::TreeError;
use crate::graph::ObjectTree;
use lantern_core::{NodeId, Value};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Declarative description of one object and its subtree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Properties that clients may not write.
    #[serde(default)]
    pub read_only: Vec<String>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Fixture {
    Many(Vec<NodeSpec>),
    One(NodeSpec),
}

/// Accumulates root specs and materializes them into an `ObjectTree`.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    roots: Vec<NodeSpec>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, spec: NodeSpec) -> Self {
        self.roots.push(spec);
        self
    }

    /// Parses fixture JSON.
    pub fn from_json(text: &str) -> Result<Self, TreeError> {
        let roots = match serde_json::from_str::<Fixture>(text)? {
            Fixture::Many(roots) => roots,
            Fixture::One(root) => vec![root],
        };
        Ok(Self { roots })
    }

    /// Reads and parses a fixture file.
    pub fn load(path: &Path) -> Result<Self, TreeError> {
        let text = fs::read_to_string(path)?;
        let builder = Self::from_json(&text)?;
        info!("loaded fixture {}", path.display());
        Ok(builder)
    }

    /// Builds a fresh tree.
    pub fn build(self) -> Result<ObjectTree, TreeError> {
        let mut tree = ObjectTree::new();
        self.build_into(&mut tree, None)?;
        Ok(tree)
    }

    /// Adds the specs to an existing tree under `parent`, returning the ids
    /// of the newly created top-level objects.
    pub fn build_into(
        self,
        tree: &mut ObjectTree,
        parent: Option<NodeId>,
    ) -> Result<Vec<NodeId>, TreeError> {
        let mut created = Vec::new();
        let mut worklist: Vec<(NodeSpec, Option<NodeId>)> =
            self.roots.into_iter().rev().map(|s| (s, parent)).collect();

        while let Some((spec, parent_id)) = worklist.pop() {
            let id = tree.create(&spec.type_name, parent_id)?;
            if parent_id == parent {
                created.push(id);
            }
            if let Some(name) = &spec.name {
                tree.set_name(id, name)?;
            }
            for (name, value) in spec.properties {
                let read_only = spec.read_only.contains(&name);
                tree.define_property(id, &name, value, read_only)?;
            }
            // Pushed in reverse so siblings are created in document order.
            worklist.extend(spec.children.into_iter().rev().map(|c| (c, Some(id))));
        }

        Ok(created)
    }
}
