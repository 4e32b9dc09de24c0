//! Query service: node → query and query → nodes.
//!
//! A `Searcher` is an ordered list of strategies. Each strategy owns one
//! query attribute: it contributes that attribute when describing a node and
//! checks it when resolving a query. A node matches a query when every
//! strategy whose attribute is present agrees.
//!
//! `type` and `path` values match either literally or as a regular
//! expression anchored to the whole subject, so `{"path": "Main/.*/OK"}`
//! finds every OK button anywhere under `Main`.

use crate::error::{Error, Result};
use crate::graph::{order_index, walk_breadth_first, HostGraph};
use crate::node::NodeId;
use crate::query::{Query, Value};
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// Properties tracked for every node regardless of type.
pub const BASE_PROPERTIES: [&str; 3] = ["name", "visible", "enabled"];

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

/// One way of describing and matching nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// `type`: the node's type name.
    Type,
    /// `properties`: the tracked properties of the node's type.
    Properties,
    /// `path`: slash-joined names from the root down to the node.
    Path,
    /// `order_index`: position among siblings.
    OrderIndex,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Type,
        Strategy::Properties,
        Strategy::Path,
        Strategy::OrderIndex,
    ];

    /// The query attribute this strategy owns.
    pub fn key(self) -> &'static str {
        match self {
            Strategy::Type => "type",
            Strategy::Properties => "properties",
            Strategy::Path => "path",
            Strategy::OrderIndex => "order_index",
        }
    }

    fn describe<G: HostGraph + ?Sized>(
        self,
        graph: &G,
        registry: &PropertyRegistry,
        node: NodeId,
    ) -> Option<Value> {
        match self {
            Strategy::Type => graph.type_name(node).map(Value::from),
            Strategy::Properties => {
                let type_name = graph.type_name(node)?;
                let map: serde_json::Map<String, Value> = registry
                    .tracked(type_name)
                    .into_iter()
                    .filter_map(|name| graph.property(node, name).map(|v| (name.to_string(), v)))
                    .collect();
                Some(Value::Object(map))
            }
            Strategy::Path => path_of(graph, node).map(Value::from),
            Strategy::OrderIndex => order_index(graph, node).map(|i| Value::from(i as u64)),
        }
    }

    fn compile(self, expected: &Value) -> Result<Criterion> {
        let invalid = || {
            Error::InvalidArgument(format!(
                "attribute {:?} cannot be {}",
                self.key(),
                expected
            ))
        };
        match self {
            Strategy::Type => Ok(Criterion::Type(Pattern::new(
                expected.as_str().ok_or_else(invalid)?,
            ))),
            Strategy::Path => Ok(Criterion::Path(Pattern::new(
                expected.as_str().ok_or_else(invalid)?,
            ))),
            Strategy::OrderIndex => Ok(Criterion::OrderIndex(
                expected.as_u64().ok_or_else(invalid)?,
            )),
            Strategy::Properties => Ok(Criterion::Properties(
                expected.as_object().ok_or_else(invalid)?.clone(),
            )),
        }
    }
}

/// A compiled query attribute, checked against one node at a time.
enum Criterion {
    Type(Pattern),
    Path(Pattern),
    OrderIndex(u64),
    Properties(serde_json::Map<String, Value>),
}

impl Criterion {
    fn matches<G: HostGraph + ?Sized>(&self, graph: &G, node: NodeId) -> bool {
        match self {
            Criterion::Type(pattern) => graph
                .type_name(node)
                .map(|t| pattern.matches(t))
                .unwrap_or(false),
            Criterion::Path(pattern) => path_of(graph, node)
                .map(|p| pattern.matches(&p))
                .unwrap_or(false),
            Criterion::OrderIndex(expected) => {
                order_index(graph, node).map(|i| i as u64) == Some(*expected)
            }
            Criterion::Properties(expected) => expected
                .iter()
                .all(|(name, value)| graph.property(node, name).as_ref() == Some(value)),
        }
    }
}

/// Literal string that doubles as a full-match regex when it compiles.
struct Pattern {
    literal: String,
    regex: Option<Regex>,
}

impl Pattern {
    fn new(text: &str) -> Self {
        Self {
            literal: text.to_string(),
            regex: Regex::new(&format!("^(?:{text})$")).ok(),
        }
    }

    fn matches(&self, subject: &str) -> bool {
        subject == self.literal || self.regex.as_ref().is_some_and(|r| r.is_match(subject))
    }
}

/// Slash-joined path from the root down to `node`.
///
/// Each segment is the node's non-empty `name` property, or its type name.
fn path_of<G: HostGraph + ?Sized>(graph: &G, node: NodeId) -> Option<String> {
    if !graph.is_alive(node) {
        return None;
    }
    let mut segments = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        segments.push(segment_name(graph, n)?);
        current = graph.parent(n);
    }
    segments.reverse();
    Some(segments.join("/"))
}

fn segment_name<G: HostGraph + ?Sized>(graph: &G, node: NodeId) -> Option<String> {
    match graph.property(node, "name") {
        Some(Value::String(name)) if !name.is_empty() => Some(name),
        _ => graph.type_name(node).map(str::to_string),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Property registry
// ─────────────────────────────────────────────────────────────────────────────

/// Which properties identify a node of a given type.
#[derive(Debug, Clone)]
pub struct PropertyRegistry {
    by_type: HashMap<String, Vec<String>>,
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("Button", ["text", "checkable", "checked"]);
        registry.register("CheckBox", ["text", "checked"]);
        registry.register("RadioButton", ["text", "checked"]);
        registry.register("TextField", ["text", "placeholder", "read_only"]);
        registry.register("TextArea", ["text", "read_only"]);
        registry.register("Label", ["text"]);
        registry.register("Menu", ["title"]);
        registry.register("ComboBox", ["current_index", "current_text", "count"]);
        registry.register("Slider", ["value", "minimum", "maximum"]);
        registry.register("ProgressBar", ["value", "minimum", "maximum"]);
        registry.register("TabView", ["current_index", "count"]);
        registry.register("Table", ["rows", "columns"]);
        registry
    }
}

impl PropertyRegistry {
    /// A registry tracking only the base properties.
    pub fn empty() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }

    /// Adds type-specific properties on top of the base set.
    pub fn register<I, S>(&mut self, type_name: &str, properties: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.by_type.entry(type_name.to_string()).or_default();
        for property in properties {
            let property = property.into();
            if !entry.contains(&property) {
                entry.push(property);
            }
        }
    }

    /// Base properties followed by the type-specific ones.
    pub fn tracked(&self, type_name: &str) -> Vec<&str> {
        let mut names: Vec<&str> = BASE_PROPERTIES.to_vec();
        if let Some(extra) = self.by_type.get(type_name) {
            names.extend(
                extra
                    .iter()
                    .map(String::as_str)
                    .filter(|p| !BASE_PROPERTIES.contains(p)),
            );
        }
        names
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Searcher
// ─────────────────────────────────────────────────────────────────────────────

/// Describes nodes as queries and resolves queries back to nodes.
#[derive(Debug, Clone)]
pub struct Searcher {
    strategies: Vec<Strategy>,
    registry: PropertyRegistry,
}

impl Default for Searcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Searcher {
    /// A searcher using every strategy and the default property registry.
    pub fn new() -> Self {
        Self::with_strategies(Strategy::ALL.to_vec(), PropertyRegistry::default())
    }

    pub fn with_strategies(strategies: Vec<Strategy>, registry: PropertyRegistry) -> Self {
        Self {
            strategies,
            registry,
        }
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PropertyRegistry {
        &mut self.registry
    }

    /// Builds the descriptor of `node`. A dead node yields the empty query.
    pub fn describe<G: HostGraph + ?Sized>(&self, graph: &G, node: NodeId) -> Query {
        let mut query = Query::new();
        if !graph.is_alive(node) {
            return query;
        }
        for strategy in &self.strategies {
            if let Some(value) = strategy.describe(graph, &self.registry, node) {
                query.insert(strategy.key(), value);
            }
        }
        query
    }

    /// All live nodes matching `query`, in breadth-first order.
    ///
    /// The empty query matches every node. Attributes no strategy owns are
    /// rejected.
    pub fn resolve<G: HostGraph + ?Sized>(&self, graph: &G, query: &Query) -> Result<Vec<NodeId>> {
        let criteria = self.compile(query)?;
        let matches: Vec<NodeId> = walk_breadth_first(graph, graph.roots())
            .into_iter()
            .filter(|node| criteria.iter().all(|c| c.matches(graph, *node)))
            .collect();
        debug!("query {} matched {} objects", query, matches.len());
        Ok(matches)
    }

    /// The single node matching `query`.
    pub fn resolve_one<G: HostGraph + ?Sized>(&self, graph: &G, query: &Query) -> Result<NodeId> {
        let matches = self.resolve(graph, query)?;
        match matches.as_slice() {
            [] => Err(Error::NotFound(query.to_string())),
            [node] => Ok(*node),
            _ => Err(Error::Ambiguous {
                query: query.to_string(),
                count: matches.len(),
            }),
        }
    }

    fn compile(&self, query: &Query) -> Result<Vec<Criterion>> {
        let mut criteria = Vec::new();
        for (key, value) in query.attributes() {
            let strategy = self
                .strategies
                .iter()
                .find(|s| s.key() == key)
                .ok_or_else(|| Error::InvalidArgument(format!("unsupported attribute {key:?}")))?;
            criteria.push(strategy.compile(value)?);
        }
        Ok(criteria)
    }
}
