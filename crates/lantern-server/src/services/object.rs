//! Object service: tree reads, lookups, property access and change streams.

use crate::call::{CompletionWaker, StreamHandler, StreamItem, UnaryHandler};
use crate::context::{HostContext, ObserverId};
use crate::protocol::Status;
use lantern_core::{HostGraph, MethodInfo, NodeId, Query, Searcher, Value};
use lantern_watcher::{
    ChangeEvent, ChangeEventChannel, GraphDiffObserver, PropertyEvent, PropertyEventChannel,
    PropertyObserver,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Params and results
// ─────────────────────────────────────────────────────────────────────────────

/// Optional subtree root. Absent or empty means the whole graph.
#[derive(Debug, Default, Deserialize)]
pub struct RootParams {
    #[serde(default)]
    pub root: Option<Query>,
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub query: Query,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePropertyParams {
    pub object: Query,
    pub property: String,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct CallMethodParams {
    pub object: Query,
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

/// One node of a `object.getTree` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub object: Query,
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Serialize)]
pub struct TreeResult {
    pub roots: Vec<TreeNode>,
}

#[derive(Debug, Serialize)]
pub struct ObjectResult {
    pub object: Query,
}

#[derive(Debug, Serialize)]
pub struct ObjectsResult {
    pub objects: Vec<Query>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub name: String,
    pub value: Value,
    pub read_only: bool,
}

#[derive(Debug, Serialize)]
pub struct PropertiesResult {
    pub properties: Vec<PropertyInfo>,
}

#[derive(Debug, Serialize)]
pub struct MethodsResult {
    pub methods: Vec<MethodInfo>,
}

#[derive(Debug, Serialize)]
pub struct CallResult {
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct Empty {}

fn resolve_one(cx: &HostContext, query: &Query) -> Result<NodeId, Status> {
    Ok(cx.searcher.resolve_one(cx.graph(), query)?)
}

fn scope_of(cx: &HostContext, root: &Option<Query>) -> Result<Option<NodeId>, Status> {
    match root {
        Some(query) if !query.is_empty() => resolve_one(cx, query).map(Some),
        _ => Ok(None),
    }
}

/// Builds nested tree nodes below `starts` without recursion.
///
/// Nodes are collected breadth-first with the position of their parent,
/// then folded back-to-front: by the time a node is reached, all of its
/// children (which come later in the order) are already attached.
pub fn build_tree<G: HostGraph + ?Sized>(
    graph: &G,
    searcher: &Searcher,
    starts: Vec<NodeId>,
) -> Vec<TreeNode> {
    let mut order: Vec<(NodeId, Option<usize>)> = starts
        .into_iter()
        .filter(|n| graph.is_alive(*n))
        .map(|n| (n, None))
        .collect();
    let mut cursor = 0;
    while cursor < order.len() {
        let (node, _) = order[cursor];
        for child in graph.children(node) {
            order.push((child, Some(cursor)));
        }
        cursor += 1;
    }

    let mut built: Vec<TreeNode> = order
        .iter()
        .map(|(node, _)| TreeNode {
            object: searcher.describe(graph, *node),
            children: Vec::new(),
        })
        .collect();

    let mut roots = Vec::new();
    for position in (0..order.len()).rev() {
        let mut node = std::mem::take(&mut built[position]);
        node.children.reverse();
        match order[position].1 {
            Some(parent) => built[parent].children.push(node),
            None => roots.push(node),
        }
    }
    roots.reverse();
    roots
}

// ─────────────────────────────────────────────────────────────────────────────
// Unary methods
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct GetTree;

impl UnaryHandler for GetTree {
    const METHOD: &'static str = "object.getTree";
    type Context = HostContext;
    type Request = RootParams;
    type Response = TreeResult;

    fn process(&self, cx: &mut HostContext, request: RootParams) -> Result<TreeResult, Status> {
        let starts = match scope_of(cx, &request.root)? {
            Some(root) => vec![root],
            None => cx.graph().roots(),
        };
        Ok(TreeResult {
            roots: build_tree(cx.graph(), &cx.searcher, starts),
        })
    }
}

#[derive(Default)]
pub struct Find;

impl UnaryHandler for Find {
    const METHOD: &'static str = "object.find";
    type Context = HostContext;
    type Request = QueryParams;
    type Response = ObjectsResult;

    fn process(&self, cx: &mut HostContext, request: QueryParams) -> Result<ObjectsResult, Status> {
        let graph = cx.graph();
        let objects = cx
            .searcher
            .resolve(graph, &request.query)?
            .into_iter()
            .map(|node| cx.searcher.describe(graph, node))
            .collect();
        Ok(ObjectsResult { objects })
    }
}

#[derive(Default)]
pub struct GetParent;

impl UnaryHandler for GetParent {
    const METHOD: &'static str = "object.getParent";
    type Context = HostContext;
    type Request = QueryParams;
    type Response = ObjectResult;

    fn process(&self, cx: &mut HostContext, request: QueryParams) -> Result<ObjectResult, Status> {
        let node = resolve_one(cx, &request.query)?;
        let object = cx
            .graph()
            .parent(node)
            .map(|parent| cx.searcher.describe(cx.graph(), parent))
            .unwrap_or_default();
        Ok(ObjectResult { object })
    }
}

#[derive(Default)]
pub struct GetChildren;

impl UnaryHandler for GetChildren {
    const METHOD: &'static str = "object.getChildren";
    type Context = HostContext;
    type Request = QueryParams;
    type Response = ObjectsResult;

    fn process(&self, cx: &mut HostContext, request: QueryParams) -> Result<ObjectsResult, Status> {
        let node = resolve_one(cx, &request.query)?;
        let graph = cx.graph();
        let objects = graph
            .children(node)
            .into_iter()
            .map(|child| cx.searcher.describe(graph, child))
            .collect();
        Ok(ObjectsResult { objects })
    }
}

#[derive(Default)]
pub struct GetProperties;

impl UnaryHandler for GetProperties {
    const METHOD: &'static str = "object.getProperties";
    type Context = HostContext;
    type Request = QueryParams;
    type Response = PropertiesResult;

    fn process(
        &self,
        cx: &mut HostContext,
        request: QueryParams,
    ) -> Result<PropertiesResult, Status> {
        let node = resolve_one(cx, &request.query)?;
        let graph = cx.graph();
        let properties = graph
            .property_names(node)
            .into_iter()
            .filter_map(|name| {
                let value = graph.property(node, &name)?;
                let read_only = graph.is_read_only(node, &name);
                Some(PropertyInfo {
                    name,
                    value,
                    read_only,
                })
            })
            .collect();
        Ok(PropertiesResult { properties })
    }
}

#[derive(Default)]
pub struct UpdateProperty;

impl UnaryHandler for UpdateProperty {
    const METHOD: &'static str = "object.updateProperty";
    type Context = HostContext;
    type Request = UpdatePropertyParams;
    type Response = Empty;

    fn process(
        &self,
        cx: &mut HostContext,
        request: UpdatePropertyParams,
    ) -> Result<Empty, Status> {
        let node = resolve_one(cx, &request.object)?;
        cx.graph_mut()
            .set_property(node, &request.property, request.value)?;
        debug!("updated {} on {}", request.property, node);
        Ok(Empty {})
    }
}

#[derive(Default)]
pub struct GetMethods;

impl UnaryHandler for GetMethods {
    const METHOD: &'static str = "object.getMethods";
    type Context = HostContext;
    type Request = QueryParams;
    type Response = MethodsResult;

    fn process(&self, cx: &mut HostContext, request: QueryParams) -> Result<MethodsResult, Status> {
        let node = resolve_one(cx, &request.query)?;
        Ok(MethodsResult {
            methods: cx.graph().methods(node),
        })
    }
}

#[derive(Default)]
pub struct CallMethod;

impl UnaryHandler for CallMethod {
    const METHOD: &'static str = "object.callMethod";
    type Context = HostContext;
    type Request = CallMethodParams;
    type Response = CallResult;

    fn process(&self, cx: &mut HostContext, request: CallMethodParams) -> Result<CallResult, Status> {
        let node = resolve_one(cx, &request.object)?;
        let result = cx
            .graph_mut()
            .call_method(node, &request.method, request.arguments)?;
        debug!("called {} on {}", request.method, node);
        Ok(CallResult { result })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streams
// ─────────────────────────────────────────────────────────────────────────────

/// Streams structural changes of the whole graph or of one subtree.
#[derive(Default)]
pub struct ListenTreeChanges {
    registration: Option<(ObserverId, Arc<ChangeEventChannel>)>,
}

impl ListenTreeChanges {
    fn register(
        &mut self,
        cx: &mut HostContext,
        request: &RootParams,
    ) -> Result<Arc<ChangeEventChannel>, Status> {
        let scope = scope_of(cx, &request.root)?;
        let channel = Arc::new(ChangeEventChannel::new());
        let observer = GraphDiffObserver::scoped(scope, channel.clone());
        let id = cx
            .observers
            .add_tree(observer, cx.graph.as_ref(), &cx.searcher);
        info!("tree change listener {:?} registered", id);
        self.registration = Some((id, channel.clone()));
        Ok(channel)
    }
}

impl StreamHandler for ListenTreeChanges {
    const METHOD: &'static str = "object.listenTreeChanges";
    type Context = HostContext;
    type Request = RootParams;
    type Item = ChangeEvent;

    fn process(
        &mut self,
        cx: &mut HostContext,
        request: &RootParams,
    ) -> Option<StreamItem<ChangeEvent>> {
        let channel = match &self.registration {
            Some((_, channel)) => channel.clone(),
            None => match self.register(cx, request) {
                Ok(channel) => channel,
                Err(status) => return Some(StreamItem::Finish(status)),
            },
        };
        if channel.is_empty() {
            None
        } else {
            Some(StreamItem::Message(channel.pop()))
        }
    }

    fn arm_wakeup(&mut self, _cx: &mut HostContext, waker: CompletionWaker) {
        if let Some((_, channel)) = &self.registration {
            channel.set_waker(move || waker.wake());
        }
    }

    fn on_finish(&mut self, cx: &mut HostContext) {
        if let Some((id, channel)) = self.registration.take() {
            channel.close();
            cx.observers.remove_tree(id);
            info!("tree change listener {:?} released", id);
        }
    }
}

/// Streams property changes of one object. Ends with `NotFound` when the
/// object is destroyed.
#[derive(Default)]
pub struct ListenPropertyChanges {
    registration: Option<(ObserverId, Arc<PropertyEventChannel>)>,
}

impl ListenPropertyChanges {
    fn register(
        &mut self,
        cx: &mut HostContext,
        request: &QueryParams,
    ) -> Result<Arc<PropertyEventChannel>, Status> {
        let node = resolve_one(cx, &request.query)?;
        let channel = Arc::new(PropertyEventChannel::new());
        let observer = PropertyObserver::new(cx.graph(), node, channel.clone());
        let id = cx.observers.add_property(observer);
        self.registration = Some((id, channel.clone()));
        Ok(channel)
    }
}

impl StreamHandler for ListenPropertyChanges {
    const METHOD: &'static str = "object.listenPropertyChanges";
    type Context = HostContext;
    type Request = QueryParams;
    type Item = PropertyEvent;

    fn process(
        &mut self,
        cx: &mut HostContext,
        request: &QueryParams,
    ) -> Option<StreamItem<PropertyEvent>> {
        let channel = match &self.registration {
            Some((_, channel)) => channel.clone(),
            None => match self.register(cx, request) {
                Ok(channel) => channel,
                Err(status) => return Some(StreamItem::Finish(status)),
            },
        };
        if !channel.is_empty() {
            return Some(StreamItem::Message(channel.pop()));
        }
        if channel.is_closed() {
            return Some(StreamItem::Finish(Status::not_found(format!(
                "object {} was destroyed",
                request.query
            ))));
        }
        None
    }

    fn arm_wakeup(&mut self, _cx: &mut HostContext, waker: CompletionWaker) {
        if let Some((_, channel)) = &self.registration {
            channel.set_waker(move || waker.wake());
        }
    }

    fn on_finish(&mut self, cx: &mut HostContext) {
        if let Some((id, channel)) = self.registration.take() {
            channel.close();
            cx.observers.remove_property(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_graph::{NodeSpec, TreeBuilder};

    #[test]
    fn test_build_tree_preserves_order() {
        let tree = TreeBuilder::new()
            .root(
                NodeSpec::new("Window")
                    .named("Main")
                    .child(NodeSpec::new("Panel").child(NodeSpec::new("Button").named("ok")))
                    .child(NodeSpec::new("Label").named("status")),
            )
            .root(NodeSpec::new("Dialog"))
            .build()
            .unwrap();
        let searcher = Searcher::new();

        let roots = build_tree(&tree, &searcher, tree.roots());
        assert_eq!(roots.len(), 2);
        let main = &roots[0];
        assert_eq!(main.object.get("path"), Some(&Value::from("Main")));
        assert_eq!(main.children.len(), 2);
        assert_eq!(
            main.children[0].object.get("path"),
            Some(&Value::from("Main/Panel"))
        );
        assert_eq!(
            main.children[0].children[0].object.get("path"),
            Some(&Value::from("Main/Panel/ok"))
        );
        assert_eq!(
            main.children[1].object.get("path"),
            Some(&Value::from("Main/status"))
        );
        assert!(roots[1].children.is_empty());
    }
}
