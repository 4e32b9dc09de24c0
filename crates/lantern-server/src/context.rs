//! State owned by the owner thread.

use crate::call::{CallHost, CallRegistry};
use crate::owner::OwnerContext;
use crate::transport::Transport;
use lantern_core::{HostGraph, Searcher};
use lantern_watcher::{GraphDiffObserver, PropertyObserver};
use std::any::Any;
use std::collections::HashMap;
use tracing::info;

/// Identity of an observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Every active observer, plus the global on/off switch toggled by
/// `observer.start` and `observer.stop`.
///
/// While disabled, registered observers keep their registration but hold
/// no cache and emit nothing.
pub struct ObserverRegistry {
    enabled: bool,
    next_id: u64,
    tree: HashMap<ObserverId, GraphDiffObserver>,
    property: HashMap<ObserverId, PropertyObserver>,
}

impl ObserverRegistry {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            next_id: 0,
            tree: HashMap::new(),
            property: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn allocate(&mut self) -> ObserverId {
        self.next_id += 1;
        ObserverId(self.next_id)
    }

    /// Registers a structural observer, starting it if observation is on.
    pub fn add_tree<G: HostGraph + ?Sized>(
        &mut self,
        mut observer: GraphDiffObserver,
        graph: &G,
        searcher: &Searcher,
    ) -> ObserverId {
        if self.enabled {
            observer.start(graph, searcher);
        }
        let id = self.allocate();
        self.tree.insert(id, observer);
        id
    }

    pub fn remove_tree(&mut self, id: ObserverId) -> Option<GraphDiffObserver> {
        self.tree.remove(&id)
    }

    pub fn add_property(&mut self, observer: PropertyObserver) -> ObserverId {
        let id = self.allocate();
        self.property.insert(id, observer);
        id
    }

    pub fn remove_property(&mut self, id: ObserverId) -> Option<PropertyObserver> {
        self.property.remove(&id)
    }

    pub fn property(&self, id: ObserverId) -> Option<&PropertyObserver> {
        self.property.get(&id)
    }

    /// Number of registered observers of both kinds.
    pub fn len(&self) -> usize {
        self.tree.len() + self.property.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Turns observation on, snapshotting every observer. Returns `false`
    /// if it was already on.
    pub fn enable<G: HostGraph + ?Sized>(&mut self, graph: &G, searcher: &Searcher) -> bool {
        if self.enabled {
            return false;
        }
        for observer in self.tree.values_mut() {
            observer.start(graph, searcher);
        }
        for observer in self.property.values_mut() {
            observer.resync(graph);
        }
        self.enabled = true;
        info!("observation enabled ({} observers)", self.len());
        true
    }

    /// Turns observation off. Returns `false` if it was already off.
    pub fn disable(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        for observer in self.tree.values_mut() {
            observer.stop();
        }
        self.enabled = false;
        info!("observation disabled");
        true
    }

    /// Ticks every observer. Returns the number of events emitted.
    pub fn tick<G: HostGraph + ?Sized>(&mut self, graph: &G, searcher: &Searcher) -> usize {
        if !self.enabled {
            return 0;
        }
        let structural: usize = self
            .tree
            .values_mut()
            .map(|o| o.tick(graph, searcher))
            .sum();
        let properties: usize = self.property.values_mut().map(|o| o.tick(graph)).sum();
        structural + properties
    }
}

/// A host graph whose concrete type can be recovered by the embedder.
pub(crate) trait OwnedGraph: HostGraph {
    fn as_graph(&self) -> &dyn HostGraph;
    fn as_graph_mut(&mut self) -> &mut dyn HostGraph;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<G: HostGraph + Any> OwnedGraph for G {
    fn as_graph(&self) -> &dyn HostGraph {
        self
    }

    fn as_graph_mut(&mut self) -> &mut dyn HostGraph {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Everything the owner thread owns: the host graph, the query service,
/// the observers and the live calls.
pub struct HostContext {
    pub(crate) graph: Box<dyn OwnedGraph>,
    pub(crate) searcher: Searcher,
    pub(crate) observers: ObserverRegistry,
    calls: CallRegistry<HostContext>,
    transport: Transport,
}

impl HostContext {
    pub fn new<G: HostGraph + Any>(
        graph: G,
        searcher: Searcher,
        transport: Transport,
        observe_on_start: bool,
    ) -> Self {
        Self {
            graph: Box::new(graph),
            searcher,
            observers: ObserverRegistry::new(observe_on_start),
            calls: CallRegistry::new(),
            transport,
        }
    }

    pub fn graph(&self) -> &dyn HostGraph {
        self.graph.as_graph()
    }

    pub fn graph_mut(&mut self) -> &mut dyn HostGraph {
        self.graph.as_graph_mut()
    }

    /// The host graph as its concrete type, for the embedding application
    /// to change structure on the owner thread. `None` if `G` is not the
    /// type the context was built with.
    pub fn graph_as_mut<G: HostGraph + Any>(&mut self) -> Option<&mut G> {
        self.graph.as_any_mut().downcast_mut::<G>()
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn call_registry(&self) -> &CallRegistry<HostContext> {
        &self.calls
    }

    /// Ticks every observer against the current graph.
    pub fn tick(&mut self) -> usize {
        self.observers.tick(self.graph.as_ref(), &self.searcher)
    }
}

impl CallHost for HostContext {
    fn transport(&self) -> &Transport {
        &self.transport
    }

    fn calls(&mut self) -> &mut CallRegistry<Self> {
        &mut self.calls
    }
}

impl OwnerContext for HostContext {
    fn on_tick(&mut self) {
        self.tick();
    }
}
