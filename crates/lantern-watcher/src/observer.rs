//! Polling structural observer.
//!
//! `GraphDiffObserver` keeps a cache of every node in its scope together
//! with the descriptor and parent it had at the last tick. Each tick walks
//! the live graph and reconciles it with the cache in four fixed phases:
//!
//! 1. destroyed: cached nodes that are dead or left the scope, deepest first
//! 2. created: live nodes missing from the cache, parents first
//! 3. renamed: nodes whose descriptor changed
//! 4. reparented: nodes whose tracked parent changed
//!
//! A node that is created and destroyed between two ticks is never seen.

use crate::channel::ChangeEventChannel;
use crate::event::ChangeEvent;
use lantern_core::{walk_breadth_first, HostGraph, NodeId, Query, Searcher};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Cached state of one observed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedNode {
    pub descriptor: Query,
    pub node: NodeId,
    /// Parent at the last tick, if that parent is tracked too.
    pub parent: Option<NodeId>,
}

/// Detects structural changes by diffing snapshots of the host graph.
pub struct GraphDiffObserver {
    scope: Option<NodeId>,
    channel: Arc<ChangeEventChannel>,
    tracked: HashMap<NodeId, TrackedNode>,
    observing: bool,
}

impl GraphDiffObserver {
    /// Observes the whole graph.
    pub fn new(channel: Arc<ChangeEventChannel>) -> Self {
        Self::scoped(None, channel)
    }

    /// Observes the subtree under `scope`, or the whole graph for `None`.
    pub fn scoped(scope: Option<NodeId>, channel: Arc<ChangeEventChannel>) -> Self {
        Self {
            scope,
            channel,
            tracked: HashMap::new(),
            observing: false,
        }
    }

    pub fn scope(&self) -> Option<NodeId> {
        self.scope
    }

    pub fn channel(&self) -> &Arc<ChangeEventChannel> {
        &self.channel
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    /// Number of cached nodes.
    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    pub fn tracked(&self, node: NodeId) -> Option<&TrackedNode> {
        self.tracked.get(&node)
    }

    /// Snapshots the scope and starts observing. No-op if already observing.
    pub fn start<G: HostGraph + ?Sized>(&mut self, graph: &G, searcher: &Searcher) {
        if self.observing {
            return;
        }
        self.tracked.clear();
        for node in self.live_order(graph) {
            let parent = self.tracked_parent(graph, node);
            self.tracked.insert(
                node,
                TrackedNode {
                    descriptor: searcher.describe(graph, node),
                    node,
                    parent,
                },
            );
        }
        self.observing = true;
        info!("observer started, tracking {} objects", self.tracked.len());
    }

    /// Stops observing and drops the cache. No events are synthesized.
    pub fn stop(&mut self) {
        if !self.observing {
            return;
        }
        self.tracked.clear();
        self.observing = false;
        info!("observer stopped");
    }

    /// Reconciles the cache with the live graph, pushing one event per
    /// change. Returns the number of events emitted.
    pub fn tick<G: HostGraph + ?Sized>(&mut self, graph: &G, searcher: &Searcher) -> usize {
        if !self.observing {
            return 0;
        }
        let live = self.live_order(graph);
        let mut emitted = 0;

        emitted += self.sweep_destroyed(&live);
        emitted += self.collect_created(graph, searcher, &live);
        emitted += self.detect_renamed(graph, searcher, &live);
        emitted += self.detect_reparented(graph, &live);

        if emitted > 0 {
            debug!("observer tick emitted {} events", emitted);
        }
        emitted
    }

    // ─────────────────────────────────────────────────────────────────────
    // Phases
    // ─────────────────────────────────────────────────────────────────────

    fn sweep_destroyed(&mut self, live: &[NodeId]) -> usize {
        let live: HashSet<NodeId> = live.iter().copied().collect();
        let doomed: HashSet<NodeId> = self
            .tracked
            .keys()
            .filter(|n| !live.contains(n))
            .copied()
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        let mut order: Vec<NodeId> = self
            .cached_order()
            .into_iter()
            .filter(|n| doomed.contains(n))
            .collect();
        order.reverse();

        for node in &order {
            if let Some(entry) = self.tracked.remove(node) {
                self.emit(ChangeEvent::Removed {
                    object: entry.descriptor,
                });
            }
        }

        // Survivors whose cached parent just went away are re-linked in the
        // reparent phase.
        for entry in self.tracked.values_mut() {
            if entry.parent.is_some_and(|p| doomed.contains(&p)) {
                entry.parent = None;
            }
        }

        order.len()
    }

    fn collect_created<G: HostGraph + ?Sized>(
        &mut self,
        graph: &G,
        searcher: &Searcher,
        live: &[NodeId],
    ) -> usize {
        let mut emitted = 0;
        for &node in live {
            if self.tracked.contains_key(&node) {
                continue;
            }
            let parent = self.tracked_parent(graph, node);
            let parent_descriptor = parent
                .and_then(|p| self.tracked.get(&p))
                .map(|p| p.descriptor.clone())
                .unwrap_or_default();
            let descriptor = searcher.describe(graph, node);

            self.tracked.insert(
                node,
                TrackedNode {
                    descriptor: descriptor.clone(),
                    node,
                    parent,
                },
            );
            self.emit(ChangeEvent::Added {
                object: descriptor,
                parent: parent_descriptor,
            });
            emitted += 1;
        }
        emitted
    }

    fn detect_renamed<G: HostGraph + ?Sized>(
        &mut self,
        graph: &G,
        searcher: &Searcher,
        live: &[NodeId],
    ) -> usize {
        let mut renamed = Vec::new();
        for &node in live {
            let current = searcher.describe(graph, node);
            if let Some(entry) = self.tracked.get_mut(&node) {
                if entry.descriptor != current {
                    let old = std::mem::replace(&mut entry.descriptor, current.clone());
                    renamed.push(ChangeEvent::Renamed {
                        old_object: old,
                        new_object: current,
                    });
                }
            }
        }
        let emitted = renamed.len();
        for event in renamed {
            self.emit(event);
        }
        emitted
    }

    fn detect_reparented<G: HostGraph + ?Sized>(&mut self, graph: &G, live: &[NodeId]) -> usize {
        let mut emitted = 0;
        for &node in live {
            let current = self.tracked_parent(graph, node);
            let Some(entry) = self.tracked.get(&node) else {
                continue;
            };
            if entry.parent == current {
                continue;
            }
            let object = entry.descriptor.clone();
            let parent = current
                .and_then(|p| self.tracked.get(&p))
                .map(|p| p.descriptor.clone())
                .unwrap_or_default();
            if let Some(entry) = self.tracked.get_mut(&node) {
                entry.parent = current;
            }
            self.emit(ChangeEvent::Reparented { object, parent });
            emitted += 1;
        }
        emitted
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    /// Live nodes in scope, breadth-first.
    fn live_order<G: HostGraph + ?Sized>(&self, graph: &G) -> Vec<NodeId> {
        match self.scope {
            Some(root) => walk_breadth_first(graph, [root]),
            None => walk_breadth_first(graph, graph.roots()),
        }
    }

    /// The live parent of `node`, if it is tracked.
    fn tracked_parent<G: HostGraph + ?Sized>(&self, graph: &G, node: NodeId) -> Option<NodeId> {
        if Some(node) == self.scope {
            return None;
        }
        graph.parent(node).filter(|p| self.tracked.contains_key(p))
    }

    /// Breadth-first order of the cache, following cached parent links.
    /// Siblings are visited by ascending id.
    fn cached_order(&self) -> Vec<NodeId> {
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut roots = Vec::new();
        for entry in self.tracked.values() {
            match entry.parent.filter(|p| self.tracked.contains_key(p)) {
                Some(parent) => children.entry(parent).or_default().push(entry.node),
                None => roots.push(entry.node),
            }
        }
        roots.sort();
        for siblings in children.values_mut() {
            siblings.sort();
        }

        let mut order = Vec::with_capacity(self.tracked.len());
        let mut queue: VecDeque<NodeId> = roots.into();
        while let Some(node) = queue.pop_front() {
            order.push(node);
            if let Some(kids) = children.get(&node) {
                queue.extend(kids.iter().copied());
            }
        }
        order
    }

    fn emit(&self, event: ChangeEvent) {
        debug!("{} event", event.kind());
        self.channel.push(event);
    }
}
