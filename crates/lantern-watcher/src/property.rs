//! Polling observer for a single node's properties.

use crate::channel::PropertyEventChannel;
use crate::event::PropertyEvent;
use lantern_core::{HostGraph, NodeId, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    value: Value,
    read_only: bool,
}

/// Reports properties appearing, disappearing and changing value on one
/// node. Once the node dies the observer goes quiet and closes its channel.
pub struct PropertyObserver {
    target: NodeId,
    channel: Arc<PropertyEventChannel>,
    snapshot: BTreeMap<String, Snapshot>,
    alive: bool,
}

impl PropertyObserver {
    /// Snapshots `target` without emitting anything.
    pub fn new<G: HostGraph + ?Sized>(
        graph: &G,
        target: NodeId,
        channel: Arc<PropertyEventChannel>,
    ) -> Self {
        Self {
            target,
            channel,
            snapshot: read_properties(graph, target),
            alive: graph.is_alive(target),
        }
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn target_alive(&self) -> bool {
        self.alive
    }

    pub fn channel(&self) -> &Arc<PropertyEventChannel> {
        &self.channel
    }

    /// Re-snapshots the target silently, e.g. after observation was paused.
    /// A target that died in the meantime closes the channel.
    pub fn resync<G: HostGraph + ?Sized>(&mut self, graph: &G) {
        self.snapshot = read_properties(graph, self.target);
        if !graph.is_alive(self.target) {
            self.mark_dead();
        }
    }

    fn mark_dead(&mut self) {
        if self.alive {
            debug!("property observer target {} died", self.target);
        }
        self.alive = false;
        self.channel.close();
    }

    /// Re-reads the target and emits removals, additions and updates, in
    /// that order. Returns the number of events emitted.
    pub fn tick<G: HostGraph + ?Sized>(&mut self, graph: &G) -> usize {
        // Ids are never reused, so a dead target stays dead.
        if !graph.is_alive(self.target) {
            self.mark_dead();
            return 0;
        }

        let current = read_properties(graph, self.target);
        let mut events = Vec::new();

        for name in self.snapshot.keys() {
            if !current.contains_key(name) {
                events.push(PropertyEvent::Removed {
                    property: name.clone(),
                });
            }
        }
        for (name, now) in &current {
            if !self.snapshot.contains_key(name) {
                events.push(PropertyEvent::Added {
                    property: name.clone(),
                    value: now.value.clone(),
                    read_only: now.read_only,
                });
            }
        }
        for (name, now) in &current {
            if let Some(before) = self.snapshot.get(name) {
                if before.value != now.value {
                    events.push(PropertyEvent::Updated {
                        property: name.clone(),
                        old_value: before.value.clone(),
                        new_value: now.value.clone(),
                    });
                }
            }
        }

        self.snapshot = current;
        let emitted = events.len();
        for event in events {
            self.channel.push(event);
        }
        emitted
    }
}

fn read_properties<G: HostGraph + ?Sized>(graph: &G, node: NodeId) -> BTreeMap<String, Snapshot> {
    graph
        .property_names(node)
        .into_iter()
        .filter_map(|name| {
            let value = graph.property(node, &name)?;
            let read_only = graph.is_read_only(node, &name);
            Some((name, Snapshot { value, read_only }))
        })
        .collect()
}
