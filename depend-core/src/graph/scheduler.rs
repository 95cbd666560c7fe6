//! Update Scheduler
//!
//! The scheduler owns the two traversals that walk the dependents edges:
//!
//! 1. Dirty propagation. When a node is written, its dependents are marked
//!    dirty breadth-first. Only nodes whose active rule computes a value are
//!    dirtied (and propagated through); leaves and authoritative synchronizer
//!    members absorb the broadcast. Nothing is recomputed here: values are
//!    pulled lazily by `Graph::get`.
//!
//! 2. Validation. A topological sort (Kahn's algorithm) over the plain edges
//!    reports wiring cycles at startup, before the simulation loop runs.

use std::collections::VecDeque;

use slotmap::{SecondaryMap, SlotMap};

use super::node::{Node, NodeId, Rule};
use super::sync::{SyncId, Synchronizer};

/// Whether `id`'s active rule computes its value from other nodes.
pub(crate) fn computes(id: NodeId, node: &Node, syncs: &SlotMap<SyncId, Synchronizer>) -> bool {
    match node.rule() {
        Rule::Leaf => false,
        Rule::Compute(_) | Rule::Pipe(_) => true,
        Rule::Synced(group) => syncs.get(*group).is_some_and(|s| s.authority() != id),
    }
}

/// Reusable scratch space for graph traversals.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    queue: VecDeque<NodeId>,
    visited: SecondaryMap<NodeId, ()>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the transitive computing dependents of `sources` dirty.
    ///
    /// The sources themselves are not touched. Returns the number of nodes
    /// visited and dirtied.
    pub fn mark_changed(
        &mut self,
        nodes: &mut SlotMap<NodeId, Node>,
        syncs: &SlotMap<SyncId, Synchronizer>,
        sources: &[NodeId],
    ) -> usize {
        self.queue.clear();
        self.visited.clear();

        for &source in sources {
            self.visited.insert(source, ());
        }
        for &source in sources {
            if let Some(node) = nodes.get(source) {
                self.queue.extend(node.dependents().iter().copied());
            }
        }

        let mut dirtied = 0;
        while let Some(id) = self.queue.pop_front() {
            if self.visited.insert(id, ()).is_some() {
                continue;
            }
            let Some(node) = nodes.get_mut(id) else {
                continue;
            };
            if !computes(id, node, syncs) {
                continue;
            }
            node.mark_dirty();
            dirtied += 1;
            self.queue.extend(node.dependents().iter().copied());
        }

        dirtied
    }

    /// Topological order of all nodes over the plain edges (inputs before
    /// the nodes that read them).
    ///
    /// On failure returns the nodes that could not be ordered; every cycle
    /// lies within that set.
    pub fn topological_order(
        &mut self,
        nodes: &SlotMap<NodeId, Node>,
    ) -> Result<Vec<NodeId>, Vec<NodeId>> {
        let mut in_degree: SecondaryMap<NodeId, usize> = SecondaryMap::new();
        for id in nodes.keys() {
            in_degree.insert(id, 0);
        }
        for node in nodes.values() {
            for &dependent in node.dependents() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree += 1;
                }
            }
        }

        self.queue.clear();
        self.queue
            .extend(in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| id));

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(id) = self.queue.pop_front() {
            order.push(id);
            for &dependent in nodes[id].dependents() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        self.queue.push_back(dependent);
                    }
                }
            }
        }

        if order.len() == nodes.len() {
            Ok(order)
        } else {
            Err(in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(id, _)| id)
                .collect())
        }
    }
}
