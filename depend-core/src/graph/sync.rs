//! Synchronizers
//!
//! A synchronizer groups nodes that encode the same physical quantity in
//! different coordinate systems (bead positions and their normal modes, for
//! instance). Exactly one member is authoritative; every other member is
//! derived from it on demand.
//!
//! Writing a member only moves the authority pointer and dirties the other
//! members. Nothing is recomputed eagerly, so writing X and then Y before
//! anyone reads the X-derived value simply discards it: last writer wins.

use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::error::{DependError, Result};

use super::binding::{Binding, Derivation};
use super::node::NodeId;

new_key_type! {
    /// Handle to a synchronizer group.
    pub struct SyncId;
}

/// A group of alternate representations with a single authoritative member.
#[derive(Debug)]
pub struct Synchronizer {
    members: SmallVec<[NodeId; 4]>,

    /// `table[target][source]`, indexed by member position. The diagonal is
    /// always empty.
    table: Vec<Vec<Option<Binding>>>,

    authority: NodeId,

    /// (target, extra input) pairs collected from the derivations.
    extra_edges: Vec<(NodeId, NodeId)>,

    /// Whether the initial authority was declared with `update_man`.
    declared: bool,
}

impl Synchronizer {
    /// Build a group. Every ordered pair of distinct members needs a
    /// derivation; `initial` becomes the authority.
    pub fn new(members: &[NodeId], derivations: Vec<Derivation>, initial: NodeId) -> Result<Self> {
        if members.len() < 2 {
            return Err(DependError::SynchronizerConflict {
                reason: format!("a synchronizer needs at least two members, got {}", members.len()),
            });
        }
        for (i, m) in members.iter().enumerate() {
            if members[..i].contains(m) {
                return Err(DependError::SynchronizerConflict {
                    reason: "a node is listed twice in the same synchronizer".to_string(),
                });
            }
        }
        if !members.contains(&initial) {
            return Err(DependError::SynchronizerConflict {
                reason: "the initial authority is not a member".to_string(),
            });
        }

        let n = members.len();
        let mut table: Vec<Vec<Option<Binding>>> = vec![vec![None; n]; n];
        let mut extra_edges = Vec::new();
        let position = |node: NodeId| members.iter().position(|m| *m == node);

        for derivation in derivations {
            let (Some(t), Some(s)) = (position(derivation.target), position(derivation.source)) else {
                return Err(DependError::SynchronizerConflict {
                    reason: "a derivation refers to a node outside the group".to_string(),
                });
            };
            if t == s {
                return Err(DependError::SynchronizerConflict {
                    reason: "a member cannot be derived from itself".to_string(),
                });
            }
            for &input in derivation.extra_inputs() {
                extra_edges.push((derivation.target, input));
            }
            table[t][s] = Some(derivation.binding);
        }

        Ok(Self {
            members: members.iter().copied().collect(),
            table,
            authority: initial,
            extra_edges,
            declared: false,
        })
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }

    fn position(&self, node: NodeId) -> Option<usize> {
        self.members.iter().position(|m| *m == node)
    }

    /// Ordered (target, source) pairs with no derivation.
    pub fn missing_pairs(&self) -> Vec<(NodeId, NodeId)> {
        let mut missing = Vec::new();
        for (t, row) in self.table.iter().enumerate() {
            for (s, cell) in row.iter().enumerate() {
                if t != s && cell.is_none() {
                    missing.push((self.members[t], self.members[s]));
                }
            }
        }
        missing
    }

    pub fn authority(&self) -> NodeId {
        self.authority
    }

    pub(crate) fn set_authority(&mut self, node: NodeId) {
        debug_assert!(self.contains(node));
        self.authority = node;
    }

    /// Record the `update_man` declaration. Returns whether it had already
    /// been made.
    pub(crate) fn declare(&mut self) -> bool {
        std::mem::replace(&mut self.declared, true)
    }

    /// The binding deriving `target` from the current authority, or `None`
    /// when `target` is itself authoritative.
    pub fn active_derivation(&self, target: NodeId) -> Option<&Binding> {
        if target == self.authority {
            return None;
        }
        let t = self.position(target)?;
        let s = self.position(self.authority)?;
        self.table[t][s].as_ref()
    }

    /// Every (target, extra input) pair across all derivations. These are the
    /// plain edges the group contributes to the graph.
    pub fn extra_edges(&self) -> Vec<(NodeId, NodeId)> {
        self.extra_edges.clone()
    }
}
