//! Resolution Context
//!
//! The resolution stack tracks which nodes are currently being resolved. A
//! binding that, directly or indirectly, needs the very node being resolved
//! would otherwise loop forever; with the stack we detect the re-entry and
//! report the cycle instead.
//!
//! Entries are pushed before a node's inputs are resolved and popped once its
//! rule has been evaluated (or has failed).

use super::node::NodeId;

/// Nodes in progress on the current resolution, innermost last.
#[derive(Debug, Default)]
pub struct ResolutionStack {
    entries: Vec<NodeId>,
}

impl ResolutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `node`. If it is already in progress, returns the cycle starting
    /// at its first occurrence and ending with `node` again.
    pub fn enter(&mut self, node: NodeId) -> Result<(), Vec<NodeId>> {
        if let Some(pos) = self.entries.iter().position(|n| *n == node) {
            let mut cycle = self.entries[pos..].to_vec();
            cycle.push(node);
            return Err(cycle);
        }
        self.entries.push(node);
        Ok(())
    }

    /// Pop `node`, which must be the innermost entry.
    pub fn exit(&mut self, node: NodeId) {
        let popped = self.entries.pop();
        debug_assert_eq!(
            popped,
            Some(node),
            "resolution stack mismatch: expected {node:?}, got {popped:?}"
        );
    }

    /// Drop every entry, after a failed resolution.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of nodes in progress.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_active(&self) -> bool {
        !self.entries.is_empty()
    }

    /// The node currently being resolved, if any.
    pub fn current(&self) -> Option<NodeId> {
        self.entries.last().copied()
    }
}
