//! Evaluation diagnostics.
//!
//! Iterative optimizers report convergence progress as a number of function
//! evaluations. The graph calls the installed hook exactly once per actual
//! binding evaluation, never for `get` calls served from the cache.

use std::cell::Cell;
use std::rc::Rc;

use super::node::{NodeId, NodeLabel};

/// Called once per binding evaluation. Must not touch graph state.
pub trait EvaluationHook {
    fn on_evaluate(&mut self, node: NodeId, label: &NodeLabel);
}

impl<F> EvaluationHook for F
where
    F: FnMut(NodeId, &NodeLabel),
{
    fn on_evaluate(&mut self, node: NodeId, label: &NodeLabel) {
        self(node, label)
    }
}

/// Hook counting evaluations into a handle shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct EvalCounter {
    count: Rc<Cell<u64>>,
}

impl EvalCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.get()
    }

    pub fn reset(&self) {
        self.count.set(0);
    }
}

impl EvaluationHook for EvalCounter {
    fn on_evaluate(&mut self, _node: NodeId, _label: &NodeLabel) {
        self.count.set(self.count.get() + 1);
    }
}

/// Counters kept by the graph itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Binding evaluations (pipes and synchronizer derivations included).
    pub evaluations: u64,
    /// Calls to `set`, `update` and `update_man`.
    pub writes: u64,
    /// Nodes dirtied by propagation.
    pub propagations: u64,
}
