//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;

use slotmap::new_key_type;
use smallvec::SmallVec;

use super::binding::Binding;
use super::sync::SyncId;
use super::value::{Value, ValueKind};

new_key_type! {
    /// Handle to a node stored in the graph arena.
    pub struct NodeId;
}

/// Identity of a node: the owner that declared it and the field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeLabel {
    pub owner: String,
    pub field: String,
}

impl NodeLabel {
    pub fn new(owner: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            field: field.into(),
        }
    }

    /// Placeholder used by value accessors, which do not know their node.
    pub(crate) fn anonymous() -> Self {
        Self::new("", "")
    }

    pub(crate) fn is_anonymous(&self) -> bool {
        self.owner.is_empty() && self.field.is_empty()
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            write!(f, "<value>")
        } else {
            write!(f, "{}.{}", self.owner, self.field)
        }
    }
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The cached value matches what the node's rule would produce.
    Clean,

    /// An upstream node was written since the value was cached.
    Dirty,
}

/// How a node obtains its value.
#[derive(Clone)]
pub enum Rule {
    /// Written directly; never recomputed.
    Leaf,

    /// Computed from an ordered list of upstream nodes.
    Compute(Binding),

    /// Identity mirror of a node usually held by another owner.
    Pipe(NodeId),

    /// Member of a synchronizer group. The active derivation is selected by
    /// the group's authority pointer.
    Synced(SyncId),
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::Leaf => "leaf",
            Rule::Compute(_) => "compute",
            Rule::Pipe(_) => "pipe",
            Rule::Synced(_) => "synced",
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Compute(binding) => f.debug_tuple("Compute").field(binding).finish(),
            Rule::Pipe(src) => f.debug_tuple("Pipe").field(src).finish(),
            Rule::Synced(group) => f.debug_tuple("Synced").field(group).finish(),
            Rule::Leaf => write!(f, "Leaf"),
        }
    }
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    label: NodeLabel,

    kind: ValueKind,

    /// Cached value. `None` until first written or computed.
    value: Option<Value>,

    dirty: DirtyState,

    rule: Rule,

    /// Set once the node has been wired during the bind phase.
    bound: bool,

    /// Nodes that read this node. Only used to broadcast dirtiness.
    dependents: SmallVec<[NodeId; 4]>,

    /// Number of times the node's rule was actually evaluated.
    evaluations: u64,
}

impl Node {
    /// Create a leaf node, optionally with an initial value.
    pub fn leaf(label: NodeLabel, kind: ValueKind, value: Option<Value>) -> Self {
        Self {
            label,
            kind,
            value,
            dirty: DirtyState::Clean,
            rule: Rule::Leaf,
            bound: false,
            dependents: SmallVec::new(),
            evaluations: 0,
        }
    }

    /// Get the node's owner and field name.
    pub fn label(&self) -> &NodeLabel {
        &self.label
    }

    /// Get the node's declared kind.
    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// Get the cached value, which may be stale if the node is dirty.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn value_mut(&mut self) -> Option<&mut Value> {
        self.value.as_mut()
    }

    pub(crate) fn store(&mut self, value: Value) {
        self.value = Some(value);
    }

    /// Get the node's dirty state.
    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    /// Check if the cached value is current.
    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    /// Mark the node as clean (value is current).
    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as dirty (needs recomputation).
    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    /// Get the rule the node is computed by.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub(crate) fn set_rule(&mut self, rule: Rule) {
        self.rule = rule;
    }

    /// Check if the bind-phase binding was already attached.
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub(crate) fn mark_bound(&mut self) {
        self.bound = true;
    }

    /// Get the nodes that read this node.
    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    /// Add a dependent (a node that reads from this node).
    pub(crate) fn add_dependent(&mut self, node: NodeId) {
        if !self.dependents.contains(&node) {
            self.dependents.push(node);
        }
    }

    /// Remove a dependent.
    pub(crate) fn remove_dependent(&mut self, node: NodeId) {
        self.dependents.retain(|d| *d != node);
    }

    /// Number of times the rule was evaluated.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub(crate) fn record_evaluation(&mut self) {
        self.evaluations += 1;
    }
}
