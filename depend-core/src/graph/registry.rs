//! Dependency Registry
//!
//! Each owning object (beads, normal modes, a thermostat, ...) gets an entry
//! mapping its field names to node handles in the graph arena. Owners are
//! wired in two phases: fields are declared while the owner is constructed,
//! and bindings are attached later, once the sibling owners that supply the
//! upstream nodes are available.

use indexmap::IndexMap;
use slotmap::new_key_type;

use crate::error::Result;

use super::binding::Binding;
use super::node::NodeId;
use super::runtime::Graph;
use super::value::{Value, ValueKind};

new_key_type! {
    /// Handle to an owner registered with the graph.
    pub struct OwnerId;
}

/// Field table of one owner, in declaration order.
#[derive(Debug, Clone)]
pub struct Owner {
    name: String,
    fields: IndexMap<String, NodeId>,
}

impl Owner {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            fields: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<NodeId> {
        self.fields.get(name).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.fields.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub(crate) fn insert(&mut self, name: String, node: NodeId) {
        self.fields.insert(name, node);
    }
}

/// Declaration and wiring calls scoped to a single owner.
///
/// ```rust,ignore
/// let mut graph = Graph::new();
/// let ensemble = graph.add_owner("ensemble");
/// let mut scope = graph.scope(ensemble);
/// let temp = scope.declare("temp", 300.0)?;
/// let beta = scope.declare_empty("beta", ValueKind::Float)?;
/// scope.bind("beta", Binding::scalar(temp, |t| 1.0 / t))?;
/// ```
pub struct OwnerScope<'g> {
    graph: &'g mut Graph,
    owner: OwnerId,
}

impl<'g> OwnerScope<'g> {
    pub(crate) fn new(graph: &'g mut Graph, owner: OwnerId) -> Self {
        Self { graph, owner }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn declare(&mut self, name: &str, value: impl Into<Value>) -> Result<NodeId> {
        self.graph.declare(self.owner, name, value)
    }

    pub fn declare_empty(&mut self, name: &str, kind: ValueKind) -> Result<NodeId> {
        self.graph.declare_empty(self.owner, name, kind)
    }

    pub fn declare_computed(&mut self, name: &str, kind: ValueKind, binding: Binding) -> Result<NodeId> {
        self.graph.declare_computed(self.owner, name, kind, binding)
    }

    /// Attach the bind-phase binding of a declared field.
    pub fn bind(&mut self, name: &str, binding: Binding) -> Result<()> {
        let node = self.lookup(name)?;
        self.graph.bind(node, binding)
    }

    pub fn lookup(&self, name: &str) -> Result<NodeId> {
        self.graph.lookup(self.owner, name)
    }

    /// Mirror one of this owner's fields into `dst`.
    pub fn pipe_to(&mut self, name: &str, dst: NodeId) -> Result<()> {
        let src = self.lookup(name)?;
        self.graph.pipe(src, dst)
    }

    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }
}
