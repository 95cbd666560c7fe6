//! Graph Runtime
//!
//! The runtime is the central coordinator that owns every node, owner and
//! synchronizer, and implements the read/write protocol:
//!
//! 1. `set` validates and stores a value, clears the node's dirty flag, moves
//!    the synchronizer authority if the node is a member, and broadcasts
//!    dirtiness to the computing dependents.
//!
//! 2. `get` returns the cached value of a clean node. A dirty node first
//!    resolves its inputs depth-first, left to right, then evaluates its
//!    active rule once and caches the result.
//!
//! Everything runs to completion on the caller's thread. There is no locking
//! because there is no concurrent mutation.

use std::collections::HashSet;
use std::slice;

use ndarray::{ArrayD, ArrayViewMutD};
use slotmap::SlotMap;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace, warn};

use crate::config::GraphConfig;
use crate::error::{DependError, Result};

use super::binding::{Binding, Derivation};
use super::context::ResolutionStack;
use super::diagnostics::{EvaluationHook, GraphStats};
use super::node::{Node, NodeId, NodeLabel, Rule};
use super::registry::{Owner, OwnerId, OwnerScope};
use super::scheduler::{computes, UpdateScheduler};
use super::sync::{SyncId, Synchronizer};
use super::value::{Value, ValueKind};

/// The computation a dirty node has to run.
enum Active {
    Binding(Binding),
    Pipe(NodeId),
}

impl Active {
    fn inputs(&self) -> &[NodeId] {
        match self {
            Active::Binding(binding) => binding.inputs(),
            Active::Pipe(src) => slice::from_ref(src),
        }
    }
}

/// A node whose inputs are being resolved; `next` indexes the next input.
struct Frame {
    id: NodeId,
    active: Active,
    next: usize,
}

/// Arena of nodes plus the owner registry and synchronizer groups.
pub struct Graph {
    config: GraphConfig,
    nodes: SlotMap<NodeId, Node>,
    owners: SlotMap<OwnerId, Owner>,
    owner_names: HashSet<String>,
    syncs: SlotMap<SyncId, Synchronizer>,
    scheduler: UpdateScheduler,
    stack: ResolutionStack,
    stats: GraphStats,
    hook: Option<Box<dyn EvaluationHook>>,
}

impl Graph {
    /// Create an empty graph with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create an empty graph with the given configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            nodes: SlotMap::with_capacity_and_key(config.node_capacity),
            owners: SlotMap::with_key(),
            owner_names: HashSet::new(),
            syncs: SlotMap::with_key(),
            scheduler: UpdateScheduler::new(),
            stack: ResolutionStack::new(),
            stats: GraphStats::default(),
            hook: None,
            config,
        }
    }

    /// Get the graph's configuration.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Get the evaluation, write and propagation counters.
    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    /// Install the diagnostics hook, returning the previous one.
    pub fn set_hook(&mut self, hook: Box<dyn EvaluationHook>) -> Option<Box<dyn EvaluationHook>> {
        self.hook.replace(hook)
    }

    /// Remove the diagnostics hook.
    pub fn take_hook(&mut self) -> Option<Box<dyn EvaluationHook>> {
        self.hook.take()
    }

    /// Number of declared nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ------------------------------------------------------------------------
    // Owners and declaration
    // ------------------------------------------------------------------------

    /// Register an owner. Repeated names get a numeric suffix (`thermostat_1`)
    /// so every owner stays addressable by name.
    pub fn add_owner(&mut self, name: impl Into<String>) -> OwnerId {
        let base = name.into();
        let mut candidate = base.clone();
        let mut counter = 1;
        while self.owner_names.contains(&candidate) {
            candidate = format!("{base}_{counter}");
            counter += 1;
        }
        self.owner_names.insert(candidate.clone());
        debug!(owner = %candidate, "registered owner");
        self.owners.insert(Owner::new(candidate))
    }

    /// Get an owner's field table.
    pub fn owner(&self, owner: OwnerId) -> Result<&Owner> {
        self.owners.get(owner).ok_or(DependError::UnknownOwner)
    }

    /// Iterate over all owners.
    pub fn owners(&self) -> impl Iterator<Item = (OwnerId, &Owner)> {
        self.owners.iter()
    }

    /// Find an owner by its (suffixed) name.
    pub fn owner_by_name(&self, name: &str) -> Option<OwnerId> {
        self.owners
            .iter()
            .find(|(_, owner)| owner.name() == name)
            .map(|(id, _)| id)
    }

    /// Declaration and wiring calls scoped to `owner`.
    pub fn scope(&mut self, owner: OwnerId) -> OwnerScope<'_> {
        OwnerScope::new(self, owner)
    }

    /// Get the node declared as `field` by `owner`.
    pub fn lookup(&self, owner: OwnerId, field: &str) -> Result<NodeId> {
        let entry = self.owner(owner)?;
        entry.field(field).ok_or_else(|| DependError::UnknownField {
            owner: entry.name().to_string(),
            field: field.to_string(),
        })
    }

    /// Declare a leaf initialized with `value`. The value's kind (and shape)
    /// becomes the node's declared kind.
    pub fn declare(&mut self, owner: OwnerId, field: &str, value: impl Into<Value>) -> Result<NodeId> {
        let value = value.into();
        let kind = value.kind();
        self.insert_node(owner, field, kind, Some(value))
    }

    /// Declare a leaf with no value yet. Reading it before a write or a
    /// binding fails with `MissingBinding`.
    pub fn declare_empty(&mut self, owner: OwnerId, field: &str, kind: ValueKind) -> Result<NodeId> {
        self.insert_node(owner, field, kind, None)
    }

    /// Declare a node computed by a construction-time binding. The binding
    /// may still be replaced once during the bind phase.
    pub fn declare_computed(
        &mut self,
        owner: OwnerId,
        field: &str,
        kind: ValueKind,
        binding: Binding,
    ) -> Result<NodeId> {
        self.check_inputs(binding.inputs())?;
        let id = self.insert_node(owner, field, kind, None)?;
        self.attach(id, Rule::Compute(binding));
        Ok(id)
    }

    fn insert_node(
        &mut self,
        owner: OwnerId,
        field: &str,
        kind: ValueKind,
        value: Option<Value>,
    ) -> Result<NodeId> {
        let entry = self.owners.get(owner).ok_or(DependError::UnknownOwner)?;
        if entry.contains(field) {
            return Err(DependError::DuplicateField {
                owner: entry.name().to_string(),
                field: field.to_string(),
            });
        }
        let label = NodeLabel::new(entry.name(), field);
        if let Some(value) = &value {
            kind.check(&label, value)?;
        }

        debug!(node = %label, %kind, "declared node");
        let id = self.nodes.insert(Node::leaf(label, kind, value));
        if let Some(entry) = self.owners.get_mut(owner) {
            entry.insert(field.to_string(), id);
        }
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------------

    /// Attach the bind-phase binding of `node`, replacing any construction
    /// binding. Allowed once per node.
    pub fn bind(&mut self, node: NodeId, binding: Binding) -> Result<()> {
        let target = self.node(node)?;
        match target.rule() {
            Rule::Synced(_) => {
                return Err(DependError::SynchronizerConflict {
                    reason: format!("{} is synchronized and cannot take a plain binding", target.label()),
                })
            }
            _ if target.is_bound() => {
                return Err(DependError::AlreadyBound {
                    node: target.label().clone(),
                })
            }
            _ => {}
        }
        self.check_inputs(binding.inputs())?;

        debug!(node = %target.label(), inputs = binding.inputs().len(), "bound node");
        self.attach(node, Rule::Compute(binding));
        self.mark_bound(node);
        Ok(())
    }

    /// Mirror `src` into `dst` with an identity binding. The kinds must match
    /// and `dst` cannot be rebound afterwards.
    pub fn pipe(&mut self, src: NodeId, dst: NodeId) -> Result<()> {
        let source = self.node(src)?;
        let target = self.node(dst)?;
        if target.is_bound() {
            return Err(DependError::AlreadyBound {
                node: target.label().clone(),
            });
        }
        if let Rule::Synced(_) = target.rule() {
            return Err(DependError::SynchronizerConflict {
                reason: format!("{} is synchronized and cannot be a pipe destination", target.label()),
            });
        }
        if source.kind() != target.kind() {
            return Err(kind_conflict(target.label(), target.kind(), source.kind()));
        }

        debug!(from = %source.label(), to = %target.label(), "piped node");
        self.attach(dst, Rule::Pipe(src));
        self.mark_bound(dst);
        Ok(())
    }

    /// Group `members` as alternate representations of one quantity.
    ///
    /// Members must be plain leaves not already grouped, and `derivations`
    /// must cover every ordered pair. `initial` starts out authoritative; all
    /// other members start dirty.
    pub fn synchronize(
        &mut self,
        members: &[NodeId],
        derivations: Vec<Derivation>,
        initial: NodeId,
    ) -> Result<SyncId> {
        for &member in members {
            let node = self.node(member)?;
            match node.rule() {
                Rule::Leaf => {}
                Rule::Synced(_) => {
                    return Err(DependError::SynchronizerConflict {
                        reason: format!("{} already belongs to a synchronizer", node.label()),
                    })
                }
                _ => {
                    return Err(DependError::SynchronizerConflict {
                        reason: format!("{} is computed and cannot be synchronized", node.label()),
                    })
                }
            }
        }
        for derivation in &derivations {
            self.check_inputs(derivation.binding.inputs())?;
        }

        let sync = Synchronizer::new(members, derivations, initial)?;
        if let Some(&(target, _)) = sync.missing_pairs().first() {
            return Err(DependError::MissingBinding {
                node: self.node(target)?.label().clone(),
            });
        }

        let edges = sync.extra_edges();
        let group = self.syncs.insert(sync);
        for &member in members {
            if let Some(node) = self.nodes.get_mut(member) {
                node.set_rule(Rule::Synced(group));
                node.mark_bound();
            }
        }
        for (target, input) in edges {
            if let Some(node) = self.nodes.get_mut(input) {
                node.add_dependent(target);
            }
        }

        let authority = self.node(initial)?.label().clone();
        debug!(members = members.len(), %authority, "synchronized nodes");
        self.transfer_authority(initial);
        Ok(group)
    }

    /// Declare `node` the authoritative member of its group without running
    /// any derivation. Meant to be called once per group at assembly; the
    /// caller is responsible for the stored value being consistent.
    pub fn update_man(&mut self, node: NodeId) -> Result<()> {
        let target = self.node(node)?;
        let &Rule::Synced(group) = target.rule() else {
            return Err(DependError::SynchronizerConflict {
                reason: format!("{} is not a synchronizer member", target.label()),
            });
        };
        if target.value().is_none() {
            return Err(DependError::MissingBinding {
                node: target.label().clone(),
            });
        }
        let label = target.label().clone();

        let sync = self.syncs.get_mut(group).ok_or(DependError::UnknownNode)?;
        if sync.declare() {
            warn!(node = %label, "authority of a synchronizer declared more than once");
        }
        if let Some(n) = self.nodes.get_mut(node) {
            n.mark_clean();
        }
        self.stats.writes += 1;
        debug!(node = %label, "declared authoritative");
        self.transfer_authority(node);
        Ok(())
    }

    /// Get the authoritative member of a synchronizer group.
    pub fn authority(&self, group: SyncId) -> Result<NodeId> {
        self.syncs
            .get(group)
            .map(Synchronizer::authority)
            .ok_or(DependError::UnknownNode)
    }

    /// Get the group `node` belongs to, if any.
    pub fn synchronizer(&self, node: NodeId) -> Option<SyncId> {
        match self.nodes.get(node)?.rule() {
            Rule::Synced(group) => Some(*group),
            _ => None,
        }
    }

    /// Check that the plain dependency edges are acyclic. Intended to run
    /// once after the bind phase.
    pub fn validate(&mut self) -> Result<()> {
        match self.scheduler.topological_order(&self.nodes) {
            Ok(order) => {
                debug!(nodes = order.len(), "graph validated");
                Ok(())
            }
            Err(stuck) => Err(DependError::CyclicEvaluation {
                path: self.labels(&stuck),
            }),
        }
    }

    fn check_inputs(&self, inputs: &[NodeId]) -> Result<()> {
        for &input in inputs {
            self.node(input)?;
        }
        Ok(())
    }

    /// Replace `node`'s rule and rewire the dependents edges accordingly.
    fn attach(&mut self, node: NodeId, rule: Rule) {
        let old_inputs: SmallVec<[NodeId; 4]> = match self.nodes.get(node).map(Node::rule) {
            Some(Rule::Compute(binding)) => binding.inputs().iter().copied().collect(),
            Some(Rule::Pipe(src)) => smallvec![*src],
            _ => SmallVec::new(),
        };
        for input in old_inputs {
            if let Some(n) = self.nodes.get_mut(input) {
                n.remove_dependent(node);
            }
        }

        let new_inputs: SmallVec<[NodeId; 4]> = match &rule {
            Rule::Compute(binding) => binding.inputs().iter().copied().collect(),
            Rule::Pipe(src) => smallvec![*src],
            _ => SmallVec::new(),
        };
        for input in new_inputs {
            if let Some(n) = self.nodes.get_mut(input) {
                n.add_dependent(node);
            }
        }

        if let Some(n) = self.nodes.get_mut(node) {
            n.set_rule(rule);
            n.mark_dirty();
        }
        self.propagate(&[node]);
    }

    fn mark_bound(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.mark_bound();
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Get a node by id.
    pub fn node(&self, node: NodeId) -> Result<&Node> {
        self.nodes.get(node).ok_or(DependError::UnknownNode)
    }

    /// Get a node's label.
    pub fn label(&self, node: NodeId) -> Result<&NodeLabel> {
        self.node(node).map(Node::label)
    }

    /// Check if a node needs recomputation.
    pub fn is_dirty(&self, node: NodeId) -> Result<bool> {
        self.node(node).map(|n| !n.is_clean())
    }

    /// Current value of `node`, recomputing it (and its inputs) if dirty.
    pub fn get(&mut self, node: NodeId) -> Result<&Value> {
        self.resolve(node)?;
        let n = self.node(node)?;
        n.value().ok_or_else(|| DependError::MissingBinding {
            node: n.label().clone(),
        })
    }

    /// Current value of a float node.
    pub fn get_float(&mut self, node: NodeId) -> Result<f64> {
        let label = self.label(node)?.clone();
        self.get(node)?.as_float().map_err(|e| relabel(e, &label))
    }

    /// Current value of an array node.
    pub fn get_array(&mut self, node: NodeId) -> Result<&ArrayD<f64>> {
        self.resolve(node)?;
        let n = self.node(node)?;
        match n.value() {
            Some(value) => value.as_array().map_err(|e| relabel(e, n.label())),
            None => Err(DependError::MissingBinding {
                node: n.label().clone(),
            }),
        }
    }

    /// The stored array without any freshness check.
    ///
    /// Only valid after a prior `get` of the same node with no intervening
    /// upstream write; meant for tight inner loops.
    pub fn raw_view(&self, node: NodeId) -> Result<&ArrayD<f64>> {
        let n = self.node(node)?;
        match n.value() {
            Some(value) => value.as_array().map_err(|e| relabel(e, n.label())),
            None => Err(DependError::MissingBinding {
                node: n.label().clone(),
            }),
        }
    }

    /// Bring `root` up to date. Inputs are resolved depth-first, left to
    /// right, on an explicit frame stack so chain length is bounded by
    /// `max_depth` rather than by the thread's stack.
    fn resolve(&mut self, root: NodeId) -> Result<()> {
        let mut frames: Vec<Frame> = Vec::new();
        let result = self.resolve_frames(root, &mut frames);
        if result.is_err() {
            self.stack.clear();
        }
        result
    }

    fn resolve_frames(&mut self, root: NodeId, frames: &mut Vec<Frame>) -> Result<()> {
        if let Some(frame) = self.open(root)? {
            frames.push(frame);
        }
        while let Some(frame) = frames.last_mut() {
            if let Some(&input) = frame.active.inputs().get(frame.next) {
                frame.next += 1;
                if let Some(child) = self.open(input)? {
                    frames.push(child);
                }
                continue;
            }
            let Some(frame) = frames.pop() else {
                break;
            };
            let result = self.evaluate(frame.id, &frame.active);
            self.stack.exit(frame.id);
            result?;
        }
        Ok(())
    }

    /// Start resolving `id`. Returns `None` when there is nothing to compute:
    /// the node is clean, a leaf, or its group's authority.
    fn open(&mut self, id: NodeId) -> Result<Option<Frame>> {
        let node = self.node(id)?;
        if node.is_clean() {
            return Ok(None);
        }
        let Some(active) = self.active(id, node)? else {
            if let Some(n) = self.nodes.get_mut(id) {
                n.mark_clean();
            }
            return Ok(None);
        };

        if self.stack.depth() >= self.config.max_depth {
            return Err(DependError::ResolutionDepth {
                node: node.label().clone(),
                limit: self.config.max_depth,
            });
        }
        if let Err(cycle) = self.stack.enter(id) {
            return Err(DependError::CyclicEvaluation {
                path: self.labels(&cycle),
            });
        }
        Ok(Some(Frame { id, active, next: 0 }))
    }

    fn active(&self, id: NodeId, node: &Node) -> Result<Option<Active>> {
        Ok(match node.rule() {
            Rule::Leaf => None,
            Rule::Compute(binding) => Some(Active::Binding(binding.clone())),
            Rule::Pipe(src) => Some(Active::Pipe(*src)),
            Rule::Synced(group) => {
                let sync = self.syncs.get(*group).ok_or(DependError::UnknownNode)?;
                if sync.authority() == id {
                    None
                } else {
                    let binding = sync.active_derivation(id).ok_or_else(|| DependError::MissingBinding {
                        node: node.label().clone(),
                    })?;
                    Some(Active::Binding(binding.clone()))
                }
            }
        })
    }

    /// Run the active rule of `id`. Every input is already resolved.
    fn evaluate(&mut self, id: NodeId, active: &Active) -> Result<()> {
        let inputs = active.inputs();
        let computed = {
            let mut values: SmallVec<[&Value; 4]> = SmallVec::with_capacity(inputs.len());
            for &input in inputs {
                let n = self.node(input)?;
                let value = n.value().ok_or_else(|| DependError::MissingBinding {
                    node: n.label().clone(),
                })?;
                values.push(value);
            }
            match active {
                Active::Binding(binding) => binding.call(&values),
                Active::Pipe(_) => Ok(values[0].clone()),
            }
        };

        let node = self.nodes.get_mut(id).ok_or(DependError::UnknownNode)?;
        let value = computed.map_err(|e| relabel(e, node.label()))?;
        node.kind().check(node.label(), &value)?;
        node.store(value);
        node.mark_clean();
        node.record_evaluation();
        self.stats.evaluations += 1;

        if self.config.trace_evaluations {
            trace!(node = %node.label(), rule = node.rule().name(), "evaluated");
        }
        if let Some(hook) = self.hook.as_mut() {
            hook.on_evaluate(id, node.label());
        }
        Ok(())
    }

    fn labels(&self, ids: &[NodeId]) -> Vec<NodeLabel> {
        ids.iter()
            .filter_map(|id| self.nodes.get(*id).map(|n| n.label().clone()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Store `value` in `node` and invalidate everything computed from it.
    pub fn set(&mut self, node: NodeId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let n = self.nodes.get_mut(node).ok_or(DependError::UnknownNode)?;
        n.kind().check(n.label(), &value)?;
        n.store(value);
        n.mark_clean();
        self.stats.writes += 1;
        self.after_write(node);
        Ok(())
    }

    /// Modify an array node in place. The node is resolved first; afterwards
    /// the write behaves exactly like `set`. The view cannot change the shape.
    pub fn update_array<F>(&mut self, node: NodeId, f: F) -> Result<()>
    where
        F: FnOnce(ArrayViewMutD<'_, f64>),
    {
        self.resolve(node)?;
        let n = self.nodes.get_mut(node).ok_or(DependError::UnknownNode)?;
        let label = n.label().clone();
        let expected = n.kind().clone();
        let value = n.value_mut().ok_or_else(|| DependError::MissingBinding {
            node: label.clone(),
        })?;
        let found = value.kind();
        let Some(array) = value.as_array_mut() else {
            return Err(DependError::TypeMismatch {
                node: label,
                expected,
                found,
            });
        };
        f(array.view_mut());
        n.mark_clean();
        self.stats.writes += 1;
        self.after_write(node);
        Ok(())
    }

    fn after_write(&mut self, node: NodeId) {
        if self.synchronizer(node).is_some() {
            self.transfer_authority(node);
        } else {
            self.propagate(&[node]);
        }
    }

    /// Make `node` its group's authority, dirty the other members and
    /// propagate from all of them.
    fn transfer_authority(&mut self, node: NodeId) {
        let mut sources: SmallVec<[NodeId; 4]> = smallvec![node];
        if let Some(group) = self.synchronizer(node) {
            if let Some(sync) = self.syncs.get_mut(group) {
                sync.set_authority(node);
                for &member in sync.members() {
                    if member == node {
                        continue;
                    }
                    if let Some(n) = self.nodes.get_mut(member) {
                        n.mark_dirty();
                    }
                    sources.push(member);
                }
            }
        }
        self.propagate(&sources);
    }

    fn propagate(&mut self, sources: &[NodeId]) {
        let dirtied = self.scheduler.mark_changed(&mut self.nodes, &self.syncs, sources);
        self.stats.propagations += dirtied as u64;
        if dirtied > 0 {
            trace!(sources = sources.len(), dirtied, "propagated dirtiness");
        }
    }

    /// Whether the node's active rule currently computes its value.
    pub fn is_computed(&self, node: NodeId) -> Result<bool> {
        let n = self.node(node)?;
        Ok(computes(node, n, &self.syncs))
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("owners", &self.owners.len())
            .field("synchronizers", &self.syncs.len())
            .field("stats", &self.stats)
            .finish()
    }
}

fn kind_conflict(node: &NodeLabel, expected: &ValueKind, found: &ValueKind) -> DependError {
    match (expected, found) {
        (ValueKind::Array(e), ValueKind::Array(f)) => DependError::ShapeMismatch {
            node: node.clone(),
            expected: e.to_vec(),
            found: f.to_vec(),
        },
        _ => DependError::TypeMismatch {
            node: node.clone(),
            expected: expected.clone(),
            found: found.clone(),
        },
    }
}

/// Attach `label` to accessor errors raised without a node.
fn relabel(err: DependError, label: &NodeLabel) -> DependError {
    match err {
        DependError::TypeMismatch { node, expected, found } if node.is_anonymous() => {
            DependError::TypeMismatch {
                node: label.clone(),
                expected,
                found,
            }
        }
        DependError::ShapeMismatch { node, expected, found } if node.is_anonymous() => {
            DependError::ShapeMismatch {
                node: label.clone(),
                expected,
                found,
            }
        }
        other => other,
    }
}
