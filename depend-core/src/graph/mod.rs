//! Dependency Graph
//!
//! This module implements the lazily-evaluated value graph that every
//! physics component is written against.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes hold a cached value for one physical quantity (a scalar or a
//!   fixed-shape array), a dirty flag and a rule describing how the value is
//!   obtained
//! - Edges represent dependencies: if B reads A, A lists B as a dependent
//!
//! When a node is written, its computing dependents are marked dirty. Nothing
//! is recomputed until a dirty node is read, and then only once.
//!
//! Synchronizers are the one place where nodes point at each other in both
//! directions. They keep alternate encodings of the same state (bead
//! coordinates and normal modes) consistent by tracking which member was
//! written last and deriving the others from it on demand.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a `slotmap` arena owned by [`Graph`] and are referenced by
//!    [`NodeId`]. Owners map field names to ids through the registry instead
//!    of attaching attributes to objects.
//!
//! 2. A node's rule is a small enumeration ([`Rule`]); the synchronizer picks
//!    the active derivation through its authority pointer.
//!
//! 3. Only the dependents direction is stored on nodes. Inputs are part of the
//!    rule itself, in the order the binding reads them.

mod binding;
mod context;
mod diagnostics;
mod node;
mod registry;
mod runtime;
mod scheduler;
mod sync;
mod value;

pub use binding::{Binding, Derivation, Inputs};
pub use context::ResolutionStack;
pub use diagnostics::{EvalCounter, EvaluationHook, GraphStats};
pub use node::{DirtyState, Node, NodeId, NodeLabel, Rule};
pub use registry::{Owner, OwnerId, OwnerScope};
pub use runtime::Graph;
pub use scheduler::UpdateScheduler;
pub use sync::{SyncId, Synchronizer};
pub use value::{Shape, Value, ValueKind};
