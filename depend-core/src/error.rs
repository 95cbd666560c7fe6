//! Error Types
//!
//! Every error raised by the graph signals a wiring or configuration defect
//! in client code. None of them is retried internally; a driver should treat
//! them as fatal.

use thiserror::Error;

use crate::graph::{NodeLabel, ValueKind};

/// Errors raised by graph declaration, wiring, reads and writes.
#[derive(Debug, Error)]
pub enum DependError {
    /// An array value does not have the shape its node was declared with.
    #[error("shape mismatch on {node}: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        node: NodeLabel,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A value has a different kind than its node (or accessor) expects.
    #[error("type mismatch on {node}: expected {expected}, got {found}")]
    TypeMismatch {
        node: NodeLabel,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Resolving a node re-entered a node that was already being resolved.
    #[error("cyclic evaluation: {}", format_path(.path))]
    CyclicEvaluation { path: Vec<NodeLabel> },

    /// A node has neither a stored value nor a binding to compute one.
    #[error("{node} was never initialized and has no binding")]
    MissingBinding { node: NodeLabel },

    /// Invalid synchronizer membership or construction.
    #[error("synchronizer conflict: {reason}")]
    SynchronizerConflict { reason: String },

    /// The node's binding was already attached during the bind phase.
    #[error("{node} is already bound")]
    AlreadyBound { node: NodeLabel },

    /// The owner already declared a field with this name.
    #[error("{owner} already declares field '{field}'")]
    DuplicateField { owner: String, field: String },

    /// Lookup of a field the owner never declared.
    #[error("{owner} has no field '{field}'")]
    UnknownField { owner: String, field: String },

    /// A node id that does not belong to this graph.
    #[error("unknown node id")]
    UnknownNode,

    /// An owner id that does not belong to this graph.
    #[error("unknown owner id")]
    UnknownOwner,

    /// Dependency resolution nested deeper than the configured limit.
    #[error("resolution of {node} exceeded the maximum depth of {limit}")]
    ResolutionDepth { node: NodeLabel, limit: usize },

    /// Settings that cannot describe a valid system.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Snapshot encoding or decoding failed.
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),
}

fn format_path(path: &[NodeLabel]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DependError>;
