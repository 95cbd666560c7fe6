//! Depend Core
//!
//! This crate provides the dependency-tracked value graph underneath the
//! path-integral molecular dynamics engine. It implements:
//!
//! - Lazily recomputed nodes with dirty tracking
//! - Cross-owner pipes for shared control values
//! - Synchronizers for alternate representations of one physical state
//! - Value snapshots for the checkpoint layer
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: nodes, bindings, the owner registry and the runtime
//! - `config`: graph tunables
//! - `snapshot`: serialization of resolved node values
//! - `ring`: ring-polymer owners (beads, normal modes, ensemble, thermostat)
//!
//! # Example
//!
//! ```rust
//! use depend_core::graph::{Binding, Graph};
//!
//! let mut graph = Graph::new();
//! let owner = graph.add_owner("demo");
//! let a = graph.declare(owner, "a", 2.0).unwrap();
//! let b = graph
//!     .declare_computed(owner, "b", depend_core::graph::ValueKind::Float, Binding::scalar(a, |a| a * a))
//!     .unwrap();
//!
//! assert_eq!(graph.get_float(b).unwrap(), 4.0);
//! graph.set(a, 3.0).unwrap();
//! assert_eq!(graph.get_float(b).unwrap(), 9.0);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod ring;
pub mod snapshot;

pub use config::GraphConfig;
pub use error::{DependError, Result};
pub use graph::{Binding, Derivation, Graph, NodeId, OwnerId, SyncId, Value, ValueKind};
