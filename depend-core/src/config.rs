//! Graph configuration.
//!
//! Options are plain data with defaults and can be loaded from JSON, e.g.
//! from the `graph` section of a driver's settings file:
//!
//! ```json
//! { "max_depth": 2048, "trace_evaluations": true }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DependError, Result};

/// Tunables for a [`Graph`](crate::graph::Graph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Maximum nesting of dependency resolution before `get` fails with
    /// `ResolutionDepth`. Resolution keeps its frames on the heap, so this
    /// bounds memory, not the thread stack.
    pub max_depth: usize,

    /// Initial arena capacity.
    pub node_capacity: usize,

    /// Emit a `trace` event for every binding evaluation.
    pub trace_evaluations: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: 65_536,
            node_capacity: 64,
            trace_evaluations: false,
        }
    }
}

impl GraphConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DependError::Serialization(e.to_string()))
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_trace_evaluations(mut self, enabled: bool) -> Self {
        self.trace_evaluations = enabled;
        self
    }
}
