//! Value snapshots for the checkpoint layer.
//!
//! A snapshot only ever talks to the graph through `get` and `set`: it never
//! looks at dirty flags or bindings. Captured fields are the independent
//! state of the system, i.e. leaves plus the authoritative member of each
//! synchronizer. Everything else is derivable and is recomputed after a
//! restore.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DependError, Result};
use crate::graph::{Graph, NodeId, Rule, Value};

/// Resolved values keyed by owner name, then field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    owners: IndexMap<String, IndexMap<String, Value>>,
}

impl Snapshot {
    /// Capture every initialized leaf and authoritative synchronizer member.
    pub fn capture(graph: &mut Graph) -> Result<Self> {
        let mut fields: Vec<(String, String, NodeId)> = Vec::new();
        for (_, owner) in graph.owners() {
            for (field, id) in owner.fields() {
                fields.push((owner.name().to_string(), field.to_string(), id));
            }
        }

        let mut snapshot = Snapshot::default();
        for (owner, field, id) in fields {
            let node = graph.node(id)?;
            let independent = match node.rule() {
                Rule::Leaf => node.value().is_some(),
                Rule::Synced(_) => !graph.is_computed(id)?,
                Rule::Compute(_) | Rule::Pipe(_) => false,
            };
            if !independent {
                continue;
            }
            let value = graph.get(id)?.clone();
            snapshot.owners.entry(owner).or_default().insert(field, value);
        }
        debug!(fields = snapshot.len(), "captured snapshot");
        Ok(snapshot)
    }

    /// Write every captured value back with `set`. Returns the number of
    /// fields written.
    pub fn restore(&self, graph: &mut Graph) -> Result<usize> {
        let mut written = 0;
        for (owner_name, fields) in &self.owners {
            let owner = graph
                .owner_by_name(owner_name)
                .ok_or(DependError::UnknownOwner)?;
            for (field, value) in fields {
                let id = graph.lookup(owner, field)?;
                graph.set(id, value.clone())?;
                written += 1;
            }
        }
        debug!(fields = written, "restored snapshot");
        Ok(written)
    }

    pub fn value(&self, owner: &str, field: &str) -> Option<&Value> {
        self.owners.get(owner)?.get(field)
    }

    /// Number of captured fields.
    pub fn len(&self) -> usize {
        self.owners.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DependError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DependError::Serialization(e.to_string()))
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| DependError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| DependError::Serialization(e.to_string()))
    }
}
