//! Compute Bindings
//!
//! A binding is a pure function from the resolved values of a fixed,
//! ordered list of upstream nodes to a new value for one node. The engine
//! resolves the inputs depth-first, left to right, before calling it.
//!
//! Purity is a contract, not something the engine enforces: a binding only
//! sees the values handed to it and has no way to write into the graph.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::Result;

use super::node::NodeId;
use super::value::Value;

/// Dependency list of a binding.
pub type Inputs = SmallVec<[NodeId; 4]>;

type ComputeFn = dyn Fn(&[&Value]) -> Result<Value>;

/// Ordered upstream nodes plus the function that combines them.
#[derive(Clone)]
pub struct Binding {
    inputs: Inputs,
    compute: Rc<ComputeFn>,
}

impl Binding {
    /// Create a binding over `inputs`. The function receives their values in
    /// the same order.
    pub fn new<F>(inputs: impl IntoIterator<Item = NodeId>, compute: F) -> Self
    where
        F: Fn(&[&Value]) -> Result<Value> + 'static,
    {
        Self {
            inputs: inputs.into_iter().collect(),
            compute: Rc::new(compute),
        }
    }

    /// Binding over a single input.
    pub fn unary<F>(input: NodeId, compute: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + 'static,
    {
        Self::new([input], move |values| compute(values[0]))
    }

    /// Binding over a single float input producing a float.
    pub fn scalar<F>(input: NodeId, compute: F) -> Self
    where
        F: Fn(f64) -> f64 + 'static,
    {
        Self::unary(input, move |v| Ok(Value::Float(compute(v.as_float()?))))
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub(crate) fn call(&self, values: &[&Value]) -> Result<Value> {
        (self.compute)(values)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Rule deriving one synchronizer member from another.
///
/// The function receives the source member's value first, followed by the
/// values of any extra inputs (for example a transform matrix node).
#[derive(Debug, Clone)]
pub struct Derivation {
    pub(crate) target: NodeId,
    pub(crate) source: NodeId,
    pub(crate) binding: Binding,
}

impl Derivation {
    pub fn new<F>(target: NodeId, source: NodeId, compute: F) -> Self
    where
        F: Fn(&[&Value]) -> Result<Value> + 'static,
    {
        Self {
            target,
            source,
            binding: Binding::new([source], compute),
        }
    }

    /// Derivation that also reads `extra` nodes after the source.
    pub fn with_inputs<F>(
        target: NodeId,
        source: NodeId,
        extra: impl IntoIterator<Item = NodeId>,
        compute: F,
    ) -> Self
    where
        F: Fn(&[&Value]) -> Result<Value> + 'static,
    {
        let inputs = std::iter::once(source).chain(extra);
        Self {
            target,
            source,
            binding: Binding::new(inputs, compute),
        }
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Inputs read after the source member.
    pub(crate) fn extra_inputs(&self) -> &[NodeId] {
        &self.binding.inputs()[1..]
    }
}
