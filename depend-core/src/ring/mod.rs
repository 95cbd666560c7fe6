//! Ring Polymer
//!
//! Path-integral owners built on the dependency graph: the ensemble, the
//! bead necklace, a thermostat and the normal-mode representation kept in
//! sync with the beads.

mod system;
mod transform;

pub use system::{Beads, Ensemble, NormalModes, RingPolymer, RingSettings, Thermostat};
pub use transform::NormalModeTransform;
