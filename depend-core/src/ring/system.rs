//! Ring-polymer owners.
//!
//! Owners are constructed first (every field declared, nothing wired) and
//! bound afterwards, once the siblings they read from exist. Quantities are
//! in atomic units with `k_B = ħ = 1`.

use std::f64::consts::PI;
use std::rc::Rc;

use ndarray::{Array1, ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DependError, Result};
use crate::graph::{Binding, Derivation, Graph, NodeId, OwnerId, SyncId, Value, ValueKind};

use super::transform::NormalModeTransform;

/// Input needed to assemble a ring polymer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingSettings {
    pub nbeads: usize,
    /// One mass per atom.
    pub masses: Vec<f64>,
    pub temperature: f64,
    pub timestep: f64,
}

impl RingSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DependError::Serialization(e.to_string()))
    }

    fn check(&self) -> Result<()> {
        if self.nbeads == 0 {
            return Err(DependError::InvalidSettings("a ring polymer needs at least one bead".into()));
        }
        if self.masses.is_empty() {
            return Err(DependError::InvalidSettings("a ring polymer needs at least one atom".into()));
        }
        if let Some(m) = self.masses.iter().find(|m| **m <= 0.0) {
            return Err(DependError::InvalidSettings(format!("atomic masses must be positive, got {m}")));
        }
        Ok(())
    }
}

/// Thermodynamic control values shared by the other owners.
#[derive(Debug, Clone, Copy)]
pub struct Ensemble {
    pub owner: OwnerId,
    pub temp: NodeId,
    pub dt: NodeId,
}

impl Ensemble {
    pub fn declare(graph: &mut Graph, temp: f64, dt: f64) -> Result<Self> {
        let owner = graph.add_owner("ensemble");
        let mut scope = graph.scope(owner);
        Ok(Self {
            owner,
            temp: scope.declare("temp", temp)?,
            dt: scope.declare("dt", dt)?,
        })
    }
}

/// Bead positions and momenta, shape `(P, 3N)`.
#[derive(Debug, Clone, Copy)]
pub struct Beads {
    pub owner: OwnerId,
    pub nbeads: usize,
    pub natoms: usize,
    pub q: NodeId,
    pub p: NodeId,
    pub m: NodeId,
    /// Masses repeated per Cartesian component and bead.
    pub m3: NodeId,
}

impl Beads {
    pub fn declare(graph: &mut Graph, nbeads: usize, masses: &[f64]) -> Result<Self> {
        let natoms = masses.len();
        let shape = [nbeads, 3 * natoms];
        let owner = graph.add_owner("beads");
        let mut scope = graph.scope(owner);

        let q = scope.declare("q", ArrayD::<f64>::zeros(IxDyn(&shape)))?;
        let p = scope.declare("p", ArrayD::<f64>::zeros(IxDyn(&shape)))?;
        let m = scope.declare("m", Array1::from(masses.to_vec()).into_dyn())?;
        let m3 = scope.declare_computed(
            "m3",
            ValueKind::array(&shape),
            Binding::unary(m, move |m| {
                let m = m.as_array()?;
                Ok(Value::Array(ArrayD::from_shape_fn(IxDyn(&shape), |idx| m[[idx[1] / 3]])))
            }),
        )?;

        Ok(Self {
            owner,
            nbeads,
            natoms,
            q,
            p,
            m,
            m3,
        })
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.nbeads, 3 * self.natoms]
    }
}

/// Thermostat whose temperature and timestep mirror the ensemble.
#[derive(Debug, Clone, Copy)]
pub struct Thermostat {
    pub owner: OwnerId,
    pub temp: NodeId,
    pub dt: NodeId,
    /// Energy exchanged with the bath, for the conserved quantity.
    pub ethermo: NodeId,
}

impl Thermostat {
    pub fn declare(graph: &mut Graph) -> Result<Self> {
        let owner = graph.add_owner("thermostat");
        let mut scope = graph.scope(owner);
        Ok(Self {
            owner,
            temp: scope.declare_empty("temp", ValueKind::Float)?,
            dt: scope.declare_empty("dt", ValueKind::Float)?,
            ethermo: scope.declare("ethermo", 0.0)?,
        })
    }

    pub fn bind(&self, graph: &mut Graph, ensemble: &Ensemble) -> Result<()> {
        let mut scope = graph.scope(ensemble.owner);
        scope.pipe_to("temp", self.temp)?;
        scope.pipe_to("dt", self.dt)
    }
}

/// Normal-mode representation of the path and the free ring frequencies.
#[derive(Debug, Clone)]
pub struct NormalModes {
    pub owner: OwnerId,
    pub transform: Rc<NormalModeTransform>,
    pub qnm: NodeId,
    pub pnm: NodeId,
    pub q_sync: SyncId,
    pub p_sync: SyncId,
    pub omegan: NodeId,
    pub omegak: NodeId,
    /// Kinetic energy of each normal mode.
    pub kins: NodeId,
    pub kin: NodeId,
}

impl NormalModes {
    /// Declare the normal-mode owner and wire it to `beads` and `ensemble`.
    ///
    /// Positions and momenta become synchronizer groups with the bead
    /// representation authoritative.
    pub fn bind(graph: &mut Graph, beads: &Beads, ensemble: &Ensemble) -> Result<Self> {
        let nbeads = beads.nbeads;
        let shape = beads.shape();
        let transform = Rc::new(NormalModeTransform::new(nbeads));
        let owner = graph.add_owner("normal_modes");

        let qnm = graph.declare_empty(owner, "qnm", ValueKind::array(&shape))?;
        let pnm = graph.declare_empty(owner, "pnm", ValueKind::array(&shape))?;
        let q_sync = synchronize_path(graph, &transform, beads.q, qnm)?;
        let p_sync = synchronize_path(graph, &transform, beads.p, pnm)?;
        graph.update_man(beads.q)?;
        graph.update_man(beads.p)?;

        let p = nbeads as f64;
        let omegan = graph.declare_computed(
            owner,
            "omegan",
            ValueKind::Float,
            Binding::scalar(ensemble.temp, move |t| t * p),
        )?;
        let omegak = graph.declare_computed(
            owner,
            "omegak",
            ValueKind::array(&[nbeads]),
            Binding::unary(omegan, move |w| {
                let w = w.as_float()?;
                let freqs = Array1::from_shape_fn(nbeads, |k| 2.0 * w * (k as f64 * PI / p).sin());
                Ok(Value::Array(freqs.into_dyn()))
            }),
        )?;
        let kins = graph.declare_computed(
            owner,
            "kins",
            ValueKind::array(&[nbeads]),
            Binding::new([pnm, beads.m3], |v| {
                let pnm = v[0].as_array()?;
                let m3 = v[1].as_array()?;
                let per_mode = (pnm * pnm / (m3 * 2.0)).sum_axis(Axis(1));
                Ok(Value::Array(per_mode))
            }),
        )?;
        let kin = graph.declare_computed(
            owner,
            "kin",
            ValueKind::Float,
            Binding::unary(kins, |k| Ok(Value::Float(k.as_array()?.sum()))),
        )?;

        Ok(Self {
            owner,
            transform,
            qnm,
            pnm,
            q_sync,
            p_sync,
            omegan,
            omegak,
            kins,
            kin,
        })
    }
}

fn synchronize_path(
    graph: &mut Graph,
    transform: &Rc<NormalModeTransform>,
    beads: NodeId,
    modes: NodeId,
) -> Result<SyncId> {
    let forward = Rc::clone(transform);
    let backward = Rc::clone(transform);
    graph.synchronize(
        &[beads, modes],
        vec![
            Derivation::new(modes, beads, move |v| {
                Ok(Value::Array(forward.to_normal_modes(v[0].as_array()?)?))
            }),
            Derivation::new(beads, modes, move |v| {
                Ok(Value::Array(backward.to_beads(v[0].as_array()?)?))
            }),
        ],
        beads,
    )
}

/// A complete path-integral system: ensemble, beads, thermostat and normal
/// modes wired together.
#[derive(Debug, Clone)]
pub struct RingPolymer {
    pub ensemble: Ensemble,
    pub beads: Beads,
    pub thermostat: Thermostat,
    pub normal_modes: NormalModes,
}

impl RingPolymer {
    pub fn assemble(graph: &mut Graph, settings: &RingSettings) -> Result<Self> {
        settings.check()?;

        let ensemble = Ensemble::declare(graph, settings.temperature, settings.timestep)?;
        let beads = Beads::declare(graph, settings.nbeads, &settings.masses)?;
        let thermostat = Thermostat::declare(graph)?;

        thermostat.bind(graph, &ensemble)?;
        let normal_modes = NormalModes::bind(graph, &beads, &ensemble)?;
        graph.validate()?;

        debug!(
            nbeads = settings.nbeads,
            natoms = settings.masses.len(),
            nodes = graph.node_count(),
            "assembled ring polymer"
        );
        Ok(Self {
            ensemble,
            beads,
            thermostat,
            normal_modes,
        })
    }

    /// Total kinetic energy of the normal modes.
    pub fn kinetic_energy(&self, graph: &mut Graph) -> Result<f64> {
        graph.get_float(self.normal_modes.kin)
    }

    /// Centroid position, the mean over beads.
    pub fn centroid(&self, graph: &mut Graph) -> Result<ArrayD<f64>> {
        let q = graph.get_array(self.beads.q)?;
        Ok(q.sum_axis(Axis(0)) / self.beads.nbeads as f64)
    }
}
