//! Integration Tests for the Dependency Graph
//!
//! These tests drive the public API the way a simulation driver does:
//! owners are declared, wired, then read and written in arbitrary order.

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use ndarray::{arr1, arr2, ArrayD};

use depend_core::graph::{Binding, Derivation, EvalCounter, Graph, NodeId, Value, ValueKind};
use depend_core::ring::{RingPolymer, RingSettings};
use depend_core::snapshot::Snapshot;
use depend_core::DependError;

fn square(graph: &mut Graph) -> (NodeId, NodeId) {
    let owner = graph.add_owner("demo");
    let a = graph.declare(owner, "a", 2.0).unwrap();
    let b = graph
        .declare_computed(owner, "b", ValueKind::Float, Binding::scalar(a, |a| a * a))
        .unwrap();
    (a, b)
}

/// Reading twice evaluates once; a write evaluates again exactly once.
#[test]
fn square_recomputes_once_per_write() {
    let mut graph = Graph::new();
    let (a, b) = square(&mut graph);

    assert_eq!(graph.get_float(b).unwrap(), 4.0);
    assert_eq!(graph.node(b).unwrap().evaluations(), 1);

    graph.set(a, 3.0).unwrap();
    assert!(graph.is_dirty(b).unwrap());
    assert_eq!(graph.get_float(b).unwrap(), 9.0);
    assert_eq!(graph.node(b).unwrap().evaluations(), 2);

    assert_eq!(graph.get_float(b).unwrap(), 9.0);
    assert_eq!(graph.node(b).unwrap().evaluations(), 2);
}

/// Writes without reads in between do not evaluate anything.
#[test]
fn writes_alone_never_evaluate() {
    let mut graph = Graph::new();
    let (a, b) = square(&mut graph);
    for x in 0..10 {
        graph.set(a, x as f64).unwrap();
    }
    assert_eq!(graph.node(b).unwrap().evaluations(), 0);
    assert_eq!(graph.get_float(b).unwrap(), 81.0);
    assert_eq!(graph.node(b).unwrap().evaluations(), 1);
}

/// A write dirties every transitive dependent, and a read only refreshes
/// the chain it needs.
#[test]
fn propagation_reaches_the_whole_chain() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("chain");
    let x = graph.declare(owner, "x", 1.0).unwrap();
    let y = graph
        .declare_computed(owner, "y", ValueKind::Float, Binding::scalar(x, |x| x + 1.0))
        .unwrap();
    let z = graph
        .declare_computed(owner, "z", ValueKind::Float, Binding::scalar(y, |y| y * 10.0))
        .unwrap();
    let side = graph
        .declare_computed(owner, "side", ValueKind::Float, Binding::scalar(x, |x| -x))
        .unwrap();

    assert_eq!(graph.get_float(z).unwrap(), 20.0);
    assert_eq!(graph.get_float(side).unwrap(), -1.0);

    graph.set(x, 4.0).unwrap();
    for node in [y, z, side] {
        assert!(graph.is_dirty(node).unwrap());
    }

    assert_eq!(graph.get_float(z).unwrap(), 50.0);
    assert!(!graph.is_dirty(y).unwrap());
    assert!(graph.is_dirty(side).unwrap());
}

/// In a diamond the shared input is evaluated once per write.
#[test]
fn diamond_evaluates_shared_input_once() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("diamond");
    let counter = EvalCounter::new();
    graph.set_hook(Box::new(counter.clone()));

    let a = graph.declare(owner, "a", 1.0).unwrap();
    let b = graph
        .declare_computed(owner, "b", ValueKind::Float, Binding::scalar(a, |a| a * 2.0))
        .unwrap();
    let c = graph
        .declare_computed(owner, "c", ValueKind::Float, Binding::scalar(b, |b| b + 1.0))
        .unwrap();
    let d = graph
        .declare_computed(owner, "d", ValueKind::Float, Binding::scalar(b, |b| b - 1.0))
        .unwrap();
    let e = graph
        .declare_computed(
            owner,
            "e",
            ValueKind::Float,
            Binding::new([c, d], |v| Ok(Value::Float(v[0].as_float()? * v[1].as_float()?))),
        )
        .unwrap();

    assert_eq!(graph.get_float(e).unwrap(), 3.0);
    assert_eq!(counter.count(), 4);

    counter.reset();
    graph.set(a, 2.0).unwrap();
    assert_eq!(graph.get_float(e).unwrap(), 15.0);
    assert_eq!(counter.count(), 4);
    assert_eq!(graph.node(b).unwrap().evaluations(), 2);
}

/// Inputs are resolved depth-first, left to right.
#[test]
fn inputs_resolve_in_declared_order() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("order");
    let seen: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = Rc::clone(&seen);
    graph.set_hook(Box::new(move |_: NodeId, label: &depend_core::graph::NodeLabel| {
        sink.borrow_mut().push(label.field.clone());
    }));

    let x = graph.declare(owner, "x", 1.0).unwrap();
    let left = graph
        .declare_computed(owner, "left", ValueKind::Float, Binding::scalar(x, |x| x))
        .unwrap();
    let right = graph
        .declare_computed(owner, "right", ValueKind::Float, Binding::scalar(x, |x| x))
        .unwrap();
    let top = graph
        .declare_computed(
            owner,
            "top",
            ValueKind::Float,
            Binding::new([right, left], |v| Ok(Value::Float(v[0].as_float()? + v[1].as_float()?))),
        )
        .unwrap();

    graph.get(top).unwrap();
    assert_eq!(*seen.borrow(), vec!["right", "left", "top"]);
}

/// The last write to a synchronizer group wins, even if the value derived
/// from the previous write was never read.
#[test]
fn synchronizer_last_writer_wins() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("angle");
    let degrees = graph.declare(owner, "degrees", 180.0).unwrap();
    let radians = graph.declare_empty(owner, "radians", ValueKind::Float).unwrap();
    let group = graph
        .synchronize(
            &[degrees, radians],
            vec![
                Derivation::new(radians, degrees, |v| Ok(Value::Float(v[0].as_float()?.to_radians()))),
                Derivation::new(degrees, radians, |v| Ok(Value::Float(v[0].as_float()?.to_degrees()))),
            ],
            degrees,
        )
        .unwrap();
    graph.update_man(degrees).unwrap();

    assert_abs_diff_eq!(graph.get_float(radians).unwrap(), std::f64::consts::PI, epsilon = 1e-12);

    graph.set(degrees, 90.0).unwrap();
    graph.set(radians, 0.5).unwrap();
    assert_eq!(graph.authority(group).unwrap(), radians);
    assert_abs_diff_eq!(graph.get_float(degrees).unwrap(), 0.5_f64.to_degrees(), epsilon = 1e-12);

    // Reading never moves the authority.
    assert_eq!(graph.authority(group).unwrap(), radians);
    assert_abs_diff_eq!(graph.get_float(radians).unwrap(), 0.5);
}

/// Nodes computed from a synchronizer member see writes to any member.
#[test]
fn synchronizer_dependents_see_every_member_write() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("path");
    let q = graph.declare(owner, "q", arr1(&[1.0, 2.0]).into_dyn()).unwrap();
    let q2 = graph.declare_empty(owner, "q2", ValueKind::array(&[2])).unwrap();
    graph
        .synchronize(
            &[q, q2],
            vec![
                Derivation::new(q2, q, |v| Ok(Value::Array(v[0].as_array()? * 2.0))),
                Derivation::new(q, q2, |v| Ok(Value::Array(v[0].as_array()? / 2.0))),
            ],
            q,
        )
        .unwrap();
    let total = graph
        .declare_computed(
            owner,
            "total",
            ValueKind::Float,
            Binding::unary(q, |q| Ok(Value::Float(q.as_array()?.sum()))),
        )
        .unwrap();

    assert_eq!(graph.get_float(total).unwrap(), 3.0);
    graph.set(q2, arr1(&[10.0, 10.0]).into_dyn()).unwrap();
    assert!(graph.is_dirty(total).unwrap());
    assert_eq!(graph.get_float(total).unwrap(), 10.0);
}

/// A synchronizer derivation may read nodes outside the group; changing
/// them invalidates the derived members.
#[test]
fn derivation_extra_inputs_are_tracked() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("cell");
    let scale = graph.declare(owner, "scale", 2.0).unwrap();
    let real = graph.declare(owner, "real", 4.0).unwrap();
    let scaled = graph.declare_empty(owner, "scaled", ValueKind::Float).unwrap();
    graph
        .synchronize(
            &[real, scaled],
            vec![
                Derivation::with_inputs(scaled, real, [scale], |v| {
                    Ok(Value::Float(v[0].as_float()? / v[1].as_float()?))
                }),
                Derivation::with_inputs(real, scaled, [scale], |v| {
                    Ok(Value::Float(v[0].as_float()? * v[1].as_float()?))
                }),
            ],
            real,
        )
        .unwrap();

    assert_eq!(graph.get_float(scaled).unwrap(), 2.0);
    graph.set(scale, 4.0).unwrap();
    assert!(graph.is_dirty(scaled).unwrap());
    assert_eq!(graph.get_float(scaled).unwrap(), 1.0);
    // The authority itself is never recomputed.
    assert_eq!(graph.get_float(real).unwrap(), 4.0);
}

/// Pipes mirror the source after every write and are never stale.
#[test]
fn pipe_mirrors_source() {
    let mut graph = Graph::new();
    let ensemble = graph.add_owner("ensemble");
    let thermostat = graph.add_owner("thermostat");
    let temp = graph.declare(ensemble, "temp", 300.0).unwrap();
    let t_temp = graph.declare_empty(thermostat, "temp", ValueKind::Float).unwrap();
    let beta = graph
        .declare_computed(thermostat, "beta", ValueKind::Float, Binding::scalar(t_temp, |t| 1.0 / t))
        .unwrap();
    graph.pipe(temp, t_temp).unwrap();

    for t in [300.0, 150.0, 75.0] {
        graph.set(temp, t).unwrap();
        assert_eq!(graph.get_float(t_temp).unwrap(), t);
        assert_abs_diff_eq!(graph.get_float(beta).unwrap(), 1.0 / t);
    }
}

/// A cycle through bindings is reported with its path instead of
/// recursing forever.
#[test]
fn cycles_are_detected_on_read() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("loop");
    let a = graph.declare_empty(owner, "a", ValueKind::Float).unwrap();
    let b = graph.declare_empty(owner, "b", ValueKind::Float).unwrap();
    let c = graph.declare_empty(owner, "c", ValueKind::Float).unwrap();
    graph.bind(a, Binding::scalar(b, |x| x + 1.0)).unwrap();
    graph.bind(b, Binding::scalar(c, |x| x + 1.0)).unwrap();
    graph.bind(c, Binding::scalar(a, |x| x + 1.0)).unwrap();

    match graph.get(a) {
        Err(DependError::CyclicEvaluation { path }) => {
            let fields: Vec<_> = path.iter().map(|l| l.field.as_str()).collect();
            assert_eq!(fields, vec!["a", "b", "c", "a"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(matches!(graph.validate(), Err(DependError::CyclicEvaluation { .. })));
}

/// Values keep their declared shape across writes and computations.
#[test]
fn array_shapes_are_enforced() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("beads");
    let q = graph.declare(owner, "q", arr2(&[[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]).into_dyn()).unwrap();

    let err = graph.set(q, ArrayD::<f64>::zeros(ndarray::IxDyn(&[3, 2]))).unwrap_err();
    match err {
        DependError::ShapeMismatch { node, expected, found } => {
            assert_eq!(node.to_string(), "beads.q");
            assert_eq!(expected, vec![2, 3]);
            assert_eq!(found, vec![3, 2]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(graph.get_array(q).unwrap()[[1, 2]], 5.0);
}

/// Full ring polymer: positions written in bead space are readable in
/// normal-mode space and back.
#[test]
fn ring_polymer_keeps_representations_consistent() {
    let mut graph = Graph::new();
    let ring = RingPolymer::assemble(
        &mut graph,
        &RingSettings {
            nbeads: 4,
            masses: vec![1.0],
            temperature: 0.25,
            timestep: 1.0,
        },
    )
    .unwrap();
    let nm = &ring.normal_modes;

    let q = arr2(&[
        [0.1, 0.0, 0.0],
        [0.2, 0.0, 0.0],
        [0.3, 0.0, 0.0],
        [0.4, 0.0, 0.0],
    ])
    .into_dyn();
    graph.set(ring.beads.q, q.clone()).unwrap();

    let qnm = graph.get_array(nm.qnm).unwrap().clone();
    assert_abs_diff_eq!(qnm[[0, 0]], 0.5, epsilon = 1e-12);
    assert_eq!(graph.authority(nm.q_sync).unwrap(), ring.beads.q);

    // Writing the normal modes moves the authority and the beads follow.
    let mut shifted = qnm.clone();
    shifted[[0, 1]] = 2.0;
    graph.set(nm.qnm, shifted).unwrap();
    assert_eq!(graph.authority(nm.q_sync).unwrap(), nm.qnm);

    let beads = graph.get_array(ring.beads.q).unwrap();
    for b in 0..4 {
        assert_abs_diff_eq!(beads[[b, 0]], q[[b, 0]], epsilon = 1e-12);
        assert_abs_diff_eq!(beads[[b, 1]], 1.0, epsilon = 1e-12);
    }

    // Centroid momentum only: all kinetic energy sits in mode 0.
    graph
        .set(ring.beads.p, arr2(&[[1.0, 0.0, 0.0]; 4]).into_dyn())
        .unwrap();
    let kins = graph.get_array(nm.kins).unwrap().clone();
    assert_abs_diff_eq!(kins[[0]], 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(kins.sum(), 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ring.kinetic_energy(&mut graph).unwrap(), 2.0, epsilon = 1e-12);
}

/// A snapshot taken mid-run restores both the control values and the path.
#[test]
fn ring_polymer_snapshot_round_trip() {
    let mut graph = Graph::new();
    let ring = RingPolymer::assemble(
        &mut graph,
        &RingSettings {
            nbeads: 2,
            masses: vec![1.0, 4.0],
            temperature: 1.0,
            timestep: 0.5,
        },
    )
    .unwrap();
    graph
        .set(ring.beads.p, arr2(&[[1.0, 0.0, 0.0, 0.0, 0.0, 2.0], [0.0, 1.0, 0.0, 0.0, 0.0, 0.0]]).into_dyn())
        .unwrap();
    let before = ring.kinetic_energy(&mut graph).unwrap();
    let snapshot = Snapshot::from_msgpack(&Snapshot::capture(&mut graph).unwrap().to_msgpack().unwrap()).unwrap();

    graph.set(ring.ensemble.temp, 5.0).unwrap();
    graph.set(ring.normal_modes.pnm, ArrayD::<f64>::zeros(ndarray::IxDyn(&[2, 6]))).unwrap();
    assert_eq!(ring.kinetic_energy(&mut graph).unwrap(), 0.0);

    snapshot.restore(&mut graph).unwrap();
    assert_abs_diff_eq!(ring.kinetic_energy(&mut graph).unwrap(), before, epsilon = 1e-12);
    assert_eq!(graph.get_float(ring.thermostat.temp).unwrap(), 1.0);
    assert_eq!(graph.authority(ring.normal_modes.p_sync).unwrap(), ring.beads.p);
}

/// Writing a computed node overrides it until the next upstream write.
#[test]
fn manual_override_lasts_until_upstream_write() {
    let mut graph = Graph::new();
    let (a, b) = square(&mut graph);

    graph.set(b, 100.0).unwrap();
    assert_eq!(graph.get_float(b).unwrap(), 100.0);
    assert_eq!(graph.node(b).unwrap().evaluations(), 0);

    graph.set(a, 5.0).unwrap();
    assert_eq!(graph.get_float(b).unwrap(), 25.0);
}

/// A long acyclic chain resolves under the default configuration.
#[test]
fn long_chain_resolves_without_exhausting_the_stack() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("chain");
    let head = graph.declare(owner, "n0", 0.0).unwrap();
    let mut tail = head;
    for i in 1..10_000 {
        tail = graph
            .declare_computed(owner, &format!("n{i}"), ValueKind::Float, Binding::scalar(tail, |x| x + 1.0))
            .unwrap();
    }

    assert_eq!(graph.get_float(tail).unwrap(), 9_999.0);
    graph.set(head, 1.0).unwrap();
    assert_eq!(graph.get_float(tail).unwrap(), 10_000.0);
    assert!(graph.validate().is_ok());
}

/// A cycle closed through a derivation's extra input is reported on read.
#[test]
fn cycles_through_synchronizer_inputs_are_detected() {
    let mut graph = Graph::new();
    let owner = graph.add_owner("cell");
    let real = graph.declare(owner, "real", 4.0).unwrap();
    let scaled = graph.declare_empty(owner, "scaled", ValueKind::Float).unwrap();
    let scale = graph.declare_empty(owner, "scale", ValueKind::Float).unwrap();
    graph
        .synchronize(
            &[real, scaled],
            vec![
                Derivation::with_inputs(scaled, real, [scale], |v| {
                    Ok(Value::Float(v[0].as_float()? / v[1].as_float()?))
                }),
                Derivation::with_inputs(real, scaled, [scale], |v| {
                    Ok(Value::Float(v[0].as_float()? * v[1].as_float()?))
                }),
            ],
            real,
        )
        .unwrap();
    graph.bind(scale, Binding::scalar(scaled, |s| s + 1.0)).unwrap();

    match graph.get(scaled) {
        Err(DependError::CyclicEvaluation { path }) => {
            let fields: Vec<_> = path.iter().map(|l| l.field.as_str()).collect();
            assert_eq!(fields, vec!["scaled", "scale", "scaled"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(matches!(graph.validate(), Err(DependError::CyclicEvaluation { .. })));
}

/// A pipe whose source reads the pipe destination is a cycle.
#[test]
fn cycles_through_pipes_are_detected() {
    let mut graph = Graph::new();
    let ensemble = graph.add_owner("ensemble");
    let thermostat = graph.add_owner("thermostat");
    let temp = graph.declare_empty(ensemble, "temp", ValueKind::Float).unwrap();
    let t_temp = graph.declare_empty(thermostat, "temp", ValueKind::Float).unwrap();
    graph.pipe(temp, t_temp).unwrap();
    graph.bind(temp, Binding::scalar(t_temp, |t| t * 2.0)).unwrap();

    match graph.get(t_temp) {
        Err(DependError::CyclicEvaluation { path }) => {
            let labels: Vec<_> = path.iter().map(ToString::to_string).collect();
            assert_eq!(labels, vec!["thermostat.temp", "ensemble.temp", "thermostat.temp"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(matches!(graph.validate(), Err(DependError::CyclicEvaluation { .. })));
}
