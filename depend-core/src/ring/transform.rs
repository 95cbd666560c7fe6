//! Bead / normal-mode coordinate transform.
//!
//! The transform is the orthogonal matrix `C` with `nm = C · beads`. Row 0 is
//! the centroid, rows `1..P/2` are cosine modes and the rows above `P/2` the
//! matching sine modes. For even `P` the row at `P/2` alternates sign.

use std::f64::consts::PI;

use ndarray::{Array2, ArrayD, ArrayView2, Ix2};

use crate::error::{DependError, Result};
use crate::graph::NodeLabel;

#[derive(Debug, Clone, PartialEq)]
pub struct NormalModeTransform {
    nbeads: usize,
    matrix: Array2<f64>,
}

impl NormalModeTransform {
    pub fn new(nbeads: usize) -> Self {
        let p = nbeads as f64;
        let mut matrix = Array2::zeros((nbeads, nbeads));
        for ((k, j), c) in matrix.indexed_iter_mut() {
            let phase = 2.0 * PI * (j * k) as f64 / p;
            *c = if k == 0 {
                (1.0 / p).sqrt()
            } else if 2 * k < nbeads {
                (2.0 / p).sqrt() * phase.cos()
            } else if 2 * k == nbeads {
                if j % 2 == 0 {
                    (1.0 / p).sqrt()
                } else {
                    -(1.0 / p).sqrt()
                }
            } else {
                (2.0 / p).sqrt() * phase.sin()
            };
        }
        Self { nbeads, matrix }
    }

    pub fn nbeads(&self) -> usize {
        self.nbeads
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Bead coordinates `(P, 3N)` to normal-mode coordinates.
    pub fn to_normal_modes(&self, beads: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let beads = self.as_path(beads)?;
        Ok(self.matrix.dot(&beads).into_dyn())
    }

    /// Normal-mode coordinates `(P, 3N)` back to bead coordinates.
    pub fn to_beads(&self, modes: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let modes = self.as_path(modes)?;
        Ok(self.matrix.t().dot(&modes).into_dyn())
    }

    fn as_path<'a>(&self, array: &'a ArrayD<f64>) -> Result<ArrayView2<'a, f64>> {
        let shape = array.shape();
        if shape.len() != 2 || shape[0] != self.nbeads {
            let columns = shape.get(1).copied().unwrap_or(0);
            return Err(DependError::ShapeMismatch {
                node: NodeLabel::anonymous(),
                expected: vec![self.nbeads, columns],
                found: shape.to_vec(),
            });
        }
        array.view().into_dimensionality::<Ix2>().map_err(|_| DependError::ShapeMismatch {
            node: NodeLabel::anonymous(),
            expected: vec![self.nbeads, shape[1]],
            found: shape.to_vec(),
        })
    }
}
