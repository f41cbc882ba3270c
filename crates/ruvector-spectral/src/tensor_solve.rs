//! Solvers for sums of tensor-product terms.
//!
//! After simplification every term of a system shares the same non-diagonal
//! axes; the diagonal axes only contribute scale values. For each index `i`
//! along the diagonal axes the solvers assemble
//!
//! ```text
//! one axis:   Σ_k scale_k[i] · A_k
//! two axes:   Σ_k scale_k[i] · (A_k⁰ ⊗ A_k¹)
//! ```
//!
//! and solve the corresponding lane or plane of the right-hand side. The 1D
//! systems go through the banded solver selection; the 2D systems are
//! factored with the generic LU. Factorisations are computed on first use
//! and reused for later right-hand sides. Constraints apply to the zero mode
//! (every diagonal-axis index equal to zero).

use std::ops::Range;
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, Slice};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::banded::BandedMatrix;
use crate::direct::{apply_constraints, constrain_triplets, constraint_rows, Factorization};
use crate::error::{Result, SpectralError, ValidationError};
use crate::lu::SparseLu;
use crate::sparse::CsrMatrix;
use crate::tpmatrix::{broadcast_shape, scale_value, TPMatrix};
use crate::types::Constraint;
use crate::validation::validate_constraints;

// ---------------------------------------------------------------------------
// Index helpers
// ---------------------------------------------------------------------------

/// Row-major iteration over every index of `shape`.
pub(crate) fn multi_indices(shape: &[usize]) -> impl Iterator<Item = Vec<usize>> + '_ {
    let total: usize = shape.iter().product();
    (0..total).map(move |mut flat| {
        let mut idx = vec![0; shape.len()];
        for (slot, &extent) in idx.iter_mut().zip(shape).rev() {
            *slot = flat % extent;
            flat /= extent;
        }
        idx
    })
}

/// Row-major position of `idx` in `shape`; unit extents absorb any index.
pub(crate) fn flat_index(shape: &[usize], idx: &[usize]) -> Result<usize> {
    let mut flat = 0;
    for (&extent, &i) in shape.iter().zip(idx) {
        let i = if extent == 1 { 0 } else { i };
        if i >= extent {
            return Err(ValidationError::DimensionMismatch(format!(
                "index {idx:?} outside system grid {shape:?}"
            ))
            .into());
        }
        flat = flat * extent + i;
    }
    Ok(flat)
}

/// View with every axis not in `keep` fixed at `idx`.
pub(crate) fn subview<'a>(
    mut view: ArrayViewD<'a, f64>,
    idx: &[usize],
    keep: &[usize],
) -> ArrayViewD<'a, f64> {
    for ax in (0..idx.len()).rev() {
        if !keep.contains(&ax) {
            view = view.index_axis_move(Axis(ax), idx[ax]);
        }
    }
    view
}

/// Mutable counterpart of [`subview`].
pub(crate) fn subview_mut<'a>(
    mut view: ArrayViewMutD<'a, f64>,
    idx: &[usize],
    keep: &[usize],
) -> ArrayViewMutD<'a, f64> {
    for ax in (0..idx.len()).rev() {
        if !keep.contains(&ax) {
            view = view.index_axis_move(Axis(ax), idx[ax]);
        }
    }
    view
}

fn is_zero_mode(idx: &[usize], keep: &[usize]) -> bool {
    idx.iter()
        .enumerate()
        .all(|(ax, &i)| keep.contains(&ax) || i == 0)
}

/// Simplify `terms` and check they share the non-diagonal axes `expected`.
fn prepare(terms: &[TPMatrix], expected: usize) -> Result<(Vec<Arc<TPMatrix>>, Vec<usize>, Vec<usize>)> {
    let Some(first) = terms.first() else {
        return Err(SpectralError::Precondition("no terms to solve".into()));
    };
    let simplified = terms
        .iter()
        .map(TPMatrix::get_simplified)
        .collect::<Result<Vec<_>>>()?;
    let naxes = simplified[0].naxes().to_vec();
    if naxes.len() != expected {
        return Err(SpectralError::Precondition(format!(
            "expected {expected} non-diagonal axes, found {naxes:?}"
        )));
    }
    let dims = first.dimensions();
    let mut index_shape = vec![1; dims];
    for term in &simplified {
        if term.naxes() != naxes.as_slice() || term.dimensions() != dims {
            return Err(SpectralError::StructuralMismatch(format!(
                "terms act on non-diagonal axes {naxes:?} and {:?}",
                term.naxes()
            )));
        }
        index_shape = broadcast_shape(&index_shape, term.scale().shape())?;
    }
    if naxes.iter().any(|&ax| index_shape[ax] != 1) {
        return Err(SpectralError::Precondition(format!(
            "scale of shape {index_shape:?} varies along a non-diagonal axis {naxes:?}"
        )));
    }
    Ok((simplified, naxes, index_shape))
}

fn check_extent(b: &ArrayViewD<'_, f64>, axis: usize, window: &Range<usize>) -> Result<()> {
    if b.len_of(Axis(axis)) < window.end {
        return Err(ValidationError::DimensionMismatch(format!(
            "rhs extent {} along axis {axis} does not cover {window:?}",
            b.len_of(Axis(axis))
        ))
        .into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Generic1DSolver
// ---------------------------------------------------------------------------

/// Solver for terms with a single non-diagonal axis.
#[derive(Debug)]
pub struct Generic1DSolver {
    axis: usize,
    index_shape: Vec<usize>,
    systems: Vec<BandedMatrix>,
    test_active: Range<usize>,
    trial_active: Range<usize>,
}

impl Generic1DSolver {
    /// Assemble one banded system per diagonal-axis index.
    pub fn new(terms: &[TPMatrix]) -> Result<Self> {
        let (simplified, naxes, index_shape) = prepare(terms, 1)?;
        let axis = naxes[0];
        let mut systems = Vec::new();
        for idx in multi_indices(&index_shape) {
            let mut acc: Option<BandedMatrix> = None;
            for term in &simplified {
                let s = scale_value(term.scale(), &idx)?;
                let m = term.mats()[axis].banded() * s;
                acc = Some(match acc {
                    Some(a) => a.try_add(&m)?,
                    None => m,
                });
            }
            if let Some(system) = acc {
                systems.push(system);
            }
        }
        let test_active = simplified[0].test_space().active_slices()[axis].clone();
        let trial_active = simplified[0].trial_space().active_slices()[axis].clone();
        if let Some(system) = systems.first() {
            if system.shape() != (test_active.len(), trial_active.len()) {
                return Err(ValidationError::DimensionMismatch(format!(
                    "system of shape {:?} for active slices {test_active:?} and {trial_active:?}",
                    system.shape()
                ))
                .into());
            }
        }
        debug!(axis, systems = systems.len(), "assembled 1D tensor-product systems");
        Ok(Self {
            axis,
            index_shape,
            systems,
            test_active,
            trial_active,
        })
    }

    /// Non-diagonal axis.
    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Banded system for diagonal-axis index `idx` (a full-rank index whose
    /// entry along the non-diagonal axis is ignored).
    pub fn system(&self, idx: &[usize]) -> Result<&BandedMatrix> {
        Ok(&self.systems[flat_index(&self.index_shape, idx)?])
    }

    /// Solve every lane of `b` along the non-diagonal axis.
    pub fn solve(&self, b: &ArrayViewD<'_, f64>, constraints: &[Constraint]) -> Result<ArrayD<f64>> {
        let axis = self.axis;
        if b.ndim() != self.index_shape.len() {
            return Err(ValidationError::DimensionMismatch(format!(
                "rhs has {} axes, expected {}",
                b.ndim(),
                self.index_shape.len()
            ))
            .into());
        }
        check_extent(b, axis, &self.test_active)?;
        check_extent(b, axis, &self.trial_active)?;

        let mut u = ArrayD::zeros(b.raw_dim());
        let mut lanes = b.shape().to_vec();
        lanes[axis] = 1;
        for idx in multi_indices(&lanes) {
            let system = self.system(&idx)?;
            let cons = if is_zero_mode(&idx, &[axis]) {
                constraints
            } else {
                &[]
            };
            let lane = subview(b.view(), &idx, &[axis]);
            let rhs = lane.slice_axis(Axis(0), Slice::from(self.test_active.clone()));
            if cons.is_empty() && rhs.iter().all(|&x| x == 0.0) {
                continue;
            }
            let x = system.solve(&rhs, 0, cons)?;
            subview_mut(u.view_mut(), &idx, &[axis])
                .slice_axis_mut(Axis(0), Slice::from(self.trial_active.clone()))
                .assign(&x);
        }
        Ok(u)
    }
}

// ---------------------------------------------------------------------------
// Generic2DSolver
// ---------------------------------------------------------------------------

/// Solver for terms with two non-diagonal axes.
#[derive(Debug)]
pub struct Generic2DSolver {
    axes: [usize; 2],
    index_shape: Vec<usize>,
    systems: Vec<CsrMatrix>,
    factors: Vec<OnceCell<Arc<SparseLu>>>,
    test_active: [Range<usize>; 2],
    trial_active: [Range<usize>; 2],
}

impl Generic2DSolver {
    /// Assemble one Kronecker system per diagonal-axis index.
    pub fn new(terms: &[TPMatrix]) -> Result<Self> {
        let (simplified, naxes, index_shape) = prepare(terms, 2)?;
        let axes = [naxes[0], naxes[1]];
        let mut systems = Vec::new();
        for idx in multi_indices(&index_shape) {
            let mut acc: Option<CsrMatrix> = None;
            for term in &simplified {
                let s = scale_value(term.scale(), &idx)?;
                let [a0, a1] = axes;
                let m = term.mats()[a0]
                    .banded()
                    .csr_scaled()
                    .kron(&term.mats()[a1].banded().csr_scaled())
                    .scaled(s);
                acc = Some(match acc {
                    Some(a) => a.add(&m)?,
                    None => m,
                });
            }
            if let Some(system) = acc {
                systems.push(system);
            }
        }
        debug!(?axes, systems = systems.len(), "assembled 2D tensor-product systems");
        let test = simplified[0].test_space().active_slices();
        let trial = simplified[0].trial_space().active_slices();
        Ok(Self {
            axes,
            index_shape,
            factors: systems.iter().map(|_| OnceCell::new()).collect(),
            systems,
            test_active: [test[axes[0]].clone(), test[axes[1]].clone()],
            trial_active: [trial[axes[0]].clone(), trial[axes[1]].clone()],
        })
    }

    /// Non-diagonal axes.
    pub fn axes(&self) -> [usize; 2] {
        self.axes
    }

    fn factor(&self, slot: usize) -> Result<&Arc<SparseLu>> {
        self.factors[slot].get_or_try_init(|| SparseLu::from_csr(&self.systems[slot]).map(Arc::new))
    }

    /// Solve every plane of `b` spanned by the non-diagonal axes.
    ///
    /// Constraint rows index the row-major flattened plane.
    pub fn solve(&self, b: &ArrayViewD<'_, f64>, constraints: &[Constraint]) -> Result<ArrayD<f64>> {
        if b.ndim() != self.index_shape.len() {
            return Err(ValidationError::DimensionMismatch(format!(
                "rhs has {} axes, expected {}",
                b.ndim(),
                self.index_shape.len()
            ))
            .into());
        }
        for (axis, window) in self.axes.iter().zip(&self.test_active) {
            check_extent(b, *axis, window)?;
        }
        for (axis, window) in self.axes.iter().zip(&self.trial_active) {
            check_extent(b, *axis, window)?;
        }

        let mut u = ArrayD::zeros(b.raw_dim());
        let mut planes = b.shape().to_vec();
        for &axis in &self.axes {
            planes[axis] = 1;
        }
        for idx in multi_indices(&planes) {
            let slot = flat_index(&self.index_shape, &idx)?;
            let system = &self.systems[slot];
            let n = system.rows;
            let plane = subview(b.view(), &idx, &self.axes);
            let mut x: Vec<f64> = plane
                .slice_each_axis(|ax| Slice::from(self.test_active[ax.axis.index()].clone()))
                .iter()
                .copied()
                .collect();
            if x.len() != n || system.cols != n {
                return Err(ValidationError::DimensionMismatch(format!(
                    "plane of {} unknowns for a {}x{} system",
                    x.len(),
                    system.rows,
                    system.cols
                ))
                .into());
            }

            let cons = if is_zero_mode(&idx, &self.axes) {
                constraints
            } else {
                &[]
            };
            if cons.is_empty() {
                if x.iter().all(|&v| v == 0.0) {
                    continue;
                }
                self.factor(slot)?.solve_in_place(&mut x);
            } else {
                validate_constraints(cons, n)?;
                let (kept, moved) = constrain_triplets(system.triplets(), &constraint_rows(cons));
                let lu = SparseLu::factor(n, kept)?;
                apply_constraints(&mut x, &moved, cons);
                lu.solve_in_place(&mut x);
            }

            let mut out = subview_mut(u.view_mut(), &idx, &self.axes);
            let mut window =
                out.slice_each_axis_mut(|ax| Slice::from(self.trial_active[ax.axis.index()].clone()));
            for (dst, src) in window.iter_mut().zip(&x) {
                *dst = *src;
            }
        }
        Ok(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatvecFormat;
    use crate::operator::AxisOperator;
    use crate::space::{AxisSpace, TensorProductSpace, TensorSpace};
    use crate::types::Diagonal;
    use ndarray::IxDyn;

    fn banded(diagonals: &[(isize, f64)], n: usize) -> BandedMatrix {
        BandedMatrix::new(
            diagonals.iter().map(|&(k, v)| (k, Diagonal::Scalar(v))),
            (n, n),
        )
        .unwrap()
    }

    fn space(axes: Vec<AxisSpace>) -> Arc<dyn TensorSpace> {
        Arc::new(TensorProductSpace::new(axes))
    }

    fn plain(n: usize) -> AxisSpace {
        AxisSpace {
            n,
            diagonal: false,
            active: 0..n,
        }
    }

    fn rhs(shape: &[usize]) -> ArrayD<f64> {
        let ndim = shape.len();
        ArrayD::from_shape_fn(IxDyn(shape), |i| {
            (0..ndim).map(|k| (i[k] + 1) as f64 * (k as f64 + 0.5)).sum::<f64>().cos()
        })
    }

    #[test]
    fn multi_indices_are_row_major() {
        let all: Vec<Vec<usize>> = multi_indices(&[2, 3]).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[1], vec![0, 1]);
        assert_eq!(all[3], vec![1, 0]);
        assert_eq!(multi_indices(&[]).count(), 1);
        assert_eq!(flat_index(&[1, 3], &[5, 2]).unwrap(), 2);
        assert!(flat_index(&[2, 3], &[2, 0]).is_err());
    }

    #[test]
    fn helmholtz_lanes_are_solved_per_wavenumber() {
        let (nf, n) = (4, 7);
        let sp = space(vec![AxisSpace::periodic(nf), plain(n)]);
        let k2 = BandedMatrix::new(
            [(0, Diagonal::Values((0..nf).map(|k| (k * k) as f64).collect()))],
            (nf, nf),
        )
        .unwrap();
        let mass = banded(&[(-2, 0.2), (0, 2.0), (2, 0.2)], n);
        let stiff = banded(&[(0, 3.0), (2, -1.0)], n);
        let terms = vec![
            TPMatrix::new(
                vec![Arc::new(k2), Arc::new(mass)],
                Arc::clone(&sp),
                Arc::clone(&sp),
            )
            .unwrap(),
            TPMatrix::new(
                vec![Arc::new(BandedMatrix::identity(nf, 1.0)), Arc::new(stiff)],
                Arc::clone(&sp),
                Arc::clone(&sp),
            )
            .unwrap(),
        ];
        let solver = Generic1DSolver::new(&terms).unwrap();
        assert_eq!(solver.axis(), 1);

        let x = rhs(&[nf, n]);
        let mut b = ArrayD::zeros(IxDyn(&[nf, n]));
        for term in &terms {
            b += &term.apply(&x.view(), MatvecFormat::Vectorized).unwrap();
        }
        let u = solver.solve(&b.view(), &[]).unwrap();
        for (a, e) in u.iter().zip(&x) {
            assert!((a - e).abs() < 1e-10);
        }
    }

    #[test]
    fn zero_mode_constraint_only_touches_first_lane() {
        let (nf, n) = (3, 6);
        let sp = space(vec![AxisSpace::periodic(nf), plain(n)]);
        let a = banded(&[(-1, -1.0), (0, 4.0), (1, -1.0)], n);
        let term = TPMatrix::new(
            vec![Arc::new(BandedMatrix::identity(nf, 1.0)), Arc::new(a)],
            Arc::clone(&sp),
            sp,
        )
        .unwrap();
        let b = rhs(&[nf, n]);
        let u = term.solve(&b.view(), &[(2, 0.75)]).unwrap();
        assert_eq!(u[[0, 2]], 0.75);
        assert_ne!(u[[1, 2]], 0.75);
    }

    #[test]
    fn plane_solve_inverts_kronecker_system() {
        let sp = space(vec![plain(5), plain(6)]);
        let a0 = banded(&[(-1, 0.5), (0, 3.0), (1, 0.5)], 5);
        let a1 = banded(&[(-2, -0.4), (0, 2.5), (2, -0.3)], 6);
        let term = TPMatrix::new(
            vec![Arc::new(a0) as Arc<dyn AxisOperator>, Arc::new(a1)],
            Arc::clone(&sp),
            sp,
        )
        .unwrap()
        .with_scale(2.0);
        let x = rhs(&[5, 6]);
        let b = term.apply(&x.view(), MatvecFormat::Compressed).unwrap();
        let u = term.solve(&b.view(), &[]).unwrap();
        for (a, e) in u.iter().zip(&x) {
            assert!((a - e).abs() < 1e-10);
        }

        let pinned = term.solve(&b.view(), &[(7, -1.25)]).unwrap();
        assert_eq!(pinned[[1, 1]], -1.25);
    }
}
