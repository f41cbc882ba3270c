//! Banded matrices stored as a dictionary of diagonals.
//!
//! A [`BandedMatrix`] maps each diagonal offset `k` (positive above the main
//! diagonal) to a [`Diagonal`] and carries a lazily applied scalar `scale`.
//! Entry `t` of diagonal `k` sits at
//!
//! ```text
//! k >= 0:  (t, t + k)
//! k <  0:  (t - k, t)
//! ```
//!
//! which is the layout expected by the matrix-vector product, the standard
//! sparse conversions and the direct solvers in [`crate::direct`]. Offsets are
//! kept in a `BTreeMap`, so every traversal (and therefore every floating
//! point summation) happens in ascending offset order.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::sync::Arc;

use ndarray::{Array2, ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn, Zip};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::{MatvecFormat, SparseFormat, SpectralConfig};
use crate::direct::DirectSolver;
use crate::error::{Result, SpectralError, ValidationError};
use crate::sparse::{AssembledMatrix, CscMatrix, CsrMatrix, DiaMatrix};
use crate::types::{diagonal_length, diagonal_position, Constraint, Diagonal, MatrixKey};
use crate::validation::{validate_diagonal, validate_matvec_shapes};

/// Divisors with a smaller magnitude are rejected by `checked_div`.
pub const DIVISION_THRESHOLD: f64 = 1e-8;

/// Operands whose scale is below this magnitude act as the zero matrix in
/// additive combinations.
pub const ZERO_SCALE: f64 = 1e-15;

/// Tolerance on the 2-norm of the data difference used by `==`. A
/// configured tolerance goes through [`BandedMatrix::eq_within`].
pub const EQUALITY_TOL: f64 = 1e-8;

/// Tolerance on `|d_k - d_{-k}|` used by [`BandedMatrix::is_symmetric`].
pub const SYMMETRY_TOL: f64 = 1e-8;

// ---------------------------------------------------------------------------
// BandedMatrix
// ---------------------------------------------------------------------------

/// Sparse matrix stored as a dictionary of diagonals with a scalar multiplier.
///
/// The unscaled compressed-row form and the direct solver are both computed
/// on first use and cached on the instance. Every `&mut self` method that
/// touches the diagonals or the scale drops both caches, so a solve after a
/// mutation always refactors.
///
/// # Example
///
/// ```rust
/// use ruvector_spectral::banded::BandedMatrix;
/// use ruvector_spectral::types::Diagonal;
///
/// let a = BandedMatrix::new(
///     [(-1, Diagonal::Scalar(-1.0)), (0, Diagonal::Scalar(2.0)), (1, Diagonal::Scalar(-1.0))],
///     (4, 4),
/// )
/// .unwrap();
/// assert!(a.is_symmetric());
/// assert_eq!(a.to_dense()[[1, 0]], -1.0);
/// ```
pub struct BandedMatrix {
    diagonals: BTreeMap<isize, Diagonal>,
    shape: (usize, usize),
    scale: f64,
    csr: OnceCell<CsrMatrix>,
    solver: OnceCell<Arc<DirectSolver>>,
}

impl BandedMatrix {
    /// Build a matrix from `(offset, diagonal)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DiagonalLength`] when a `Values` diagonal
    /// does not have exactly the length implied by its offset, and
    /// [`ValidationError::ParameterOutOfRange`] for an offset that lies
    /// outside the matrix.
    pub fn new(
        diagonals: impl IntoIterator<Item = (isize, Diagonal)>,
        shape: (usize, usize),
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (offset, diagonal) in diagonals {
            validate_diagonal(offset, &diagonal, shape)?;
            map.insert(offset, diagonal);
        }
        Ok(Self::from_parts(map, shape, 1.0))
    }

    /// Square identity of dimension `n`, multiplied by `scale`.
    pub fn identity(n: usize, scale: f64) -> Self {
        let mut map = BTreeMap::new();
        map.insert(0, Diagonal::Scalar(1.0));
        Self::from_parts(map, (n, n), scale)
    }

    /// The `rows x cols` zero matrix (no stored diagonals).
    pub fn zeros(shape: (usize, usize)) -> Self {
        Self::from_parts(BTreeMap::new(), shape, 1.0)
    }

    /// Compress a dense matrix, keeping diagonal `k` only when
    /// `max|d_k| > abstol` and `max|d_k| / max|M| > reltol`.
    pub fn from_dense(dense: &Array2<f64>, abstol: f64, reltol: f64) -> Self {
        let (rows, cols) = dense.dim();
        let mmax = dense.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        let mut map = BTreeMap::new();
        if rows > 0 && cols > 0 {
            for k in -(rows as isize - 1)..=(cols as isize - 1) {
                let len = diagonal_length(k, rows, cols);
                let values: Vec<f64> = (0..len)
                    .map(|t| {
                        let (r, c) = diagonal_position(k, t);
                        dense[[r, c]]
                    })
                    .collect();
                let dmax = values.iter().fold(0.0f64, |m, x| m.max(x.abs()));
                if dmax > abstol && dmax / mmax > reltol {
                    map.insert(k, Diagonal::Values(values));
                }
            }
        }
        debug!(
            rows,
            cols,
            kept = map.len(),
            "compressed dense matrix into diagonals"
        );
        Self::from_parts(map, (rows, cols), 1.0)
    }

    pub(crate) fn from_parts(
        diagonals: BTreeMap<isize, Diagonal>,
        shape: (usize, usize),
        scale: f64,
    ) -> Self {
        Self {
            diagonals,
            shape,
            scale,
            csr: OnceCell::new(),
            solver: OnceCell::new(),
        }
    }

    /// Same diagonals with a different scale.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.set_scale(scale);
        self
    }

    // The factored solver bakes in the scale, the compressed form does not.
    fn invalidate_solver(&mut self) {
        if self.solver.take().is_some() {
            debug!(shape = ?self.shape, "dropped cached solver");
        }
    }

    fn invalidate(&mut self) {
        self.csr.take();
        self.invalidate_solver();
    }

    // -- accessors -----------------------------------------------------------

    /// `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.shape.0
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.shape.1
    }

    /// Lazily applied scalar multiplier.
    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Replace the scalar multiplier.
    pub fn set_scale(&mut self, scale: f64) {
        if scale != self.scale {
            self.scale = scale;
            self.invalidate_solver();
        }
    }

    /// Stored diagonals, unscaled, in ascending offset order.
    pub fn diagonals(&self) -> &BTreeMap<isize, Diagonal> {
        &self.diagonals
    }

    /// Diagonal at `offset`, unscaled.
    pub fn get(&self, offset: isize) -> Option<&Diagonal> {
        self.diagonals.get(&offset)
    }

    /// Diagonal at `offset` expanded to a vector, unscaled.
    pub fn diagonal_values(&self, offset: isize) -> Option<Vec<f64>> {
        let len = diagonal_length(offset, self.rows(), self.cols());
        self.diagonals.get(&offset).map(|d| d.to_vec(len))
    }

    /// Insert or replace a diagonal.
    pub fn insert(&mut self, offset: isize, diagonal: Diagonal) -> Result<()> {
        validate_diagonal(offset, &diagonal, self.shape)?;
        self.diagonals.insert(offset, diagonal);
        self.invalidate();
        Ok(())
    }

    /// Remove a diagonal, returning it.
    pub fn remove(&mut self, offset: isize) -> Option<Diagonal> {
        let removed = self.diagonals.remove(&offset);
        if removed.is_some() {
            self.invalidate();
        }
        removed
    }

    /// Number of stored diagonals.
    pub fn len(&self) -> usize {
        self.diagonals.len()
    }

    /// `true` when no diagonal is stored.
    pub fn is_empty(&self) -> bool {
        self.diagonals.is_empty()
    }

    /// Stored offsets in ascending order.
    pub fn sorted_offsets(&self) -> Vec<isize> {
        self.diagonals.keys().copied().collect()
    }

    /// Offsets whose diagonal is not identically zero.
    pub fn nonzero_offsets(&self) -> Vec<isize> {
        self.diagonals
            .iter()
            .filter(|(_, d)| !d.is_zero())
            .map(|(&k, _)| k)
            .collect()
    }

    /// `true` when both matrices store the same set of offsets.
    pub fn same_offsets(&self, other: &BandedMatrix) -> bool {
        self.diagonals.len() == other.diagonals.len()
            && self.diagonals.keys().eq(other.diagonals.keys())
    }

    /// Structural key: the set of stored offsets.
    pub fn key(&self) -> MatrixKey {
        MatrixKey::Offsets(self.sorted_offsets())
    }

    /// Diagonals with the scale folded in.
    pub fn scaled_diagonals(&self) -> BTreeMap<isize, Diagonal> {
        if self.scale == 1.0 {
            return self.diagonals.clone();
        }
        self.diagonals
            .iter()
            .map(|(&k, d)| (k, d.scaled(self.scale)))
            .collect()
    }

    /// Fold the scale into the diagonals and reset it to one.
    pub fn incorporate_scale(&mut self) {
        if self.scale == 1.0 {
            return;
        }
        self.diagonals = self.scaled_diagonals();
        self.scale = 1.0;
        self.invalidate();
    }

    // -- predicates ----------------------------------------------------------

    /// Symmetric when offsets sum to zero and `|d_k - d_{-k}| < 1e-8` for
    /// every positive `k`.
    pub fn is_symmetric(&self) -> bool {
        if self.diagonals.keys().sum::<isize>() != 0 {
            return false;
        }
        for (&k, upper) in self.diagonals.range(1..) {
            let Some(lower) = self.diagonals.get(&-k) else {
                return false;
            };
            let len = diagonal_length(k, self.rows(), self.cols());
            if len != diagonal_length(-k, self.rows(), self.cols()) {
                return false;
            }
            if (0..len).any(|t| (upper.get(t) - lower.get(t)).abs() >= SYMMETRY_TOL) {
                return false;
            }
        }
        true
    }

    /// Only the main diagonal is stored.
    pub fn is_diagonal(&self) -> bool {
        self.diagonals.len() == 1 && self.diagonals.contains_key(&0)
    }

    /// Square, unit main diagonal only, unit scale.
    pub fn is_identity(&self) -> bool {
        self.rows() == self.cols()
            && self.is_diagonal()
            && self.diagonals[&0].is_unit()
            && self.scale == 1.0
    }

    // -- conversions ---------------------------------------------------------

    /// Unscaled compressed-row form, computed once and cached.
    ///
    /// Exact zeros are not stored.
    pub fn diags_unscaled(&self) -> &CsrMatrix {
        self.csr.get_or_init(|| self.dia(1.0).to_csr())
    }

    /// [`diags`](Self::diags) in the configured `diags_format`.
    pub fn diags_with(&self, config: &SpectralConfig) -> AssembledMatrix {
        self.diags(config.diags_format)
    }

    /// Scaled representation in the requested standard format.
    pub fn diags(&self, format: SparseFormat) -> AssembledMatrix {
        match format {
            SparseFormat::Dia => AssembledMatrix::Dia(self.dia(self.scale)),
            SparseFormat::Csr => AssembledMatrix::Csr(self.csr_scaled()),
            SparseFormat::Csc => AssembledMatrix::Csc(CscMatrix::from_csr(&self.csr_scaled())),
        }
    }

    /// Scaled compressed-row form.
    pub fn csr_scaled(&self) -> CsrMatrix {
        let csr = self.diags_unscaled();
        if self.scale == 1.0 {
            csr.clone()
        } else {
            csr.scaled(self.scale)
        }
    }

    fn dia(&self, factor: f64) -> DiaMatrix {
        let (rows, cols) = self.shape;
        DiaMatrix {
            offsets: self.sorted_offsets(),
            data: self
                .diagonals
                .iter()
                .map(|(&k, d)| {
                    let len = diagonal_length(k, rows, cols);
                    d.to_vec(len).into_iter().map(|x| x * factor).collect()
                })
                .collect(),
            rows,
            cols,
        }
    }

    /// Dense copy, scaled.
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros(self.shape);
        for (&k, d) in &self.diagonals {
            for t in 0..diagonal_length(k, self.rows(), self.cols()) {
                let (r, c) = diagonal_position(k, t);
                dense[[r, c]] = self.scale * d.get(t);
            }
        }
        dense
    }

    /// `scale * A * 1`: the row sums.
    pub fn row_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.rows()];
        for (&k, d) in &self.diagonals {
            for t in 0..diagonal_length(k, self.rows(), self.cols()) {
                sums[diagonal_position(k, t).0] += d.get(t);
            }
        }
        sums.iter_mut().for_each(|s| *s *= self.scale);
        sums
    }

    // -- products ------------------------------------------------------------

    /// `c = scale * (A v)` along `axis`.
    ///
    /// `v` needs at least `cols` entries along `axis` and `c` at least `rows`;
    /// all other extents must agree. Entries of `c` beyond `rows` are zeroed.
    pub fn matvec(
        &self,
        v: ArrayViewD<'_, f64>,
        mut c: ArrayViewMutD<'_, f64>,
        axis: usize,
        format: MatvecFormat,
    ) -> Result<()> {
        validate_matvec_shapes(v.shape(), c.shape(), axis, self.shape)?;
        let ax = Axis(axis);
        let (rows, cols) = self.shape;
        c.fill(0.0);
        match format {
            MatvecFormat::Vectorized => {
                for (&k, d) in &self.diagonals {
                    let (out0, in0) = if k >= 0 {
                        (0, k as usize)
                    } else {
                        (k.unsigned_abs(), 0)
                    };
                    for t in 0..diagonal_length(k, rows, cols) {
                        let coef = d.get(t);
                        if coef == 0.0 {
                            continue;
                        }
                        let src = v.index_axis(ax, in0 + t);
                        c.index_axis_mut(ax, out0 + t).scaled_add(coef, &src);
                    }
                }
                if self.scale != 1.0 {
                    let scale = self.scale;
                    c.mapv_inplace(|x| x * scale);
                }
            }
            MatvecFormat::Compressed => {
                let csr = self.diags_unscaled();
                let scale = self.scale;
                let mut x = vec![0.0; cols];
                let mut y = vec![0.0; rows];
                Zip::from(c.lanes_mut(ax))
                    .and(v.lanes(ax))
                    .for_each(|mut out, input| {
                        for (xj, vj) in x.iter_mut().zip(input.iter()) {
                            *xj = *vj;
                        }
                        csr.spmv(&x, &mut y);
                        for (oi, yi) in out.iter_mut().zip(&y) {
                            *oi = scale * yi;
                        }
                    });
            }
        }
        Ok(())
    }

    /// Allocating product along `axis`; the result has `rows` entries along
    /// `axis` and the extents of `v` elsewhere.
    pub fn apply(&self, v: &ArrayViewD<'_, f64>, axis: usize, format: MatvecFormat) -> Result<ArrayD<f64>> {
        if axis >= v.ndim() {
            return Err(ValidationError::AxisOutOfBounds {
                axis,
                ndim: v.ndim(),
            }
            .into());
        }
        let mut shape = v.shape().to_vec();
        shape[axis] = self.rows();
        let mut c = ArrayD::zeros(IxDyn(&shape));
        self.matvec(v.view(), c.view_mut(), axis, format)?;
        Ok(c)
    }

    /// [`apply`](Self::apply) with the configured `matvec_format`.
    pub fn apply_with(
        &self,
        v: &ArrayViewD<'_, f64>,
        axis: usize,
        config: &SpectralConfig,
    ) -> Result<ArrayD<f64>> {
        self.apply(v, axis, config.matvec_format)
    }

    /// Compressed-row product `self * other`.
    pub fn mul_matrix(&self, other: &BandedMatrix) -> Result<CsrMatrix> {
        self.csr_scaled().matmul(&other.csr_scaled())
    }

    // -- algebra -------------------------------------------------------------

    /// `self + other`, failing on shape mismatch.
    pub fn try_add(&self, other: &BandedMatrix) -> Result<BandedMatrix> {
        self.check_same_shape(other, "add")?;
        Ok(self.combine(other, 1.0))
    }

    /// `self - other`, failing on shape mismatch.
    pub fn try_sub(&self, other: &BandedMatrix) -> Result<BandedMatrix> {
        self.check_same_shape(other, "subtract")?;
        Ok(self.combine(other, -1.0))
    }

    /// `self / y`.
    ///
    /// # Errors
    ///
    /// [`SpectralError::Domain`] when `|y| < 1e-8`.
    pub fn checked_div(&self, y: f64) -> Result<BandedMatrix> {
        if y.abs() < DIVISION_THRESHOLD {
            return Err(SpectralError::Domain {
                divisor: y,
                threshold: DIVISION_THRESHOLD,
            });
        }
        Ok(self.clone().with_scale(self.scale / y))
    }

    fn check_same_shape(&self, other: &BandedMatrix, op: &str) -> Result<()> {
        if self.shape != other.shape {
            return Err(SpectralError::Precondition(format!(
                "cannot {op} matrices of shape {:?} and {:?}",
                self.shape, other.shape
            )));
        }
        Ok(())
    }

    /// `self + sign * other` with both scales folded into the result.
    fn combine(&self, other: &BandedMatrix, sign: f64) -> BandedMatrix {
        let self_zero = self.scale.abs() < ZERO_SCALE;
        let other_zero = other.scale.abs() < ZERO_SCALE;
        match (self_zero, other_zero) {
            (true, true) => return BandedMatrix::zeros(self.shape),
            (true, false) => return other.clone().with_scale(sign * other.scale),
            (false, true) => return self.clone(),
            (false, false) => {}
        }

        let (rows, cols) = self.shape;
        let mut merged = self.scaled_diagonals();
        for (k, d) in other.scaled_diagonals() {
            let d = if sign == 1.0 { d } else { d.scaled(sign) };
            let len = diagonal_length(k, rows, cols);
            let value = match merged.get(&k) {
                Some(existing) => existing.zip_with(&d, len, |a, b| a + b),
                None => d,
            };
            merged.insert(k, value);
        }
        merged.retain(|_, d| !d.is_zero());
        BandedMatrix::from_parts(merged, self.shape, 1.0)
    }

    /// Drop diagonals that are negligible relative to the row sums.
    ///
    /// A diagonal is removed when `‖d‖ / (max|A·1| / cols) < reltol`; a zero
    /// or non-finite denominator is replaced by one. A matrix with no rows or
    /// no columns has nothing to clean.
    pub fn clean_diagonals(&mut self, reltol: f64) {
        if self.rows() == 0 || self.cols() == 0 {
            return;
        }
        let relmax = self.row_sums().iter().fold(0.0f64, |m, x| m.max(x.abs())) / self.cols() as f64;
        let relmax = if relmax == 0.0 || !relmax.is_finite() { 1.0 } else { relmax };
        let before = self.diagonals.len();
        self.diagonals.retain(|_, d| d.norm() / relmax >= reltol);
        if self.diagonals.len() != before {
            debug!(
                dropped = before - self.diagonals.len(),
                "removed negligible diagonals"
            );
            self.invalidate();
        }
    }

    /// [`clean_diagonals`](Self::clean_diagonals) with the configured
    /// `clean_reltol`.
    pub fn clean(&mut self, config: &SpectralConfig) {
        self.clean_diagonals(config.clean_reltol);
    }

    /// Structural equality with an explicit tolerance on the 2-norm of the
    /// unscaled data difference. `==` uses [`EQUALITY_TOL`].
    pub fn eq_within(&self, other: &BandedMatrix, tol: f64) -> bool {
        self.shape == other.shape
            && self.same_offsets(other)
            && self
                .diags_unscaled()
                .data_distance(other.diags_unscaled())
                .is_some_and(|d| d < tol)
    }

    /// Structural equality using the configured `equality_tol`.
    pub fn equals(&self, other: &BandedMatrix, config: &SpectralConfig) -> bool {
        self.eq_within(other, config.equality_tol)
    }

    /// Compare scaled values diagonal by diagonal; missing diagonals count as zeros.
    pub fn approx_eq(&self, other: &BandedMatrix, tol: f64) -> bool {
        if self.shape != other.shape {
            return false;
        }
        let (rows, cols) = self.shape;
        let offsets: std::collections::BTreeSet<isize> = self
            .diagonals
            .keys()
            .chain(other.diagonals.keys())
            .copied()
            .collect();
        offsets.into_iter().all(|k| {
            (0..diagonal_length(k, rows, cols)).all(|t| {
                let a = self.diagonals.get(&k).map_or(0.0, |d| self.scale * d.get(t));
                let b = other.diagonals.get(&k).map_or(0.0, |d| other.scale * d.get(t));
                (a - b).abs() <= tol
            })
        })
    }

    // -- solves --------------------------------------------------------------

    /// Solve `scale * A u = b` along `axis` with optional row constraints.
    ///
    /// The direct solver is selected from the diagonal pattern and factored
    /// on the first call; later calls reuse it until the matrix is mutated.
    pub fn solve(
        &self,
        b: &ArrayViewD<'_, f64>,
        axis: usize,
        constraints: &[Constraint],
    ) -> Result<ArrayD<f64>> {
        self.solver()?.solve(b, axis, constraints)
    }

    /// The cached direct solver, built on first access.
    pub fn solver(&self) -> Result<&Arc<DirectSolver>> {
        self.solver
            .get_or_try_init(|| DirectSolver::new(self).map(Arc::new))
    }

    /// Drop the cached solver so the next solve refactors.
    pub fn reset_solver(&mut self) {
        self.solver.take();
    }
}

impl Clone for BandedMatrix {
    fn clone(&self) -> Self {
        Self {
            diagonals: self.diagonals.clone(),
            shape: self.shape,
            scale: self.scale,
            csr: self.csr.clone(),
            solver: OnceCell::new(),
        }
    }
}

impl fmt::Debug for BandedMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BandedMatrix")
            .field("shape", &self.shape)
            .field("scale", &self.scale)
            .field("offsets", &self.sorted_offsets())
            .finish()
    }
}

/// Structural equality: same shape, same offsets, unscaled compressed data
/// within `1e-8` in the 2-norm. The scale does not take part.
impl PartialEq for BandedMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.eq_within(other, EQUALITY_TOL)
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

impl Add for &BandedMatrix {
    type Output = BandedMatrix;

    fn add(self, rhs: &BandedMatrix) -> BandedMatrix {
        assert_eq!(self.shape, rhs.shape, "shape mismatch in banded addition");
        self.combine(rhs, 1.0)
    }
}

impl Sub for &BandedMatrix {
    type Output = BandedMatrix;

    fn sub(self, rhs: &BandedMatrix) -> BandedMatrix {
        assert_eq!(self.shape, rhs.shape, "shape mismatch in banded subtraction");
        self.combine(rhs, -1.0)
    }
}

impl Neg for &BandedMatrix {
    type Output = BandedMatrix;

    fn neg(self) -> BandedMatrix {
        self.clone().with_scale(-self.scale)
    }
}

impl Mul<f64> for &BandedMatrix {
    type Output = BandedMatrix;

    fn mul(self, rhs: f64) -> BandedMatrix {
        self.clone().with_scale(self.scale * rhs)
    }
}

impl Mul<&BandedMatrix> for f64 {
    type Output = BandedMatrix;

    fn mul(self, rhs: &BandedMatrix) -> BandedMatrix {
        rhs * self
    }
}

impl AddAssign<&BandedMatrix> for BandedMatrix {
    fn add_assign(&mut self, rhs: &BandedMatrix) {
        *self = &*self + rhs;
    }
}

impl SubAssign<&BandedMatrix> for BandedMatrix {
    fn sub_assign(&mut self, rhs: &BandedMatrix) {
        *self = &*self - rhs;
    }
}

impl MulAssign<f64> for BandedMatrix {
    fn mul_assign(&mut self, rhs: f64) {
        self.set_scale(self.scale * rhs);
    }
}
