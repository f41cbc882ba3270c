//! O(N) direct solvers for banded spectral systems.
//!
//! Every solver factors its system once, on the first solve, and then solves
//! any number of right-hand sides, lane by lane along a chosen axis of an
//! n-dimensional array. The sweep used is picked by
//! [`select_solver`](crate::router::select_solver):
//!
//! | Offsets | Factorisation |
//! |---------|---------------|
//! | `{0}` (unit) | [`DiagonalFactor`]: divide by the scale |
//! | `{0, 2}` | [`TwoDmaFactor`]: back-substitution |
//! | `{-2, 0, 2}` | [`ThomasFactor`] with stride 2 |
//! | `{-1, 0, 1}` symmetric | [`ThomasFactor`] with stride 1, upper band only |
//! | `{-2, 0, 2, 4}` | [`FdmaFactor`] |
//! | `{-4, -2, 0, 2, 4}` symmetric | [`PdmaFactor`]: LDLᵀ |
//! | anything else | [`SparseLu`](crate::lu::SparseLu): faer sparse LU |
//!
//! # Constraints
//!
//! A constraint `(r, v)` replaces row `r` *and* column `r` of the system by
//! the unit vector. The removed column entries `A[i, r]` are moved to the
//! right-hand side as `b[i] -= A[i, r] * v` and `b[r]` is set to `v`. The
//! reduced system keeps the band pattern (and symmetry) of the original, and
//! every sweep reproduces `u[r] = v` exactly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, Axis, Slice, Zip};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use crate::banded::BandedMatrix;
use crate::error::{Result, SpectralError};
use crate::lu::SparseLu;
use crate::router::select_solver;
use crate::types::{diagonal_length, diagonal_position, Constraint, SolverKind};
use crate::validation::{validate_constraints, validate_rhs, validate_square};

/// A factored system that solves one right-hand side in place.
pub trait Factorization: Send + Sync + fmt::Debug {
    /// Overwrite `x` (the right-hand side) with the solution.
    fn solve_in_place(&self, x: &mut [f64]);
}

/// Column entries removed by constraints: `(row, constrained column, value)`.
pub type MovedEntries = Vec<(usize, usize, f64)>;

// ---------------------------------------------------------------------------
// Constraint elimination
// ---------------------------------------------------------------------------

/// Replace row and column `r` of a banded system by the unit vector for
/// every `r` in `rows`, returning the removed column entries.
pub fn constrain_bands(
    bands: &mut BTreeMap<isize, Vec<f64>>,
    n: usize,
    rows: &[usize],
) -> MovedEntries {
    bands.entry(0).or_insert_with(|| vec![0.0; n]);
    let mut moved = Vec::new();
    for &r in rows {
        for (&k, values) in bands.iter_mut() {
            if k == 0 {
                values[r] = 1.0;
                continue;
            }
            let shift = k.unsigned_abs();
            // Row entry (r, r + k).
            let row_slot = if k > 0 {
                (r + shift < n).then_some(r)
            } else {
                r.checked_sub(shift)
            };
            if let Some(t) = row_slot {
                values[t] = 0.0;
            }
            // Column entry (r - k, r).
            let col_slot = if k > 0 {
                r.checked_sub(shift).map(|i| (i, i))
            } else {
                (r + shift < n).then_some((r + shift, r))
            };
            if let Some((i, t)) = col_slot {
                if values[t] != 0.0 {
                    moved.push((i, r, values[t]));
                    values[t] = 0.0;
                }
            }
        }
    }
    moved
}

/// Triplet version of [`constrain_bands`] for assembled systems.
pub fn constrain_triplets(
    entries: impl IntoIterator<Item = (usize, usize, f64)>,
    rows: &[usize],
) -> (Vec<(usize, usize, f64)>, MovedEntries) {
    let mut kept = Vec::new();
    let mut moved = Vec::new();
    for (i, j, v) in entries {
        let row_fixed = rows.contains(&i);
        let col_fixed = rows.contains(&j);
        if !row_fixed && !col_fixed {
            kept.push((i, j, v));
        } else if col_fixed && !row_fixed && v != 0.0 {
            moved.push((i, j, v));
        }
    }
    kept.extend(rows.iter().map(|&r| (r, r, 1.0)));
    (kept, moved)
}

/// Adjust a right-hand side for constraints whose columns were eliminated.
pub fn apply_constraints(x: &mut [f64], moved: &[(usize, usize, f64)], constraints: &[Constraint]) {
    for &(i, r, a) in moved {
        if let Some(&(_, value)) = constraints.iter().find(|(row, _)| *row == r) {
            x[i] -= a * value;
        }
    }
    for &(r, value) in constraints {
        x[r] = value;
    }
}

/// Sorted, deduplicated constraint rows.
pub fn constraint_rows(constraints: &[Constraint]) -> Vec<usize> {
    let mut rows: Vec<usize> = constraints.iter().map(|&(r, _)| r).collect();
    rows.sort_unstable();
    rows.dedup();
    rows
}

// ---------------------------------------------------------------------------
// Specialised factorisations
// ---------------------------------------------------------------------------

fn band<'a>(bands: &'a BTreeMap<isize, Vec<f64>>, k: isize, solver: SolverKind) -> Result<&'a [f64]> {
    bands.get(&k).map(Vec::as_slice).ok_or_else(|| {
        SpectralError::Precondition(format!("{solver} solver requires diagonal {k}"))
    })
}

fn check_pivot(value: f64, row: usize, solver: SolverKind) -> Result<()> {
    if value == 0.0 || !value.is_finite() {
        return Err(SpectralError::Singular {
            solver,
            row,
            pivot: value,
        });
    }
    Ok(())
}

/// Diagonal system: multiply by the precomputed reciprocal.
///
/// Reciprocals that are not finite are replaced by zero.
#[derive(Debug, Clone)]
pub struct DiagonalFactor {
    inverse: Vec<f64>,
}

impl DiagonalFactor {
    /// Factor from the (scaled) main diagonal.
    pub fn new(diagonal: &[f64]) -> Self {
        let mut masked = 0usize;
        let inverse = diagonal
            .iter()
            .map(|&d| {
                let r = 1.0 / d;
                if r.is_finite() {
                    r
                } else {
                    masked += 1;
                    0.0
                }
            })
            .collect();
        if masked > 0 {
            debug!(masked, "zero diagonal entries mapped to zero solution");
        }
        Self { inverse }
    }
}

impl Factorization for DiagonalFactor {
    fn solve_in_place(&self, x: &mut [f64]) {
        for (xi, inv) in x.iter_mut().zip(&self.inverse) {
            *xi *= inv;
        }
    }
}

/// Upper triangular system with diagonals `{0, 2}`.
#[derive(Debug, Clone)]
pub struct TwoDmaFactor {
    dia: Vec<f64>,
    up: Vec<f64>,
}

impl TwoDmaFactor {
    /// Build from the main diagonal and the `+2` diagonal.
    pub fn new(dia: &[f64], up: &[f64]) -> Result<Self> {
        for (i, &d) in dia.iter().enumerate() {
            check_pivot(d, i, SolverKind::TwoDma)?;
        }
        Ok(Self {
            dia: dia.to_vec(),
            up: up.to_vec(),
        })
    }
}

impl Factorization for TwoDmaFactor {
    fn solve_in_place(&self, x: &mut [f64]) {
        let n = self.dia.len();
        for i in (0..n).rev() {
            let mut s = x[i];
            if i + 2 < n {
                s -= self.up[i] * x[i + 2];
            }
            x[i] = s / self.dia[i];
        }
    }
}

/// Tridiagonal system with bands at `-s, 0, +s`.
///
/// Stride 2 covers the `{-2, 0, 2}` pattern of Legendre/Chebyshev mass
/// matrices; stride 1 covers `{-1, 0, 1}`.
#[derive(Debug, Clone)]
pub struct ThomasFactor {
    stride: usize,
    low: Vec<f64>,
    dia: Vec<f64>,
    up: Vec<f64>,
}

impl ThomasFactor {
    /// Factor from the lower, main and upper bands.
    pub fn new(stride: usize, low: &[f64], dia: &[f64], up: &[f64], kind: SolverKind) -> Result<Self> {
        let n = dia.len();
        let mut low = low.to_vec();
        let mut dia = dia.to_vec();
        for i in stride..n {
            check_pivot(dia[i - stride], i - stride, kind)?;
            low[i - stride] /= dia[i - stride];
            dia[i] -= low[i - stride] * up[i - stride];
        }
        for (i, &d) in dia.iter().enumerate().skip(n.saturating_sub(stride)) {
            check_pivot(d, i, kind)?;
        }
        Ok(Self {
            stride,
            low,
            dia,
            up: up.to_vec(),
        })
    }
}

impl Factorization for ThomasFactor {
    fn solve_in_place(&self, x: &mut [f64]) {
        let (n, s) = (self.dia.len(), self.stride);
        for i in s..n {
            x[i] -= self.low[i - s] * x[i - s];
        }
        for i in (0..n).rev() {
            let mut v = x[i];
            if i + s < n {
                v -= self.up[i] * x[i + s];
            }
            x[i] = v / self.dia[i];
        }
    }
}

/// Four-diagonal system with offsets `{-2, 0, 2, 4}`.
#[derive(Debug, Clone)]
pub struct FdmaFactor {
    low: Vec<f64>,
    dia: Vec<f64>,
    up1: Vec<f64>,
    up2: Vec<f64>,
}

impl FdmaFactor {
    /// Factor with the forward sweep.
    pub fn new(low: &[f64], dia: &[f64], up1: &[f64], up2: &[f64]) -> Result<Self> {
        let n = dia.len();
        let mut fdma = Self {
            low: low.to_vec(),
            dia: dia.to_vec(),
            up1: up1.to_vec(),
            up2: up2.to_vec(),
        };
        for i in 2..n {
            check_pivot(fdma.dia[i - 2], i - 2, SolverKind::Fdma)?;
            fdma.low[i - 2] /= fdma.dia[i - 2];
            fdma.dia[i] -= fdma.low[i - 2] * fdma.up1[i - 2];
            if i + 2 < n {
                fdma.up1[i] -= fdma.low[i - 2] * fdma.up2[i - 2];
            }
        }
        for i in n.saturating_sub(2)..n {
            check_pivot(fdma.dia[i], i, SolverKind::Fdma)?;
        }
        Ok(fdma)
    }
}

impl Factorization for FdmaFactor {
    fn solve_in_place(&self, x: &mut [f64]) {
        let n = self.dia.len();
        for i in 2..n {
            x[i] -= self.low[i - 2] * x[i - 2];
        }
        for i in (0..n).rev() {
            let mut v = x[i];
            if i + 2 < n {
                v -= self.up1[i] * x[i + 2];
            }
            if i + 4 < n {
                v -= self.up2[i] * x[i + 4];
            }
            x[i] = v / self.dia[i];
        }
    }
}

/// Symmetric pentadiagonal system with offsets `{-4, -2, 0, 2, 4}`.
///
/// Factored as `L D Lᵀ` with unit lower `L` carrying the multipliers `l1`
/// (offset `-2`) and `l2` (offset `-4`).
#[derive(Debug, Clone)]
pub struct PdmaFactor {
    d: Vec<f64>,
    l1: Vec<f64>,
    l2: Vec<f64>,
}

impl PdmaFactor {
    /// Factor from the main diagonal and the `+2`, `+4` diagonals.
    pub fn new(dia: &[f64], e: &[f64], f: &[f64]) -> Result<Self> {
        let n = dia.len();
        let mut d = vec![0.0; n];
        let mut l1 = vec![0.0; n.saturating_sub(2)];
        let mut l2 = vec![0.0; n.saturating_sub(4)];
        for i in 0..n {
            let mut di = dia[i];
            if i >= 2 {
                di -= l1[i - 2] * l1[i - 2] * d[i - 2];
            }
            if i >= 4 {
                di -= l2[i - 4] * l2[i - 4] * d[i - 4];
            }
            check_pivot(di, i, SolverKind::Pdma)?;
            d[i] = di;
            if i + 2 < n {
                let mut ei = e[i];
                if i >= 2 {
                    ei -= l2[i - 2] * d[i - 2] * l1[i - 2];
                }
                l1[i] = ei / di;
            }
            if i + 4 < n {
                l2[i] = f[i] / di;
            }
        }
        Ok(Self { d, l1, l2 })
    }
}

impl Factorization for PdmaFactor {
    fn solve_in_place(&self, x: &mut [f64]) {
        let n = self.d.len();
        for i in 0..n {
            if i >= 2 {
                x[i] -= self.l1[i - 2] * x[i - 2];
            }
            if i >= 4 {
                x[i] -= self.l2[i - 4] * x[i - 4];
            }
        }
        for (xi, di) in x.iter_mut().zip(&self.d) {
            *xi /= di;
        }
        for i in (0..n).rev() {
            if i + 2 < n {
                x[i] -= self.l1[i] * x[i + 2];
            }
            if i + 4 < n {
                x[i] -= self.l2[i] * x[i + 4];
            }
        }
    }
}

/// Factor `bands` (scaled, expanded, square `n x n`) with the sweep for `kind`.
pub fn factor_bands(
    kind: SolverKind,
    bands: &BTreeMap<isize, Vec<f64>>,
    n: usize,
) -> Result<Arc<dyn Factorization>> {
    let factors: Arc<dyn Factorization> = match kind {
        SolverKind::Identity => Arc::new(DiagonalFactor::new(band(bands, 0, kind)?)),
        SolverKind::TwoDma => Arc::new(TwoDmaFactor::new(
            band(bands, 0, kind)?,
            band(bands, 2, kind)?,
        )?),
        SolverKind::Tdma => Arc::new(ThomasFactor::new(
            2,
            band(bands, -2, kind)?,
            band(bands, 0, kind)?,
            band(bands, 2, kind)?,
            kind,
        )?),
        SolverKind::TdmaO => {
            let off = band(bands, 1, kind)?;
            Arc::new(ThomasFactor::new(1, off, band(bands, 0, kind)?, off, kind)?)
        }
        SolverKind::Fdma => Arc::new(FdmaFactor::new(
            band(bands, -2, kind)?,
            band(bands, 0, kind)?,
            band(bands, 2, kind)?,
            band(bands, 4, kind)?,
        )?),
        SolverKind::Pdma => Arc::new(PdmaFactor::new(
            band(bands, 0, kind)?,
            band(bands, 2, kind)?,
            band(bands, 4, kind)?,
        )?),
        SolverKind::Generic => Arc::new(SparseLu::factor(
            n,
            bands.iter().flat_map(|(&k, values)| {
                values.iter().enumerate().map(move |(t, &v)| {
                    let (r, c) = diagonal_position(k, t);
                    (r, c, v)
                })
            }),
        )?),
    };
    Ok(factors)
}

// ---------------------------------------------------------------------------
// DirectSolver
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ConstrainedFactors {
    rows: Vec<usize>,
    factors: Arc<dyn Factorization>,
    moved: MovedEntries,
}

/// Direct solver bound to one banded matrix.
///
/// Holds the unconstrained factorisation and the most recently used
/// constrained one, each computed on first use. A singular system can still
/// be solved once constraints pin its null space.
pub struct DirectSolver {
    kind: SolverKind,
    n: usize,
    bands: BTreeMap<isize, Vec<f64>>,
    factors: OnceCell<Arc<dyn Factorization>>,
    constrained: Mutex<Option<ConstrainedFactors>>,
}

impl DirectSolver {
    /// Select a solver for `matrix`.
    pub fn new(matrix: &BandedMatrix) -> Result<Self> {
        let kind = select_solver(matrix);
        Self::with_kind(matrix, kind)
    }

    /// Bind `matrix` to an explicitly chosen solver family.
    pub fn with_kind(matrix: &BandedMatrix, kind: SolverKind) -> Result<Self> {
        validate_square(matrix.shape())?;
        let n = matrix.rows();
        let nonzero = matrix.nonzero_offsets();
        let bands: BTreeMap<isize, Vec<f64>> = matrix
            .scaled_diagonals()
            .into_iter()
            .filter(|(k, _)| nonzero.contains(k))
            .map(|(k, d)| (k, d.to_vec(diagonal_length(k, n, n))))
            .collect();
        debug!(%kind, n, offsets = ?nonzero, "direct solver selected");
        Ok(Self {
            kind,
            n,
            bands,
            factors: OnceCell::new(),
            constrained: Mutex::new(None),
        })
    }

    /// Solver family in use.
    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    /// Number of unknowns.
    pub fn size(&self) -> usize {
        self.n
    }

    fn factors_for(&self, rows: &[usize]) -> Result<(Arc<dyn Factorization>, MovedEntries)> {
        if rows.is_empty() {
            let factors = self.factors.get_or_try_init(|| {
                let factors = factor_bands(self.kind, &self.bands, self.n)?;
                debug!(kind = %self.kind, n = self.n, "direct solver factorised");
                Ok::<_, SpectralError>(factors)
            })?;
            return Ok((Arc::clone(factors), Vec::new()));
        }
        let mut cache = self.constrained.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.rows == rows {
                return Ok((Arc::clone(&cached.factors), cached.moved.clone()));
            }
        }
        let mut bands = self.bands.clone();
        let moved = constrain_bands(&mut bands, self.n, rows);
        let factors = factor_bands(self.kind, &bands, self.n)?;
        debug!(kind = %self.kind, ?rows, "constrained factorisation cached");
        *cache = Some(ConstrainedFactors {
            rows: rows.to_vec(),
            factors: Arc::clone(&factors),
            moved: moved.clone(),
        });
        Ok((factors, moved))
    }

    /// Solve along `axis` of `b`, one lane at a time.
    ///
    /// Entries beyond the system size along `axis` are zero in the result.
    pub fn solve(
        &self,
        b: &ArrayViewD<'_, f64>,
        axis: usize,
        constraints: &[Constraint],
    ) -> Result<ArrayD<f64>> {
        validate_rhs(b.shape(), b.iter().copied(), axis, self.n)?;
        validate_constraints(constraints, self.n)?;
        let (factors, moved) = self.factors_for(&constraint_rows(constraints))?;

        let ax = Axis(axis);
        let n = self.n;
        let mut u = b.to_owned();
        if u.len_of(ax) > n {
            u.slice_axis_mut(ax, Slice::from(n..)).fill(0.0);
        }
        let mut scratch = vec![0.0; n];
        Zip::from(u.lanes_mut(ax)).for_each(|mut lane| {
            for (s, x) in scratch.iter_mut().zip(lane.iter()) {
                *s = *x;
            }
            apply_constraints(&mut scratch, &moved, constraints);
            factors.solve_in_place(&mut scratch);
            for (x, s) in lane.iter_mut().zip(&scratch) {
                *x = *s;
            }
        });
        Ok(u)
    }

    /// Solve a single vector.
    pub fn solve_vec(&self, b: &[f64], constraints: &[Constraint]) -> Result<Vec<f64>> {
        let view = ArrayViewD::from_shape(ndarray::IxDyn(&[b.len()]), b)
            .map_err(|e| SpectralError::Precondition(e.to_string()))?;
        Ok(self.solve(&view, 0, constraints)?.iter().copied().collect())
    }
}

impl fmt::Debug for DirectSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectSolver")
            .field("kind", &self.kind)
            .field("n", &self.n)
            .finish()
    }
}
