//! Sparse LU factorisation backed by `faer`.
//!
//! The generic fallback for every diagonal pattern without a specialised
//! sweep, and the factorisation behind the tensor-product and block solvers.
//! Kronecker and block assembly produce systems whose bandwidth grows with
//! the inner dimension, so the factors are computed by faer's supernodal
//! sparse LU (fill-reducing column ordering, partial pivoting) rather than a
//! band-storage elimination.
//!
//! faer reports structural singularity as an error but divides by an exact
//! zero pivot. Empty rows and columns are rejected before factoring and the
//! factors are checked for non-finite output once, so a singular system is
//! reported as [`SpectralError::Singular`] instead of producing NaN later.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use faer::prelude::SpSolver;
use faer::sparse::linalg::solvers::Lu;
use faer::sparse::SparseColMat;
use faer::Mat;
use tracing::{debug, warn};

use crate::direct::Factorization;
use crate::error::{Result, SpectralError};
use crate::sparse::CsrMatrix;
use crate::types::SolverKind;

/// LU factors of a square sparse matrix.
pub struct SparseLu {
    n: usize,
    nnz: usize,
    lu: Lu<usize, f64>,
}

impl SparseLu {
    /// Factor the square matrix given by `(row, col, value)` triplets.
    ///
    /// Duplicate positions are summed; exact zeros are not stored.
    ///
    /// # Errors
    ///
    /// [`SpectralError::Precondition`] for an entry outside the `n x n`
    /// system and [`SpectralError::Singular`] when the matrix is singular.
    pub fn factor(n: usize, entries: impl IntoIterator<Item = (usize, usize, f64)>) -> Result<Self> {
        let entries: Vec<(usize, usize, f64)> = entries.into_iter().collect();
        if let Some(&(i, j, _)) = entries.iter().find(|&&(i, j, _)| i >= n || j >= n) {
            return Err(SpectralError::Precondition(format!(
                "entry ({i}, {j}) outside {n}x{n} system"
            )));
        }
        Self::from_csr(&CsrMatrix::assemble(n, n, entries))
    }

    /// Factor a square CSR matrix.
    pub fn from_csr(matrix: &CsrMatrix) -> Result<Self> {
        if matrix.rows != matrix.cols {
            return Err(SpectralError::Precondition(format!(
                "LU requires a square matrix but got {}x{}",
                matrix.rows, matrix.cols
            )));
        }
        let n = matrix.rows;
        let triplets: Vec<(usize, usize, f64)> =
            matrix.triplets().filter(|&(_, _, v)| v != 0.0).collect();
        check_structure(n, &triplets)?;

        let mat = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| SpectralError::Precondition(format!("sparse assembly failed: {e:?}")))?;
        // faer may panic instead of returning an error on a singular system.
        let lu = catch_unwind(AssertUnwindSafe(|| mat.sp_lu()))
            .map_err(|_| singular(0))?
            .map_err(|e| {
                warn!(n, error = ?e, "sparse LU rejected the system");
                singular(0)
            })?;

        let factors = Self {
            n,
            nnz: triplets.len(),
            lu,
        };
        factors.check_finite()?;
        debug!(n, nnz = factors.nnz, "sparse LU factorised");
        Ok(factors)
    }

    /// Number of unknowns.
    pub fn size(&self) -> usize {
        self.n
    }

    /// Number of stored entries of the factored matrix.
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    fn solve_mat(&self, x: &[f64]) -> Mat<f64> {
        let b = Mat::from_fn(self.n, 1, |i, _| x[i]);
        self.lu.solve(&b)
    }

    // A zero pivot turns every solve into inf/NaN from that row on.
    fn check_finite(&self) -> Result<()> {
        let n = self.n;
        let trial: Vec<f64> = (0..n).map(|i| 1.0 + i as f64 / n as f64).collect();
        let x = self.solve_mat(&trial);
        match (0..n).find(|&i| !x[(i, 0)].is_finite()) {
            Some(row) => Err(singular(row)),
            None => Ok(()),
        }
    }
}

fn singular(row: usize) -> SpectralError {
    SpectralError::Singular {
        solver: SolverKind::Generic,
        row,
        pivot: 0.0,
    }
}

// An empty row or column makes the matrix singular before any arithmetic.
fn check_structure(n: usize, triplets: &[(usize, usize, f64)]) -> Result<()> {
    let mut row_seen = vec![false; n];
    let mut col_seen = vec![false; n];
    for &(i, j, _) in triplets {
        row_seen[i] = true;
        col_seen[j] = true;
    }
    let empty = (0..n).find(|&k| !row_seen[k] || !col_seen[k]);
    match empty {
        Some(k) => Err(singular(k)),
        None => Ok(()),
    }
}

impl Factorization for SparseLu {
    fn solve_in_place(&self, x: &mut [f64]) {
        let sol = self.solve_mat(x);
        for (i, xi) in x.iter_mut().take(self.n).enumerate() {
            *xi = sol[(i, 0)];
        }
    }
}

impl fmt::Debug for SparseLu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseLu")
            .field("n", &self.n)
            .field("nnz", &self.nnz)
            .finish()
    }
}
