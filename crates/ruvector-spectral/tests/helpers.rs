//! Shared test helpers for the ruvector-spectral integration test suite.
//!
//! Provides deterministic random banded matrices, a dense reference solver
//! and comparison utilities used across the test modules.

#![allow(dead_code)]

use ndarray::Array2;
use ruvector_spectral::banded::BandedMatrix;
use ruvector_spectral::types::{diagonal_length, Diagonal};

// ---------------------------------------------------------------------------
// Random number generator (simple LCG for deterministic reproducibility)
// ---------------------------------------------------------------------------

/// A minimal linear congruential generator for deterministic test data.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    /// Create a new LCG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next u64 value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    /// Generate a uniform f64 in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform f64 in [lo, hi).
    pub fn next_f64_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

// ---------------------------------------------------------------------------
// Matrix generators
// ---------------------------------------------------------------------------

/// Square banded matrix with constant diagonals.
pub fn constant_banded(diagonals: &[(isize, f64)], n: usize) -> BandedMatrix {
    BandedMatrix::new(
        diagonals.iter().map(|&(k, v)| (k, Diagonal::Scalar(v))),
        (n, n),
    )
    .unwrap()
}

/// Strictly diagonally dominant `n x n` matrix with random values on
/// `offsets` (which must contain 0).
///
/// Off-diagonal entries lie in `[-1, 1)`; the main diagonal lies in
/// `[m, m + 1)` where `m` is the number of off-diagonals, so every row is
/// dominated by its diagonal entry.
pub fn random_dominant(offsets: &[isize], n: usize, seed: u64) -> BandedMatrix {
    let mut rng = Lcg::new(seed);
    let m = offsets.iter().filter(|&&k| k != 0).count() as f64;
    let diagonals: Vec<(isize, Diagonal)> = offsets
        .iter()
        .map(|&k| {
            let len = diagonal_length(k, n, n);
            let values = (0..len)
                .map(|_| {
                    if k == 0 {
                        rng.next_f64_range(m + 0.5, m + 1.5)
                    } else {
                        rng.next_f64_range(-1.0, 1.0)
                    }
                })
                .collect();
            (k, Diagonal::Values(values))
        })
        .collect();
    BandedMatrix::new(diagonals, (n, n)).unwrap()
}

/// Symmetric counterpart of [`random_dominant`]: offsets `k > 0` are drawn
/// and mirrored to `-k`.
pub fn random_symmetric_dominant(upper: &[isize], n: usize, seed: u64) -> BandedMatrix {
    let mut rng = Lcg::new(seed);
    let m = 2.0 * upper.len() as f64;
    let mut diagonals: Vec<(isize, Diagonal)> = Vec::new();
    for &k in upper {
        let len = diagonal_length(k, n, n);
        let values: Vec<f64> = (0..len).map(|_| rng.next_f64_range(-1.0, 1.0)).collect();
        diagonals.push((k, Diagonal::Values(values.clone())));
        diagonals.push((-k, Diagonal::Values(values)));
    }
    let main = (0..n).map(|_| rng.next_f64_range(m + 0.5, m + 1.5)).collect();
    diagonals.push((0, Diagonal::Values(main)));
    BandedMatrix::new(diagonals, (n, n)).unwrap()
}

/// Random vector of length `n` in [-1, 1).
pub fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = Lcg::new(seed);
    (0..n).map(|_| rng.next_f64_range(-1.0, 1.0)).collect()
}

// ---------------------------------------------------------------------------
// Dense reference
// ---------------------------------------------------------------------------

/// Dense Gaussian elimination with partial pivoting.
pub fn dense_solve(a: &Array2<f64>, b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut m = a.clone();
    let mut x = b.to_vec();
    for k in 0..n {
        let p = (k..n)
            .max_by(|&i, &j| m[[i, k]].abs().total_cmp(&m[[j, k]].abs()))
            .unwrap();
        if p != k {
            for j in 0..n {
                m.swap([k, j], [p, j]);
            }
            x.swap(k, p);
        }
        for i in (k + 1)..n {
            let l = m[[i, k]] / m[[k, k]];
            for j in k..n {
                m[[i, j]] -= l * m[[k, j]];
            }
            x[i] -= l * x[k];
        }
    }
    for k in (0..n).rev() {
        let s: f64 = ((k + 1)..n).map(|j| m[[k, j]] * x[j]).sum();
        x[k] = (x[k] - s) / m[[k, k]];
    }
    x
}

/// `A x` for a dense matrix.
pub fn dense_matvec(a: &Array2<f64>, x: &[f64]) -> Vec<f64> {
    a.rows()
        .into_iter()
        .map(|row| row.iter().zip(x).map(|(a, x)| a * x).sum())
        .collect()
}

/// Largest absolute elementwise difference.
pub fn max_abs_diff<'a>(
    a: impl IntoIterator<Item = &'a f64>,
    b: impl IntoIterator<Item = &'a f64>,
) -> f64 {
    a.into_iter()
        .zip(b)
        .fold(0.0f64, |m, (x, y)| m.max((x - y).abs()))
}
