//! Basis descriptors consumed by inner-product construction.
//!
//! Orthogonal polynomial families live outside this crate; everything the
//! matrix layer needs from them is expressed by the [`Basis`] trait. A small
//! Legendre family is provided for single-process use and for verification:
//!
//! - [`Legendre`]: orthogonal `P_0 .. P_{N-1}`;
//! - [`LegendreDirichlet`]: composite `φ_k = P_k - P_{k+2}`, zero at `±1`;
//! - [`LegendreBoundary`]: the two lifting functions `(1 ∓ x) / 2` with the
//!   [`BoundaryRole::Apply`] role.

use std::fmt;
use std::ops::Range;

use ndarray::{Array1, Array2};

/// Role of a function space with respect to boundary conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryRole {
    /// No boundary conditions are built into the basis.
    Neutral,
    /// Homogeneous Dirichlet conditions are built in.
    Dirichlet,
    /// Homogeneous Neumann conditions are built in.
    Neumann,
    /// Periodic basis (Fourier-like, diagonal operators).
    Periodic,
    /// Lifting basis that applies inhomogeneous boundary values.
    Apply,
}

/// Quadrature points and weights on the reference domain.
///
/// The weights already include the weight function of the basis.
#[derive(Debug, Clone)]
pub struct Quadrature {
    /// Quadrature points.
    pub points: Array1<f64>,
    /// Weights, including the basis weight function.
    pub weights: Array1<f64>,
}

/// One-dimensional function space as seen by the matrix layer.
pub trait Basis: Send + Sync + fmt::Debug {
    /// Family name; two bases with the same family build structurally
    /// identical matrices.
    fn family(&self) -> &'static str;

    /// Number of quadrature points (and of coefficients in the full space).
    fn n(&self) -> usize;

    /// Number of basis functions.
    fn dim(&self) -> usize {
        let s = self.slice();
        s.end - s.start
    }

    /// Range of the active coefficients inside an array of length `n()`.
    fn slice(&self) -> Range<usize>;

    /// Boundary role of this space.
    fn boundary_role(&self) -> BoundaryRole;

    /// Highest polynomial degree among the basis functions.
    fn polynomial_degree(&self) -> usize {
        self.n().saturating_sub(1)
    }

    /// Quadrature rule with `points` nodes.
    fn quadrature(&self, points: usize) -> Quadrature;

    /// `k`-th derivative of every basis function at every point.
    ///
    /// Returns an array of shape `(x.len(), dim())`.
    fn evaluate_derivative_all(&self, x: &[f64], k: usize) -> Array2<f64>;
}

// ---------------------------------------------------------------------------
// Gauss-Legendre quadrature
// ---------------------------------------------------------------------------

/// Gauss-Legendre nodes (ascending) and weights on `[-1, 1]`.
///
/// Newton iteration on `P_n` from the Chebyshev-like initial guess; exact for
/// polynomials of degree `2n - 1`.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];
    for i in 0..n.div_ceil(2) {
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..100 {
            let (p, d) = legendre_with_derivative(n, x);
            dp = d;
            let dx = p / d;
            x -= dx;
            if dx.abs() < 1e-16 {
                let (_, d) = legendre_with_derivative(n, x);
                dp = d;
                break;
            }
        }
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points[i] = -x;
        points[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    (points, weights)
}

/// `(P_n(x), P_n'(x))`.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let (mut p0, mut p1) = (1.0, x);
    for k in 1..n {
        let p2 = ((2 * k + 1) as f64 * x * p1 - k as f64 * p0) / (k + 1) as f64;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

/// `P_j^{(k)}(x)` for `j < count`, via the differentiated three-term
/// recurrence `(j+1) P_{j+1}^{(k)} = (2j+1)(x P_j^{(k)} + k P_j^{(k-1)}) - j P_{j-1}^{(k)}`.
pub fn legendre_derivatives(count: usize, x: f64, k: usize) -> Vec<f64> {
    // prev[j] holds P_j^{(m-1)} while building order m.
    let mut prev: Vec<f64> = Vec::new();
    for m in 0..=k {
        let mut next = vec![0.0; count];
        for j in 0..count {
            next[j] = match j {
                0 => {
                    if m == 0 {
                        1.0
                    } else {
                        0.0
                    }
                }
                1 => match m {
                    0 => x,
                    1 => 1.0,
                    _ => 0.0,
                },
                _ => {
                    let jj = (j - 1) as f64;
                    let lower = if m > 0 { prev[j - 1] } else { 0.0 };
                    ((2.0 * jj + 1.0) * (x * next[j - 1] + m as f64 * lower) - jj * next[j - 2])
                        / (jj + 1.0)
                }
            };
        }
        prev = next;
    }
    prev
}

fn gauss_rule(points: usize) -> Quadrature {
    let (x, w) = gauss_legendre(points);
    Quadrature {
        points: Array1::from(x),
        weights: Array1::from(w),
    }
}

// ---------------------------------------------------------------------------
// Legendre family
// ---------------------------------------------------------------------------

/// Orthogonal Legendre basis `P_0 .. P_{N-1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Legendre {
    n: usize,
}

impl Legendre {
    /// Space with `n` modes.
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Basis for Legendre {
    fn family(&self) -> &'static str {
        "legendre"
    }

    fn n(&self) -> usize {
        self.n
    }

    fn slice(&self) -> Range<usize> {
        0..self.n
    }

    fn boundary_role(&self) -> BoundaryRole {
        BoundaryRole::Neutral
    }

    fn quadrature(&self, points: usize) -> Quadrature {
        gauss_rule(points)
    }

    fn evaluate_derivative_all(&self, x: &[f64], k: usize) -> Array2<f64> {
        let mut v = Array2::zeros((x.len(), self.n));
        for (q, &xq) in x.iter().enumerate() {
            for (j, p) in legendre_derivatives(self.n, xq, k).into_iter().enumerate() {
                v[[q, j]] = p;
            }
        }
        v
    }
}

/// Composite Dirichlet basis `φ_k = P_k - P_{k+2}`, `k < N - 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegendreDirichlet {
    n: usize,
}

impl LegendreDirichlet {
    /// Space built on `n` Legendre modes (`n - 2` functions).
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Basis for LegendreDirichlet {
    fn family(&self) -> &'static str {
        "legendre-dirichlet"
    }

    fn n(&self) -> usize {
        self.n
    }

    fn slice(&self) -> Range<usize> {
        0..self.n.saturating_sub(2)
    }

    fn boundary_role(&self) -> BoundaryRole {
        BoundaryRole::Dirichlet
    }

    fn quadrature(&self, points: usize) -> Quadrature {
        gauss_rule(points)
    }

    fn evaluate_derivative_all(&self, x: &[f64], k: usize) -> Array2<f64> {
        let dim = self.dim();
        let mut v = Array2::zeros((x.len(), dim));
        for (q, &xq) in x.iter().enumerate() {
            let p = legendre_derivatives(self.n, xq, k);
            for j in 0..dim {
                v[[q, j]] = p[j] - p[j + 2];
            }
        }
        v
    }
}

/// Lifting functions `(1 - x) / 2` and `(1 + x) / 2` occupying the last two
/// coefficients of an `N`-mode array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegendreBoundary {
    n: usize,
}

impl LegendreBoundary {
    /// Lifting space attached to an `n`-mode Dirichlet space.
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Basis for LegendreBoundary {
    fn family(&self) -> &'static str {
        "legendre-boundary"
    }

    fn n(&self) -> usize {
        self.n
    }

    fn slice(&self) -> Range<usize> {
        self.n.saturating_sub(2)..self.n
    }

    fn boundary_role(&self) -> BoundaryRole {
        BoundaryRole::Apply
    }

    fn polynomial_degree(&self) -> usize {
        1
    }

    fn quadrature(&self, points: usize) -> Quadrature {
        gauss_rule(points)
    }

    fn evaluate_derivative_all(&self, x: &[f64], k: usize) -> Array2<f64> {
        let mut v = Array2::zeros((x.len(), 2));
        for (q, &xq) in x.iter().enumerate() {
            let (a, b) = match k {
                0 => (0.5 * (1.0 - xq), 0.5 * (1.0 + xq)),
                1 => (-0.5, 0.5),
                _ => (0.0, 0.0),
            };
            v[[q, 0]] = a;
            v[[q, 1]] = b;
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauss_legendre_integrates_polynomials_exactly() {
        let (x, w) = gauss_legendre(5);
        // ∫ x^8 dx over [-1, 1] = 2/9, degree 8 <= 2*5 - 1.
        let integral: f64 = x.iter().zip(&w).map(|(x, w)| w * x.powi(8)).sum();
        assert!((integral - 2.0 / 9.0).abs() < 1e-14);
        assert!((w.iter().sum::<f64>() - 2.0).abs() < 1e-14);
        assert!(x.windows(2).all(|p| p[0] < p[1]));
    }

    #[test]
    fn legendre_values_and_derivatives() {
        let x = 0.3;
        let p = legendre_derivatives(4, x, 0);
        assert!((p[2] - 0.5 * (3.0 * x * x - 1.0)).abs() < 1e-15);
        assert!((p[3] - 0.5 * (5.0 * x * x * x - 3.0 * x)).abs() < 1e-15);
        let dp = legendre_derivatives(4, x, 1);
        assert!((dp[2] - 3.0 * x).abs() < 1e-15);
        assert!((dp[3] - 0.5 * (15.0 * x * x - 3.0)).abs() < 1e-14);
        let ddp = legendre_derivatives(4, x, 2);
        assert!((ddp[2] - 3.0).abs() < 1e-14);
        assert!((ddp[3] - 15.0 * x).abs() < 1e-14);
    }

    #[test]
    fn dirichlet_functions_vanish_at_boundary() {
        let basis = LegendreDirichlet::new(8);
        let v = basis.evaluate_derivative_all(&[-1.0, 1.0], 0);
        assert_eq!(v.dim(), (2, 6));
        assert!(v.iter().all(|x| x.abs() < 1e-13));
    }

    #[test]
    fn boundary_basis_occupies_trailing_slice() {
        let basis = LegendreBoundary::new(8);
        assert_eq!(basis.slice(), 6..8);
        assert_eq!(basis.dim(), 2);
        assert_eq!(basis.boundary_role(), BoundaryRole::Apply);
    }
}
