//! Inner-product matrices `(∂^p φ_test, ∂^q φ_trial)_w`.
//!
//! A [`SpectralMatrix`] is a [`BandedMatrix`] that remembers the test and
//! trial functions it was built from. Construction computes the dense Gram
//! matrix with one of three strategies and compresses it into diagonals:
//!
//! ```text
//! V[i, j] = Σ_q  w_q · m(x_q) · φ_test_i^(p)(x_q) · φ_trial_j^(q)(x_q)
//! ```
//!
//! where `w_q` already includes the basis weight and `m` is the measure.
//! Matrices with a closed form are available through [`analytic_form`];
//! [`check_sanity`] verifies a stored matrix against a fresh construction.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use ndarray::{Array2, ArrayViewD, ArrayViewMutD, Axis, Slice};
use tracing::{debug, instrument, warn};

use crate::banded::BandedMatrix;
use crate::basis::{Basis, BoundaryRole};
use crate::config::{Construction, MatvecFormat, SpectralConfig};
use crate::error::{Result, SpectralError, ValidationError};
use crate::operator::AxisOperator;
use crate::types::{diagonal_length, Diagonal, MatrixKey};
use crate::validation::validate_axis;

/// Relative tolerance of the sanity comparison.
pub const SANITY_RTOL: f64 = 1e-5;

/// Absolute tolerance of the sanity comparison.
pub const SANITY_ATOL: f64 = 1e-8;

/// Quadrature points used by the exact strategy for non-polynomial measures,
/// as a multiple of `N`.
pub const FUNCTION_MEASURE_OVERSAMPLING: usize = 4;

// ---------------------------------------------------------------------------
// Measure / BasisArg
// ---------------------------------------------------------------------------

/// Multiplicative weight inside the integral, in the reference coordinate.
#[derive(Clone)]
pub enum Measure {
    /// Constant factor.
    Constant(f64),
    /// Polynomial `Σ c_i x^i` with coefficients in ascending order.
    Polynomial(Vec<f64>),
    /// Arbitrary function of the reference coordinate.
    Function(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl Measure {
    /// Value at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Measure::Constant(c) => *c,
            Measure::Polynomial(coeffs) => coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c),
            Measure::Function(f) => f(x),
        }
    }

    /// Polynomial degree, `None` for an arbitrary function.
    pub fn degree(&self) -> Option<usize> {
        match self {
            Measure::Constant(_) => Some(0),
            Measure::Polynomial(coeffs) => Some(coeffs.len().saturating_sub(1)),
            Measure::Function(_) => None,
        }
    }
}

impl Default for Measure {
    fn default() -> Self {
        Measure::Constant(1.0)
    }
}

impl fmt::Debug for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Constant(c) => write!(f, "Constant({c})"),
            Measure::Polynomial(coeffs) => write!(f, "Polynomial({coeffs:?})"),
            Measure::Function(_) => write!(f, "Function(..)"),
        }
    }
}

/// A basis together with the derivative order applied to it.
#[derive(Debug, Clone)]
pub struct BasisArg {
    /// Function space.
    pub basis: Arc<dyn Basis>,
    /// Number of derivatives.
    pub order: usize,
}

impl BasisArg {
    /// `order`-th derivative of the functions of `basis`.
    pub fn new(basis: Arc<dyn Basis>, order: usize) -> Self {
        Self { basis, order }
    }

    fn signature(&self) -> (&'static str, usize) {
        (self.basis.family(), self.order)
    }
}

// ---------------------------------------------------------------------------
// Dense construction
// ---------------------------------------------------------------------------

/// Number of quadrature points used by `construction`.
pub fn quadrature_points(
    test: &BasisArg,
    trial: &BasisArg,
    measure: &Measure,
    construction: Construction,
) -> usize {
    let n = test.basis.n();
    match construction {
        Construction::Dense => n,
        Construction::Denser => (3 * n) / 2,
        Construction::Exact => match measure.degree() {
            Some(measure_degree) => {
                let degree = test.basis.polynomial_degree().saturating_sub(test.order)
                    + trial.basis.polynomial_degree().saturating_sub(trial.order)
                    + measure_degree;
                (degree / 2 + 1).max(n)
            }
            None => FUNCTION_MEASURE_OVERSAMPLING * n,
        },
    }
}

/// Dense Gram matrix of shape `(test.dim(), trial.dim())`.
#[instrument(skip_all, fields(test = test.basis.family(), trial = trial.basis.family(), ?construction))]
pub fn gram_matrix(
    test: &BasisArg,
    trial: &BasisArg,
    measure: &Measure,
    construction: Construction,
) -> Result<Array2<f64>> {
    let points = quadrature_points(test, trial, measure, construction);
    if points == 0 {
        return Err(ValidationError::ParameterOutOfRange {
            name: "quadrature points".into(),
            value: "0".into(),
            expected: "at least one point".into(),
        }
        .into());
    }

    let quadrature = test.basis.quadrature(points);
    let x = quadrature.points.to_vec();
    let mut v = test.basis.evaluate_derivative_all(&x, test.order);
    let u = trial.basis.evaluate_derivative_all(&x, trial.order);
    if v.nrows() != x.len() || u.nrows() != x.len() {
        return Err(SpectralError::Precondition(format!(
            "basis evaluation returned {} and {} rows for {} points",
            v.nrows(),
            u.nrows(),
            x.len()
        )));
    }

    for ((mut row, &w), &xq) in v.rows_mut().into_iter().zip(&quadrature.weights).zip(&x) {
        row *= w * measure.eval(xq);
    }
    let dense = v.t().dot(&u);
    debug!(points, shape = ?dense.dim(), "gram matrix assembled");
    Ok(dense)
}

/// Compress a dense matrix into diagonals; see [`BandedMatrix::from_dense`].
pub fn extract_diagonal_matrix(dense: &Array2<f64>, abstol: f64, reltol: f64) -> BandedMatrix {
    BandedMatrix::from_dense(dense, abstol, reltol)
}

// ---------------------------------------------------------------------------
// SpectralMatrix
// ---------------------------------------------------------------------------

/// Banded matrix computed from an inner product of test and trial functions.
#[derive(Debug, Clone)]
pub struct SpectralMatrix {
    matrix: BandedMatrix,
    test: BasisArg,
    trial: BasisArg,
    measure: Measure,
    name: Option<String>,
}

impl SpectralMatrix {
    /// Build by quadrature with the configured strategy, then compress.
    pub fn new(
        test: BasisArg,
        trial: BasisArg,
        measure: Measure,
        config: &SpectralConfig,
    ) -> Result<Self> {
        let dense = gram_matrix(&test, &trial, &measure, config.construction)?;
        let matrix = extract_diagonal_matrix(&dense, config.extract_abstol, config.extract_reltol);
        Ok(Self {
            matrix,
            test,
            trial,
            measure,
            name: None,
        })
    }

    /// Use a closed form when one is known, otherwise build by quadrature.
    pub fn assemble(
        test: BasisArg,
        trial: BasisArg,
        measure: Measure,
        config: &SpectralConfig,
    ) -> Result<Self> {
        match analytic_form(&test, &trial, &measure)? {
            Some(matrix) => Ok(matrix),
            None => Self::new(test, trial, measure, config),
        }
    }

    /// Wrap hand-computed diagonals under an analytic `name`.
    pub fn with_diagonals(
        name: impl Into<String>,
        diagonals: impl IntoIterator<Item = (isize, Diagonal)>,
        test: BasisArg,
        trial: BasisArg,
        measure: Measure,
    ) -> Result<Self> {
        let shape = (test.basis.dim(), trial.basis.dim());
        Ok(Self {
            matrix: BandedMatrix::new(diagonals, shape)?,
            test,
            trial,
            measure,
            name: Some(name.into()),
        })
    }

    /// Test function and derivative order.
    pub fn test(&self) -> &BasisArg {
        &self.test
    }

    /// Trial function and derivative order.
    pub fn trial(&self) -> &BasisArg {
        &self.trial
    }

    /// Measure inside the integral.
    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    /// Analytic name, if built from a closed form.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Drop the inner-product metadata.
    pub fn into_banded(self) -> BandedMatrix {
        self.matrix
    }

    /// `true` when the trial space lifts boundary values.
    pub fn is_bc_matrix(&self) -> bool {
        self.trial.basis.boundary_role() == BoundaryRole::Apply
    }

    /// Structural key: the analytic name, or basis families and orders.
    pub fn key(&self) -> MatrixKey {
        match &self.name {
            Some(name) => MatrixKey::Named(name.clone()),
            None => MatrixKey::Structural {
                test: self.test.signature(),
                trial: self.trial.signature(),
            },
        }
    }

    /// Verify the stored diagonals against a fresh quadrature construction.
    pub fn check_sanity(&self, config: &SpectralConfig) -> Result<()> {
        check_sanity(&self.matrix, &self.test, &self.trial, &self.measure, config)
    }
}

impl Deref for SpectralMatrix {
    type Target = BandedMatrix;

    fn deref(&self) -> &BandedMatrix {
        &self.matrix
    }
}

impl DerefMut for SpectralMatrix {
    fn deref_mut(&mut self) -> &mut BandedMatrix {
        &mut self.matrix
    }
}

impl AxisOperator for SpectralMatrix {
    fn banded(&self) -> &BandedMatrix {
        &self.matrix
    }

    fn key(&self) -> MatrixKey {
        SpectralMatrix::key(self)
    }

    fn is_bc_matrix(&self) -> bool {
        SpectralMatrix::is_bc_matrix(self)
    }

    fn matvec(
        &self,
        v: ArrayViewD<'_, f64>,
        c: ArrayViewMutD<'_, f64>,
        axis: usize,
        format: MatvecFormat,
    ) -> Result<()> {
        validate_axis(axis, v.ndim())?;
        let active = self.trial.basis.slice();
        if v.len_of(Axis(axis)) < active.end {
            return Err(ValidationError::DimensionMismatch(format!(
                "input extent {} along axis {axis} does not cover trial coefficients {active:?}",
                v.len_of(Axis(axis))
            ))
            .into());
        }
        let v = v.slice_axis(Axis(axis), Slice::from(active));
        self.matrix.matvec(v, c, axis, format)
    }

    fn rescaled(&self, scale: f64) -> Arc<dyn AxisOperator> {
        let mut copy = self.clone();
        copy.matrix.set_scale(scale);
        Arc::new(copy)
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Compare `matrix` (times its scale) with the matrix recomputed by
/// quadrature, diagonal by diagonal, with `allclose` semantics.
///
/// # Errors
///
/// [`SpectralError::SanityCheckFailed`] naming the first offending diagonal.
pub fn check_sanity(
    matrix: &BandedMatrix,
    test: &BasisArg,
    trial: &BasisArg,
    measure: &Measure,
    config: &SpectralConfig,
) -> Result<()> {
    let reference = SpectralMatrix::new(test.clone(), trial.clone(), measure.clone(), config)?;
    if reference.shape() != matrix.shape() {
        return Err(SpectralError::Precondition(format!(
            "stored shape {:?} differs from recomputed shape {:?}",
            matrix.shape(),
            reference.shape()
        )));
    }

    let (rows, cols) = matrix.shape();
    let mut offsets: Vec<isize> = matrix
        .sorted_offsets()
        .into_iter()
        .chain(reference.sorted_offsets())
        .collect();
    offsets.sort_unstable();
    offsets.dedup();

    for k in offsets {
        let mut deviation = 0.0f64;
        let mut ok = true;
        for t in 0..diagonal_length(k, rows, cols) {
            let stored = matrix.get(k).map_or(0.0, |d| matrix.scale() * d.get(t));
            let expected = reference.get(k).map_or(0.0, |d| reference.scale() * d.get(t));
            let diff = (stored - expected).abs();
            deviation = deviation.max(diff);
            if diff > SANITY_ATOL + SANITY_RTOL * expected.abs() {
                ok = false;
            }
        }
        if !ok {
            warn!(offset = k, deviation, "stored matrix disagrees with quadrature");
            return Err(SpectralError::SanityCheckFailed {
                offset: k,
                deviation,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Analytic forms
// ---------------------------------------------------------------------------

/// Legendre mass matrix `(P_i, P_j) = 2 / (2i + 1) δ_ij`.
pub fn legendre_mass(basis: Arc<dyn Basis>) -> Result<SpectralMatrix> {
    let n = basis.dim();
    let diagonal = (0..n).map(|k| 2.0 / (2 * k + 1) as f64).collect();
    SpectralMatrix::with_diagonals(
        "BLLmat",
        [(0, Diagonal::Values(diagonal))],
        BasisArg::new(Arc::clone(&basis), 0),
        BasisArg::new(basis, 0),
        Measure::default(),
    )
}

/// Dirichlet Laplacian `(φ_i, φ_j'') = -(4i + 6) δ_ij` for
/// `φ_k = P_k - P_{k+2}`.
pub fn legendre_dirichlet_laplace(basis: Arc<dyn Basis>) -> Result<SpectralMatrix> {
    let n = basis.dim();
    let diagonal = (0..n).map(|k| -(4.0 * k as f64 + 6.0)).collect();
    SpectralMatrix::with_diagonals(
        "ADDmat",
        [(0, Diagonal::Values(diagonal))],
        BasisArg::new(Arc::clone(&basis), 0),
        BasisArg::new(basis, 2),
        Measure::default(),
    )
}

/// Closed form for `(test, trial, measure)` when one is known.
///
/// Only constant measures are recognised; the constant becomes the scale.
pub fn analytic_form(
    test: &BasisArg,
    trial: &BasisArg,
    measure: &Measure,
) -> Result<Option<SpectralMatrix>> {
    let Measure::Constant(c) = *measure else {
        return Ok(None);
    };
    if !Arc::ptr_eq(&test.basis, &trial.basis) && test.basis.family() != trial.basis.family() {
        return Ok(None);
    }
    if test.basis.n() != trial.basis.n() {
        return Ok(None);
    }
    let matrix = match (test.signature(), trial.signature()) {
        (("legendre", 0), ("legendre", 0)) => legendre_mass(Arc::clone(&test.basis))?,
        (("legendre-dirichlet", 0), ("legendre-dirichlet", 2)) => {
            legendre_dirichlet_laplace(Arc::clone(&test.basis))?
        }
        _ => return Ok(None),
    };
    let mut matrix = matrix;
    matrix.set_scale(c);
    debug!(key = %matrix.key(), "using analytic form");
    Ok(Some(matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{Legendre, LegendreBoundary, LegendreDirichlet};

    fn arg(basis: Arc<dyn Basis>, order: usize) -> BasisArg {
        BasisArg::new(basis, order)
    }

    #[test]
    fn legendre_mass_is_diagonal() {
        let basis: Arc<dyn Basis> = Arc::new(Legendre::new(8));
        let m = SpectralMatrix::new(
            arg(basis.clone(), 0),
            arg(basis, 0),
            Measure::default(),
            &SpectralConfig::default(),
        )
        .unwrap();
        assert_eq!(m.sorted_offsets(), vec![0]);
        let d = m.diagonal_values(0).unwrap();
        for (k, v) in d.iter().enumerate() {
            assert!((v - 2.0 / (2 * k + 1) as f64).abs() < 1e-13);
        }
    }

    #[test]
    fn strategies_agree() {
        let basis: Arc<dyn Basis> = Arc::new(LegendreDirichlet::new(10));
        let measure = Measure::Polynomial(vec![1.0, 0.5]);
        let build = |construction| {
            let config = SpectralConfig {
                construction,
                ..Default::default()
            };
            SpectralMatrix::new(arg(basis.clone(), 0), arg(basis.clone(), 1), measure.clone(), &config)
                .unwrap()
        };
        let dense = build(Construction::Dense);
        let denser = build(Construction::Denser);
        let exact = build(Construction::Exact);
        assert!(dense.approx_eq(&exact, 1e-12));
        assert!(denser.approx_eq(&exact, 1e-12));
    }

    #[test]
    fn structural_and_named_keys() {
        let basis: Arc<dyn Basis> = Arc::new(Legendre::new(6));
        let m = SpectralMatrix::new(
            arg(basis.clone(), 0),
            arg(basis.clone(), 1),
            Measure::default(),
            &SpectralConfig::default(),
        )
        .unwrap();
        assert_eq!(
            m.key(),
            MatrixKey::Structural {
                test: ("legendre", 0),
                trial: ("legendre", 1)
            }
        );
        let named = legendre_mass(basis).unwrap();
        assert_eq!(named.key(), MatrixKey::Named("BLLmat".into()));
    }

    #[test]
    fn analytic_forms_pass_sanity_check() {
        let config = SpectralConfig::default();
        let legendre: Arc<dyn Basis> = Arc::new(Legendre::new(9));
        legendre_mass(legendre).unwrap().check_sanity(&config).unwrap();

        let dirichlet: Arc<dyn Basis> = Arc::new(LegendreDirichlet::new(9));
        legendre_dirichlet_laplace(dirichlet).unwrap().check_sanity(&config).unwrap();
    }

    #[test]
    fn corrupted_matrix_fails_sanity_check() {
        let basis: Arc<dyn Basis> = Arc::new(Legendre::new(6));
        let mut m = legendre_mass(basis).unwrap();
        m.insert(2, Diagonal::Scalar(0.1)).unwrap();
        assert!(matches!(
            m.check_sanity(&SpectralConfig::default()),
            Err(SpectralError::SanityCheckFailed { offset: 2, .. })
        ));
    }

    #[test]
    fn analytic_form_is_scaled_by_constant_measure() {
        let basis: Arc<dyn Basis> = Arc::new(LegendreDirichlet::new(8));
        let m = SpectralMatrix::assemble(
            arg(basis.clone(), 0),
            arg(basis, 2),
            Measure::Constant(-2.0),
            &SpectralConfig::default(),
        )
        .unwrap();
        assert_eq!(m.name(), Some("ADDmat"));
        assert_eq!(m.scale(), -2.0);
    }

    #[test]
    fn boundary_matrix_detection_and_matvec_slice() {
        let n = 8;
        let test: Arc<dyn Basis> = Arc::new(LegendreDirichlet::new(n));
        let trial: Arc<dyn Basis> = Arc::new(LegendreBoundary::new(n));
        let m = SpectralMatrix::new(
            arg(test, 0),
            arg(trial, 0),
            Measure::default(),
            &SpectralConfig::default(),
        )
        .unwrap();
        assert!(m.is_bc_matrix());
        assert_eq!(m.shape(), (6, 2));

        // Only the trailing two coefficients feed the product.
        let mut v = ndarray::ArrayD::<f64>::zeros(ndarray::IxDyn(&[n]));
        v[[n - 2]] = 1.0;
        v[[n - 1]] = 1.0;
        let mut c = ndarray::ArrayD::<f64>::zeros(ndarray::IxDyn(&[n]));
        AxisOperator::matvec(&m, v.view(), c.view_mut(), 0, MatvecFormat::Vectorized).unwrap();
        // (1-x)/2 + (1+x)/2 = 1, and (φ_k, 1) = 2 δ_k0.
        assert!((c[[0]] - 2.0).abs() < 1e-13);
        assert!(c.iter().skip(1).all(|x| x.abs() < 1e-13));
    }
}
