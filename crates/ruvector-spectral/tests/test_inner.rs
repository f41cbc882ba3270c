//! Integration tests for inner-product matrices.

use std::sync::Arc;

use approx::assert_relative_eq;
use ruvector_spectral::basis::{Basis, Legendre, LegendreDirichlet};
use ruvector_spectral::config::{Construction, SpectralConfig};
use ruvector_spectral::error::SpectralError;
use ruvector_spectral::inner::{BasisArg, Measure, SpectralMatrix};
use ruvector_spectral::types::MatrixKey;

fn config(construction: Construction) -> SpectralConfig {
    SpectralConfig {
        construction,
        ..Default::default()
    }
}

#[test]
fn test_linear_measure_gives_tridiagonal_mass() {
    let n = 8;
    let basis: Arc<dyn Basis> = Arc::new(Legendre::new(n));
    let m = SpectralMatrix::assemble(
        BasisArg::new(Arc::clone(&basis), 0),
        BasisArg::new(Arc::clone(&basis), 0),
        Measure::Polynomial(vec![0.0, 1.0]),
        &config(Construction::Exact),
    )
    .unwrap();

    assert!(m.name().is_none());
    assert_eq!(m.sorted_offsets(), vec![-1, 1]);
    assert!(m.is_symmetric());
    let sub = m.diagonal_values(-1).unwrap();
    for (j, value) in sub.iter().enumerate() {
        let j = j as f64;
        let expected = 2.0 * (j + 1.0) / ((2.0 * j + 1.0) * (2.0 * j + 3.0));
        assert_relative_eq!(*value, expected, epsilon = 1e-13);
    }
}

#[test]
fn test_dirichlet_laplacian_by_quadrature_matches_closed_form() {
    let n = 10;
    let basis: Arc<dyn Basis> = Arc::new(LegendreDirichlet::new(n));
    let test = BasisArg::new(Arc::clone(&basis), 0);
    let trial = BasisArg::new(Arc::clone(&basis), 2);

    let quadrature = SpectralMatrix::new(
        test.clone(),
        trial.clone(),
        Measure::default(),
        &config(Construction::Dense),
    )
    .unwrap();
    let analytic = SpectralMatrix::assemble(test, trial, Measure::default(), &SpectralConfig::default())
        .unwrap();

    assert_eq!(analytic.name(), Some("ADDmat"));
    assert_eq!(analytic.key(), MatrixKey::Named("ADDmat".into()));
    assert_eq!(quadrature.shape(), (n - 2, n - 2));
    assert!(quadrature.approx_eq(&analytic, 1e-11));
    assert!(analytic.check_sanity(&SpectralConfig::default()).is_ok());
}

#[test]
fn test_function_measure_uses_oversampled_rule() {
    let n = 6;
    let basis: Arc<dyn Basis> = Arc::new(Legendre::new(n));
    let args = || {
        (
            BasisArg::new(Arc::clone(&basis), 0),
            BasisArg::new(Arc::clone(&basis), 0),
        )
    };
    let (test, trial) = args();
    let by_function = SpectralMatrix::new(
        test,
        trial,
        Measure::Function(Arc::new(|x| 1.0 + x * x)),
        &config(Construction::Exact),
    )
    .unwrap();
    let (test, trial) = args();
    let by_polynomial = SpectralMatrix::new(
        test,
        trial,
        Measure::Polynomial(vec![1.0, 0.0, 1.0]),
        &config(Construction::Exact),
    )
    .unwrap();
    assert!(by_function.approx_eq(&by_polynomial, 1e-12));
    assert_eq!(by_function.sorted_offsets(), vec![-2, 0, 2]);
}

#[test]
fn test_scaled_matrix_fails_sanity_check() {
    let n = 6;
    let basis: Arc<dyn Basis> = Arc::new(Legendre::new(n));
    let mut mass = SpectralMatrix::assemble(
        BasisArg::new(Arc::clone(&basis), 0),
        BasisArg::new(Arc::clone(&basis), 0),
        Measure::default(),
        &SpectralConfig::default(),
    )
    .unwrap();
    assert_eq!(mass.name(), Some("BLLmat"));
    mass.set_scale(1.5);
    assert!(matches!(
        mass.check_sanity(&SpectralConfig::default()),
        Err(SpectralError::SanityCheckFailed { offset: 0, .. })
    ));
}

#[test]
fn test_config_json_round_trip() {
    let config = SpectralConfig {
        construction: Construction::Denser,
        extract_abstol: 1e-12,
        ..Default::default()
    };
    let json = config.to_json().unwrap();
    assert_eq!(SpectralConfig::from_json(&json).unwrap(), config);

    let partial = SpectralConfig::from_json(r#"{"construction": "exact"}"#).unwrap();
    assert_eq!(partial.construction, Construction::Exact);
    assert_eq!(partial.equality_tol, 1e-8);
    assert!(matches!(
        SpectralConfig::from_json("{"),
        Err(SpectralError::Config(_))
    ));
}
