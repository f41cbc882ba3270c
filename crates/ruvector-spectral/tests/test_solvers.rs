//! Integration tests for the direct banded solvers.
//!
//! Every diagonal pattern is routed to its sweep and checked against a dense
//! reference solve, batched along each axis of a 3-D right-hand side, and
//! with row constraints.

mod helpers;

use approx::assert_relative_eq;
use ndarray::{ArrayD, Axis, IxDyn};
use ruvector_spectral::banded::BandedMatrix;
use ruvector_spectral::config::MatvecFormat;
use ruvector_spectral::direct::DirectSolver;
use ruvector_spectral::error::SpectralError;
use ruvector_spectral::types::SolverKind;

use helpers::{
    constant_banded, dense_matvec, dense_solve, max_abs_diff, random_dominant,
    random_symmetric_dominant, random_vector,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn patterns(n: usize) -> Vec<(SolverKind, BandedMatrix)> {
    vec![
        (SolverKind::TwoDma, random_dominant(&[0, 2], n, 11)),
        (SolverKind::Tdma, random_dominant(&[-2, 0, 2], n, 12)),
        (SolverKind::TdmaO, random_symmetric_dominant(&[1], n, 13)),
        (SolverKind::Fdma, random_dominant(&[-2, 0, 2, 4], n, 14)),
        (SolverKind::Pdma, random_symmetric_dominant(&[2, 4], n, 15)),
        (SolverKind::Generic, random_dominant(&[-3, -1, 0, 1, 2], n, 16)),
    ]
}

// ---------------------------------------------------------------------------
// Single right-hand side
// ---------------------------------------------------------------------------

#[test]
fn test_every_pattern_matches_dense_solve() {
    for n in [5, 9, 16] {
        for (kind, a) in patterns(n) {
            let solver = DirectSolver::new(&a).unwrap();
            assert_eq!(solver.kind(), kind, "n = {n}");

            let b = random_vector(n, 100 + n as u64);
            let x = solver.solve_vec(&b, &[]).unwrap();
            let reference = dense_solve(&a.to_dense(), &b);
            let err = max_abs_diff(&x, &reference);
            assert!(err < 1e-10, "{kind} n = {n}: error {err}");
        }
    }
}

#[test]
fn test_scale_divides_solution() {
    let n = 8;
    let a = random_dominant(&[-2, 0, 2], n, 21);
    let scaled = &a * 4.0;
    let b = random_vector(n, 22);
    let x = a.solver().unwrap().solve_vec(&b, &[]).unwrap();
    let y = scaled.solver().unwrap().solve_vec(&b, &[]).unwrap();
    for (x, y) in x.iter().zip(&y) {
        assert_relative_eq!(*x, 4.0 * y, epsilon = 1e-12);
    }
}

#[test]
fn test_scaled_identity_solve() {
    let a = BandedMatrix::identity(7, 2.0);
    let solver = a.solver().unwrap();
    assert_eq!(solver.kind(), SolverKind::Identity);
    let b = random_vector(7, 23);
    let x = solver.solve_vec(&b, &[]).unwrap();
    for (x, b) in x.iter().zip(&b) {
        assert_relative_eq!(*x, b / 2.0, epsilon = 1e-15);
    }
}

#[test]
fn test_small_systems_use_generic_lu() {
    let a = constant_banded(&[(-1, -1.0), (0, 4.0), (1, -1.0)], 4);
    let solver = DirectSolver::new(&a).unwrap();
    assert_eq!(solver.kind(), SolverKind::Generic);
    let b = [1.0, 2.0, 3.0, 4.0];
    let x = solver.solve_vec(&b, &[]).unwrap();
    let reference = dense_solve(&a.to_dense(), &b);
    assert!(max_abs_diff(&x, &reference) < 1e-12);
}

// ---------------------------------------------------------------------------
// Cached solver after mutation
// ---------------------------------------------------------------------------

#[test]
fn test_solve_after_scalar_multiply_assign_refactors() {
    let n = 12;
    let mut a = random_dominant(&[-2, 0, 2], n, 24);
    let b = ArrayD::from_shape_vec(IxDyn(&[n]), random_vector(n, 25)).unwrap();
    let u1 = a.solve(&b.view(), 0, &[]).unwrap();

    a *= 2.0;
    let u2 = a.solve(&b.view(), 0, &[]).unwrap();
    for (x, y) in u1.iter().zip(u2.iter()) {
        assert_relative_eq!(*y, 0.5 * x, epsilon = 1e-13);
    }

    a.set_scale(0.25);
    let u3 = a.solve(&b.view(), 0, &[]).unwrap();
    for (x, y) in u1.iter().zip(u3.iter()) {
        assert_relative_eq!(*y, 4.0 * x, epsilon = 1e-12);
    }
}

#[test]
fn test_solve_after_structural_mutation_matches_dense() {
    let n = 10;
    let mut a = random_dominant(&[-2, 0, 2], n, 26);
    let rhs = random_vector(n, 27);
    let b = ArrayD::from_shape_vec(IxDyn(&[n]), rhs.clone()).unwrap();
    a.solve(&b.view(), 0, &[]).unwrap();
    assert_eq!(a.solver().unwrap().kind(), SolverKind::Tdma);

    // A new band changes both the values and the selected sweep.
    a.insert(4, ruvector_spectral::types::Diagonal::Scalar(0.3)).unwrap();
    let u = a.solve(&b.view(), 0, &[]).unwrap();
    assert_eq!(a.solver().unwrap().kind(), SolverKind::Fdma);
    let reference = dense_solve(&a.to_dense(), &rhs);
    assert!(max_abs_diff(u.iter(), &reference) < 1e-10);

    a.remove(4);
    a.incorporate_scale();
    let u = a.solve(&b.view(), 0, &[]).unwrap();
    assert_eq!(a.solver().unwrap().kind(), SolverKind::Tdma);
    let reference = dense_solve(&a.to_dense(), &rhs);
    assert!(max_abs_diff(u.iter(), &reference) < 1e-10);
}

#[test]
fn test_clone_keeps_solving_original_values() {
    let n = 8;
    let a = random_dominant(&[0, 2], n, 28);
    let rhs = random_vector(n, 29);
    let before = a.solver().unwrap().solve_vec(&rhs, &[]).unwrap();

    let mut b = a.clone();
    b *= -1.0;
    let flipped = b.solver().unwrap().solve_vec(&rhs, &[]).unwrap();
    let again = a.solver().unwrap().solve_vec(&rhs, &[]).unwrap();
    assert_eq!(before, again);
    for (x, y) in before.iter().zip(&flipped) {
        assert_relative_eq!(*y, -x, epsilon = 1e-14);
    }
}

// ---------------------------------------------------------------------------
// Batched along each axis
// ---------------------------------------------------------------------------

#[test]
fn test_batched_solve_along_each_axis() {
    let n = 7;
    for (kind, a) in patterns(n) {
        for axis in 0..3 {
            let mut shape = vec![3, 2, 4];
            shape[axis] = n;
            let b = ArrayD::from_shape_fn(IxDyn(&shape), |i| {
                ((i[0] * 7 + i[1] * 3 + i[2]) as f64 * 0.37).sin()
            });
            let u = a.solve(&b.view(), axis, &[]).unwrap();
            let solver = a.solver().unwrap();
            for (lane_b, lane_u) in b.lanes(Axis(axis)).into_iter().zip(u.lanes(Axis(axis))) {
                let rhs: Vec<f64> = lane_b.iter().copied().collect();
                let expected = solver.solve_vec(&rhs, &[]).unwrap();
                let err = max_abs_diff(lane_u.iter(), &expected);
                assert!(err < 1e-13, "{kind} axis {axis}: error {err}");
            }

            // The solve inverts the product along the same axis.
            let back = a.apply(&u.view(), axis, MatvecFormat::Vectorized).unwrap();
            assert!(max_abs_diff(&back, &b) < 1e-10, "{kind} axis {axis}");
        }
    }
}

#[test]
fn test_entries_beyond_system_size_are_zero() {
    let n = 6;
    let a = random_dominant(&[-2, 0, 2], n, 31);
    let b = ArrayD::from_shape_fn(IxDyn(&[n + 2, 3]), |i| 1.0 + (i[0] + i[1]) as f64);
    let u = a.solve(&b.view(), 0, &[]).unwrap();
    assert_eq!(u.shape(), &[n + 2, 3]);
    for j in 0..3 {
        assert_eq!(u[[n, j]], 0.0);
        assert_eq!(u[[n + 1, j]], 0.0);
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

#[test]
fn test_constraints_pin_rows_exactly() {
    let n = 10;
    for (kind, a) in patterns(n) {
        let dense = a.to_dense();
        let b = random_vector(n, 41);
        for &(row, value) in &[(0usize, 0.75f64), (n / 2, -2.0)] {
            let x = a.solve(
                &ndarray::ArrayView1::from(&b).into_dyn(),
                0,
                &[(row, value)],
            )
            .unwrap();
            let x: Vec<f64> = x.iter().copied().collect();
            assert_eq!(x[row], value, "{kind} row {row}");

            // Every other row of the original system still holds.
            let ax = dense_matvec(&dense, &x);
            for i in (0..n).filter(|&i| i != row) {
                assert!(
                    (ax[i] - b[i]).abs() < 1e-10,
                    "{kind}: residual {} at row {i}",
                    ax[i] - b[i]
                );
            }
        }
    }
}

#[test]
fn test_constraint_out_of_bounds_is_rejected() {
    let a = random_dominant(&[-2, 0, 2], 6, 51);
    let b = random_vector(6, 52);
    let result = a.solver().unwrap().solve_vec(&b, &[(6, 1.0)]);
    assert!(matches!(result, Err(SpectralError::InvalidInput(_))));
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[test]
fn test_non_square_is_rejected() {
    let a = BandedMatrix::new(
        [(0, ruvector_spectral::types::Diagonal::Scalar(1.0))],
        (5, 6),
    )
    .unwrap();
    assert!(a.solver().is_err());
}

#[test]
fn test_zero_matrix_is_singular() {
    let a = BandedMatrix::zeros((6, 6));
    let b = random_vector(6, 61);
    let result = a.solver().unwrap().solve_vec(&b, &[]);
    assert!(matches!(result, Err(SpectralError::Singular { .. })));
}

#[test]
fn test_short_rhs_is_rejected() {
    let a = random_dominant(&[0, 2], 8, 71);
    let result = a.solver().unwrap().solve_vec(&[1.0; 5], &[]);
    assert!(matches!(result, Err(SpectralError::InvalidInput(_))));
}
