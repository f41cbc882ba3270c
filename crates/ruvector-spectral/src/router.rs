//! Direct solver selection.
//!
//! [`select_solver`] inspects the sorted set of non-zero diagonal offsets of
//! a [`BandedMatrix`] and picks the cheapest sweep that handles it.
//!
//! # Decision table
//!
//! | Condition | Solver |
//! |-----------|--------|
//! | not square | `Generic` (rejected at factorisation) |
//! | `{0}` with unit values | `Identity` |
//! | fewer than [`MIN_SPECIALISED_SIZE`] unknowns | `Generic` |
//! | `{0, 2}` | `TwoDma` |
//! | `{-2, 0, 2}` | `Tdma` |
//! | `{-1, 0, 1}` and symmetric | `TdmaO` |
//! | `{-2, 0, 2, 4}` | `Fdma` |
//! | `{-4, -2, 0, 2, 4}` and symmetric | `Pdma` |
//! | anything else | `Generic` |

use tracing::debug;

use crate::banded::BandedMatrix;
use crate::types::SolverKind;

/// Smallest system routed to a specialised sweep; smaller systems are
/// factored with the generic LU.
pub const MIN_SPECIALISED_SIZE: usize = 5;

/// Pick the direct solver for `matrix`.
///
/// # Example
///
/// ```rust
/// use ruvector_spectral::banded::BandedMatrix;
/// use ruvector_spectral::router::select_solver;
/// use ruvector_spectral::types::{Diagonal, SolverKind};
///
/// let a = BandedMatrix::new(
///     [(0, Diagonal::Scalar(4.0)), (2, Diagonal::Scalar(-1.0))],
///     (8, 8),
/// )
/// .unwrap();
/// assert_eq!(select_solver(&a), SolverKind::TwoDma);
/// ```
pub fn select_solver(matrix: &BandedMatrix) -> SolverKind {
    let (rows, cols) = matrix.shape();
    if rows != cols {
        debug!(rows, cols, "non-square system; routing to generic LU");
        return SolverKind::Generic;
    }

    let offsets = matrix.nonzero_offsets();
    if offsets == [0] && matrix.get(0).is_some_and(|d| d.is_unit()) {
        debug!(n = rows, "routing to scaled identity");
        return SolverKind::Identity;
    }
    if rows < MIN_SPECIALISED_SIZE {
        debug!(n = rows, "small system; routing to generic LU");
        return SolverKind::Generic;
    }

    let kind = match offsets.as_slice() {
        [0, 2] => SolverKind::TwoDma,
        [-2, 0, 2] => SolverKind::Tdma,
        [-1, 0, 1] if matrix.is_symmetric() => SolverKind::TdmaO,
        [-2, 0, 2, 4] => SolverKind::Fdma,
        [-4, -2, 0, 2, 4] if matrix.is_symmetric() => SolverKind::Pdma,
        _ => SolverKind::Generic,
    };
    debug!(n = rows, ?offsets, %kind, "selected direct solver");
    kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Diagonal;

    fn matrix(offsets: &[(isize, f64)], n: usize) -> BandedMatrix {
        BandedMatrix::new(
            offsets.iter().map(|&(k, v)| (k, Diagonal::Scalar(v))),
            (n, n),
        )
        .unwrap()
    }

    #[test]
    fn routes_by_offsets() {
        assert_eq!(select_solver(&matrix(&[(0, 1.0)], 8)), SolverKind::Identity);
        assert_eq!(
            select_solver(&matrix(&[(-2, 1.0), (0, 4.0), (2, 1.0)], 8)),
            SolverKind::Tdma
        );
        assert_eq!(
            select_solver(&matrix(&[(-1, 1.0), (0, 4.0), (1, 1.0)], 8)),
            SolverKind::TdmaO
        );
        assert_eq!(
            select_solver(&matrix(&[(-2, 1.0), (0, 4.0), (2, 1.0), (4, 0.5)], 8)),
            SolverKind::Fdma
        );
        assert_eq!(
            select_solver(&matrix(&[(-4, 0.1), (-2, 1.0), (0, 4.0), (2, 1.0), (4, 0.1)], 9)),
            SolverKind::Pdma
        );
    }

    #[test]
    fn asymmetric_tridiagonal_falls_back() {
        assert_eq!(
            select_solver(&matrix(&[(-1, 1.0), (0, 4.0), (1, 2.0)], 8)),
            SolverKind::Generic
        );
    }

    #[test]
    fn zero_diagonals_are_ignored() {
        assert_eq!(
            select_solver(&matrix(&[(-2, 0.0), (0, 4.0), (2, 1.0)], 8)),
            SolverKind::TwoDma
        );
    }

    #[test]
    fn small_systems_use_generic() {
        assert_eq!(
            select_solver(&matrix(&[(0, 4.0), (2, 1.0)], 4)),
            SolverKind::Generic
        );
    }
}
