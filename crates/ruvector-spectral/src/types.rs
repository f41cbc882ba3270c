//! Core value types shared by every operator in the crate.
//!
//! Provides [`Diagonal`] (the per-offset storage of a banded matrix),
//! [`MatrixKey`] (structural identity used when merging tensor-product terms)
//! and [`SolverKind`] (the direct solver selected for a diagonal signature).

use serde::{Deserialize, Serialize};

/// Row constraint `(row, value)`: after a solve the unknown at `row` equals `value`.
pub type Constraint = (usize, f64);

/// Block constraint `(block, row, value)` addressing a row inside one
/// component of a [`BlockMatrix`](crate::block::BlockMatrix).
pub type BlockConstraint = (usize, usize, f64);

/// Length of diagonal `offset` in a `rows x cols` matrix.
///
/// Returns 0 when the diagonal lies entirely outside the matrix.
#[inline]
pub fn diagonal_length(offset: isize, rows: usize, cols: usize) -> usize {
    let (rows, cols) = (rows as isize, cols as isize);
    let len = if offset >= 0 {
        rows.min(cols - offset)
    } else {
        (rows + offset).min(cols)
    };
    len.max(0) as usize
}

/// `(row, col)` of entry `t` on diagonal `offset`.
#[inline]
pub fn diagonal_position(offset: isize, t: usize) -> (usize, usize) {
    if offset >= 0 {
        (t, t + offset as usize)
    } else {
        (t + offset.unsigned_abs(), t)
    }
}

// ---------------------------------------------------------------------------
// Diagonal
// ---------------------------------------------------------------------------

/// Values stored on one diagonal of a banded matrix.
///
/// A `Scalar` is broadcast along the whole diagonal; `Values` holds exactly
/// one entry per position on the diagonal, ordered from the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagonal {
    /// A single value repeated along the diagonal.
    Scalar(f64),
    /// One value per diagonal entry.
    Values(Vec<f64>),
}

impl Diagonal {
    /// Value at position `t` along the diagonal.
    #[inline]
    pub fn get(&self, t: usize) -> f64 {
        match self {
            Diagonal::Scalar(s) => *s,
            Diagonal::Values(v) => v[t],
        }
    }

    /// Expand into an owned vector of length `len`.
    pub fn to_vec(&self, len: usize) -> Vec<f64> {
        match self {
            Diagonal::Scalar(s) => vec![*s; len],
            Diagonal::Values(v) => v.clone(),
        }
    }

    /// Number of explicitly stored values (`None` for a broadcast scalar).
    pub fn stored_len(&self) -> Option<usize> {
        match self {
            Diagonal::Scalar(_) => None,
            Diagonal::Values(v) => Some(v.len()),
        }
    }

    /// Apply `f` to every stored value.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Diagonal {
        match self {
            Diagonal::Scalar(s) => Diagonal::Scalar(f(*s)),
            Diagonal::Values(v) => Diagonal::Values(v.iter().map(|&x| f(x)).collect()),
        }
    }

    /// Multiply by a scalar factor.
    pub fn scaled(&self, factor: f64) -> Diagonal {
        self.map(|x| x * factor)
    }

    /// Elementwise combination with another diagonal of the same length.
    ///
    /// Two scalars stay a scalar; anything else expands to `len` values.
    pub fn zip_with(&self, other: &Diagonal, len: usize, f: impl Fn(f64, f64) -> f64) -> Diagonal {
        match (self, other) {
            (Diagonal::Scalar(a), Diagonal::Scalar(b)) => Diagonal::Scalar(f(*a, *b)),
            _ => Diagonal::Values((0..len).map(|t| f(self.get(t), other.get(t))).collect()),
        }
    }

    /// Largest absolute value.
    pub fn max_abs(&self) -> f64 {
        match self {
            Diagonal::Scalar(s) => s.abs(),
            Diagonal::Values(v) => v.iter().fold(0.0f64, |m, x| m.max(x.abs())),
        }
    }

    /// Euclidean norm of the stored values (`|s|` for a scalar).
    pub fn norm(&self) -> f64 {
        match self {
            Diagonal::Scalar(s) => s.abs(),
            Diagonal::Values(v) => v.iter().map(|x| x * x).sum::<f64>().sqrt(),
        }
    }

    /// `true` when every stored value is exactly zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Diagonal::Scalar(s) => *s == 0.0,
            Diagonal::Values(v) => v.iter().all(|&x| x == 0.0),
        }
    }

    /// `true` when every stored value is exactly one.
    pub fn is_unit(&self) -> bool {
        match self {
            Diagonal::Scalar(s) => *s == 1.0,
            Diagonal::Values(v) => v.iter().all(|&x| x == 1.0),
        }
    }
}

impl From<f64> for Diagonal {
    fn from(value: f64) -> Self {
        Diagonal::Scalar(value)
    }
}

impl From<Vec<f64>> for Diagonal {
    fn from(values: Vec<f64>) -> Self {
        Diagonal::Values(values)
    }
}

// ---------------------------------------------------------------------------
// Structural keys
// ---------------------------------------------------------------------------

/// Structural identity of a per-axis operator.
///
/// Two tensor-product terms can only be merged when the operators on every
/// axis share a key (and agree numerically).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatrixKey {
    /// Operator built from a recognised analytic form.
    Named(String),
    /// Inner product identified by basis family and derivative order of its
    /// test and trial arguments.
    Structural {
        /// `(family, derivative order)` of the test function.
        test: (&'static str, usize),
        /// `(family, derivative order)` of the trial function.
        trial: (&'static str, usize),
    },
    /// Plain banded matrix identified by its set of diagonal offsets.
    Offsets(Vec<isize>),
}

impl std::fmt::Display for MatrixKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatrixKey::Named(name) => write!(f, "{name}"),
            MatrixKey::Structural { test, trial } => {
                write!(f, "({}, {}) x ({}, {})", test.0, test.1, trial.0, trial.1)
            }
            MatrixKey::Offsets(offsets) => write!(f, "offsets{offsets:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Solver identifiers
// ---------------------------------------------------------------------------

/// Direct solver family chosen for a banded system.
///
/// Selection is made by [`select_solver`](crate::router::select_solver) from
/// the sorted set of non-zero diagonal offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverKind {
    /// Scaled identity: `u = b / scale`.
    Identity,
    /// Upper two-diagonal back-substitution, offsets `{0, 2}`.
    TwoDma,
    /// Tridiagonal with stride 2, offsets `{-2, 0, 2}`.
    Tdma,
    /// Symmetric tridiagonal, offsets `{-1, 0, 1}`.
    TdmaO,
    /// Four-diagonal, offsets `{-2, 0, 2, 4}`.
    Fdma,
    /// Symmetric pentadiagonal with stride 2, offsets `{-4, -2, 0, 2, 4}`.
    Pdma,
    /// Sparse LU with partial pivoting for every other pattern.
    Generic,
}

impl std::fmt::Display for SolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverKind::Identity => write!(f, "identity"),
            SolverKind::TwoDma => write!(f, "twodma"),
            SolverKind::Tdma => write!(f, "tdma"),
            SolverKind::TdmaO => write!(f, "tdma-o"),
            SolverKind::Fdma => write!(f, "fdma"),
            SolverKind::Pdma => write!(f, "pdma"),
            SolverKind::Generic => write!(f, "generic-lu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_lengths_for_rectangular_shapes() {
        assert_eq!(diagonal_length(0, 4, 4), 4);
        assert_eq!(diagonal_length(2, 4, 4), 2);
        assert_eq!(diagonal_length(-3, 4, 4), 1);
        assert_eq!(diagonal_length(0, 3, 5), 3);
        assert_eq!(diagonal_length(2, 3, 5), 3);
        assert_eq!(diagonal_length(-1, 3, 5), 2);
        assert_eq!(diagonal_length(5, 3, 5), 0);
    }

    #[test]
    fn diagonal_positions() {
        assert_eq!(diagonal_position(2, 1), (1, 3));
        assert_eq!(diagonal_position(-2, 1), (3, 1));
        assert_eq!(diagonal_position(0, 4), (4, 4));
    }

    #[test]
    fn scalar_combination_stays_scalar() {
        let a = Diagonal::Scalar(2.0);
        let b = Diagonal::Scalar(3.0);
        assert_eq!(a.zip_with(&b, 10, |x, y| x + y), Diagonal::Scalar(5.0));

        let c = Diagonal::Values(vec![1.0, 2.0]);
        assert_eq!(a.zip_with(&c, 2, |x, y| x - y), Diagonal::Values(vec![1.0, 0.0]));
    }

    #[test]
    fn solver_kind_display() {
        assert_eq!(SolverKind::TdmaO.to_string(), "tdma-o");
        assert_eq!(SolverKind::Generic.to_string(), "generic-lu");
    }
}
