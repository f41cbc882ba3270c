//! Banded matrix algebra for spectral-Galerkin discretisations.
//!
//! This crate provides the sparse matrix layer of a spectral PDE solver:
//! banded matrices stored by diagonal, inner-product matrices between basis
//! functions, tensor-product and block operators for multi-dimensional and
//! coupled systems, and fast direct solvers selected from the diagonal
//! pattern.
//!
//! # Direct solvers
//!
//! | Offsets | Solver | Method |
//! |---------|--------|--------|
//! | `{0}` | [`DiagonalFactor`](direct::DiagonalFactor) | `u = b / d` |
//! | `{0, 2}` | [`TwoDmaFactor`](direct::TwoDmaFactor) | upper two-diagonal back-substitution |
//! | `{-2, 0, 2}` | [`ThomasFactor`](direct::ThomasFactor) | Thomas algorithm, stride 2 |
//! | `{-1, 0, 1}` | [`ThomasFactor`](direct::ThomasFactor) | Thomas algorithm, stride 1 |
//! | `{-2, 0, 2, 4}` | [`FdmaFactor`](direct::FdmaFactor) | four-diagonal LU |
//! | `{-4, -2, 0, 2, 4}` | [`PdmaFactor`](direct::PdmaFactor) | symmetric pentadiagonal LU |
//! | anything else | [`SparseLu`](lu::SparseLu) | faer sparse LU with partial pivoting |
//!
//! # Example
//!
//! ```rust
//! use ndarray::{ArrayD, IxDyn};
//! use ruvector_spectral::banded::BandedMatrix;
//! use ruvector_spectral::config::MatvecFormat;
//! use ruvector_spectral::types::Diagonal;
//!
//! // -u'' on six interior points.
//! let a = BandedMatrix::new(
//!     [
//!         (-1, Diagonal::Scalar(-1.0)),
//!         (0, Diagonal::Scalar(2.0)),
//!         (1, Diagonal::Scalar(-1.0)),
//!     ],
//!     (6, 6),
//! )
//! .unwrap();
//!
//! let x = ArrayD::from_shape_fn(IxDyn(&[6]), |i| i[0] as f64);
//! let b = a.apply(&x.view(), 0, MatvecFormat::Vectorized).unwrap();
//! let u = a.solve(&b.view(), 0, &[]).unwrap();
//! assert!((&u - &x).iter().all(|e| e.abs() < 1e-12));
//! ```

pub mod basis;
pub mod banded;
pub mod block;
pub mod config;
pub mod direct;
pub mod error;
pub mod inner;
pub mod lu;
pub mod operator;
pub mod router;
pub mod simplify;
pub mod space;
pub mod sparse;
pub mod tensor_solve;
pub mod tpmatrix;
pub mod types;
pub mod validation;

pub use banded::BandedMatrix;
pub use block::{block_matrices, extract_bc_matrices, BlockEntry, BlockMatrix, BlockMatrixSolver};
pub use config::{Construction, MatvecFormat, SparseFormat, SpectralConfig};
pub use error::{Result, SpectralError, ValidationError};
pub use inner::{Measure, SpectralMatrix};
pub use simplify::get_simplified_tpmatrices;
pub use tensor_solve::{Generic1DSolver, Generic2DSolver};
pub use tpmatrix::TPMatrix;
pub use types::{BlockConstraint, Constraint, Diagonal, SolverKind};
