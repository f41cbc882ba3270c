//! Error types for the spectral matrix crate.
//!
//! Precondition violations, domain errors, structural mismatches and failed
//! sanity checks are all reported synchronously at the call site. All errors
//! implement `std::error::Error` via `thiserror`.

use crate::types::SolverKind;

/// Primary error type for matrix construction, algebra and solves.
#[derive(Debug, thiserror::Error)]
pub enum SpectralError {
    /// A caller-side contract was broken (shape, axis, decomposition layout).
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// An arithmetic operation was asked to divide by a value too close to zero.
    #[error("domain error: cannot divide by {divisor:.3e} (|divisor| < {threshold:.0e})")]
    Domain {
        /// The rejected divisor.
        divisor: f64,
        /// Magnitude below which divisors are rejected.
        threshold: f64,
    },

    /// Two operators that must be structurally equal are not.
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    /// A stored matrix disagrees with the automatically recomputed one.
    #[error("sanity check failed for offset {offset}: max deviation {deviation:.3e}")]
    SanityCheckFailed {
        /// Diagonal on which the mismatch was found.
        offset: isize,
        /// Largest absolute deviation on that diagonal.
        deviation: f64,
    },

    /// A direct solver met an exactly (or numerically) zero pivot.
    #[error("singular system in {solver} solver at row {row} (pivot={pivot:.3e})")]
    Singular {
        /// Solver that detected the zero pivot.
        solver: SolverKind,
        /// Row at which elimination broke down.
        row: usize,
        /// Offending pivot value.
        pivot: f64,
    },

    /// The caller supplied invalid input (dimensions, constraints, values).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// A configuration document could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Validation errors for matrix and array inputs.
///
/// These are raised eagerly before any computation begins so that callers get
/// clear diagnostics rather than mysterious numerical failures.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Array or matrix dimensions are inconsistent.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A value is NaN or infinite where a finite number is required.
    #[error("non-finite value detected: {0}")]
    NonFiniteValue(String),

    /// An axis index does not exist on the array.
    #[error("axis {axis} out of bounds for array of dimension {ndim}")]
    AxisOutOfBounds {
        /// Requested axis.
        axis: usize,
        /// Dimensionality of the array.
        ndim: usize,
    },

    /// A constraint addresses a row outside the system.
    #[error("constraint row {row} out of bounds for system of size {size}")]
    ConstraintOutOfBounds {
        /// Offending row.
        row: usize,
        /// Number of unknowns in the system.
        size: usize,
    },

    /// A diagonal vector has the wrong length for its offset.
    #[error("diagonal {offset} has length {len}, expected {expected} for shape {rows}x{cols}")]
    DiagonalLength {
        /// Diagonal offset.
        offset: isize,
        /// Provided length.
        len: usize,
        /// Length implied by the offset and shape.
        expected: usize,
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// A parameter is outside its valid range.
    #[error("parameter out of range: {name} = {value} (expected {expected})")]
    ParameterOutOfRange {
        /// Name of the parameter.
        name: String,
        /// The invalid value (as a string for flexibility).
        value: String,
        /// Human-readable description of the valid range.
        expected: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SpectralError>;
