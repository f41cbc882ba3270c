//! Eager input validation for matrix construction, products and solves.
//!
//! All validation functions run before any computation begins, so callers
//! receive clear diagnostics instead of out-of-bounds panics deep inside a
//! sweep. Every function returns [`ValidationError`] on failure, which
//! converts into [`SpectralError::InvalidInput`] via `From`.
//!
//! [`SpectralError::InvalidInput`]: crate::error::SpectralError::InvalidInput

use crate::error::ValidationError;
use crate::types::{diagonal_length, Constraint, Diagonal};

// ---------------------------------------------------------------------------
// Diagonal validation
// ---------------------------------------------------------------------------

/// Validate one diagonal against the matrix shape.
///
/// Checks:
///
/// 1. The offset addresses at least one entry of the matrix.
/// 2. A `Values` diagonal has exactly the implied length.
/// 3. No `NaN` or `Inf` values.
pub fn validate_diagonal(
    offset: isize,
    diagonal: &Diagonal,
    shape: (usize, usize),
) -> Result<(), ValidationError> {
    let (rows, cols) = shape;
    let expected = diagonal_length(offset, rows, cols);
    if expected == 0 {
        return Err(ValidationError::ParameterOutOfRange {
            name: "offset".into(),
            value: offset.to_string(),
            expected: format!("({}, {})", -(rows as isize), cols),
        });
    }

    match diagonal {
        Diagonal::Scalar(s) => {
            if !s.is_finite() {
                return Err(ValidationError::NonFiniteValue(format!(
                    "diagonal {offset} = {s}"
                )));
            }
        }
        Diagonal::Values(values) => {
            if values.len() != expected {
                return Err(ValidationError::DiagonalLength {
                    offset,
                    len: values.len(),
                    expected,
                    rows,
                    cols,
                });
            }
            if let Some((t, v)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(ValidationError::NonFiniteValue(format!(
                    "diagonal {offset}[{t}] = {v}"
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Array validation
// ---------------------------------------------------------------------------

/// Validate that `axis` exists on an array of dimension `ndim`.
pub fn validate_axis(axis: usize, ndim: usize) -> Result<(), ValidationError> {
    if axis >= ndim {
        return Err(ValidationError::AxisOutOfBounds { axis, ndim });
    }
    Ok(())
}

/// Validate input and output arrays of a matrix-vector product along `axis`.
///
/// Checks:
///
/// 1. Both arrays have the same dimensionality and `axis` exists.
/// 2. Input has at least `cols` entries along `axis`, output at least `rows`.
/// 3. All other extents agree.
pub fn validate_matvec_shapes(
    input: &[usize],
    output: &[usize],
    axis: usize,
    shape: (usize, usize),
) -> Result<(), ValidationError> {
    if input.len() != output.len() {
        return Err(ValidationError::DimensionMismatch(format!(
            "input has {} axes but output has {}",
            input.len(),
            output.len()
        )));
    }
    validate_axis(axis, input.len())?;

    let (rows, cols) = shape;
    if input[axis] < cols {
        return Err(ValidationError::DimensionMismatch(format!(
            "input extent {} along axis {axis} is smaller than {cols} columns",
            input[axis]
        )));
    }
    if output[axis] < rows {
        return Err(ValidationError::DimensionMismatch(format!(
            "output extent {} along axis {axis} is smaller than {rows} rows",
            output[axis]
        )));
    }
    for (ax, (a, b)) in input.iter().zip(output).enumerate() {
        if ax != axis && a != b {
            return Err(ValidationError::DimensionMismatch(format!(
                "extent mismatch along axis {ax}: {a} vs {b}"
            )));
        }
    }
    Ok(())
}

/// Validate a right-hand side for a system of `size` unknowns along `axis`.
///
/// Emits a [`tracing::warn`] when every entry is zero: valid, but the
/// solution is then trivially zero unless constraints say otherwise.
pub fn validate_rhs(
    shape: &[usize],
    values: impl Iterator<Item = f64>,
    axis: usize,
    size: usize,
) -> Result<(), ValidationError> {
    validate_axis(axis, shape.len())?;
    if shape[axis] < size {
        return Err(ValidationError::DimensionMismatch(format!(
            "rhs extent {} along axis {axis} is smaller than system size {size}",
            shape[axis]
        )));
    }

    let mut all_zero = true;
    for (i, v) in values.enumerate() {
        if !v.is_finite() {
            return Err(ValidationError::NonFiniteValue(format!("rhs[{i}] = {v}")));
        }
        if v != 0.0 {
            all_zero = false;
        }
    }
    if all_zero && size > 0 {
        tracing::warn!("rhs is all zeros; solution will be trivially zero");
    }
    Ok(())
}

/// Validate constraint rows against a system of `size` unknowns.
pub fn validate_constraints(constraints: &[Constraint], size: usize) -> Result<(), ValidationError> {
    for &(row, value) in constraints {
        if row >= size {
            return Err(ValidationError::ConstraintOutOfBounds { row, size });
        }
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue(format!(
                "constraint value for row {row} = {value}"
            )));
        }
    }
    Ok(())
}

/// Require a square system.
pub fn validate_square(shape: (usize, usize)) -> Result<(), ValidationError> {
    if shape.0 != shape.1 {
        return Err(ValidationError::DimensionMismatch(format!(
            "direct solve requires a square matrix but got {}x{}",
            shape.0, shape.1
        )));
    }
    Ok(())
}
