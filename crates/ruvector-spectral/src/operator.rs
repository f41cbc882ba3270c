//! Per-axis operators composed into tensor-product matrices.

use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayViewD, ArrayViewMutD};

use crate::banded::BandedMatrix;
use crate::config::MatvecFormat;
use crate::error::Result;
use crate::types::MatrixKey;

/// A banded operator acting along one axis of a tensor-product space.
///
/// Implemented by plain [`BandedMatrix`] values and by inner-product
/// matrices, which add a structural key and restrict products to the
/// trial basis' active coefficients.
pub trait AxisOperator: Send + Sync + fmt::Debug {
    /// Underlying diagonals and scale.
    fn banded(&self) -> &BandedMatrix;

    /// Structural identity used when merging terms.
    fn key(&self) -> MatrixKey {
        self.banded().key()
    }

    /// `true` when the trial space lifts boundary values.
    fn is_bc_matrix(&self) -> bool {
        false
    }

    /// `c = A v` along `axis`.
    fn matvec(
        &self,
        v: ArrayViewD<'_, f64>,
        c: ArrayViewMutD<'_, f64>,
        axis: usize,
        format: MatvecFormat,
    ) -> Result<()> {
        self.banded().matvec(v, c, axis, format)
    }

    /// Copy of this operator carrying `scale` instead of its own.
    fn rescaled(&self, scale: f64) -> Arc<dyn AxisOperator>;
}

impl AxisOperator for BandedMatrix {
    fn banded(&self) -> &BandedMatrix {
        self
    }

    fn rescaled(&self, scale: f64) -> Arc<dyn AxisOperator> {
        Arc::new(self.clone().with_scale(scale))
    }
}

/// Key and numeric equality of two axis operators.
pub fn operators_equal(a: &dyn AxisOperator, b: &dyn AxisOperator) -> bool {
    a.key() == b.key() && a.banded() == b.banded()
}
