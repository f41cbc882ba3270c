//! Tensor-product matrices: one bilinear term of a multi-dimensional form.
//!
//! A [`TPMatrix`] is the outer product `A_0 ⊗ A_1 ⊗ ... ⊗ A_{D-1}` of per-axis
//! operators multiplied by a `scale` array that broadcasts against the local
//! spectral array. Axes along which every operator is diagonal (Fourier-like
//! directions) are folded into `scale` by [`TPMatrix::get_simplified`], so
//! products and solves only ever touch the remaining non-diagonal axes:
//!
//! | non-diagonal axes | `matvec` | `solve` |
//! |-------------------|----------|---------|
//! | 0 | `c = scale · v` | `u = b / scale` |
//! | 1 | banded product along the axis | [`Generic1DSolver`] |
//! | 2 | product, transfer, product, transfer back | [`Generic2DSolver`] |

use std::fmt;
use std::ops::{Mul, MulAssign, Neg};
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn, Slice, Zip};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::banded::{BandedMatrix, DIVISION_THRESHOLD};
use crate::config::{MatvecFormat, SparseFormat};
use crate::error::{Result, SpectralError, ValidationError};
use crate::operator::{operators_equal, AxisOperator};
use crate::space::{MixedSpace, TensorSpace};
use crate::sparse::{AssembledMatrix, CsrMatrix};
use crate::tensor_solve::{Generic1DSolver, Generic2DSolver};
use crate::types::{Constraint, Diagonal, MatrixKey};

// ---------------------------------------------------------------------------
// Broadcasting helpers
// ---------------------------------------------------------------------------

/// Shape that `a` and `b` broadcast to, NumPy style.
pub(crate) fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    if a.len() != b.len() {
        return Err(ValidationError::DimensionMismatch(format!(
            "cannot broadcast {a:?} against {b:?}"
        ))
        .into());
    }
    a.iter()
        .zip(b)
        .map(|(&x, &y)| match (x, y) {
            _ if x == y => Ok(x),
            (1, _) => Ok(y),
            (_, 1) => Ok(x),
            _ => Err(ValidationError::DimensionMismatch(format!(
                "cannot broadcast {a:?} against {b:?}"
            ))
            .into()),
        })
        .collect()
}

/// Elementwise `f(a, b)` over the broadcast shape.
pub(crate) fn broadcast_zip(
    a: ArrayViewD<'_, f64>,
    b: ArrayViewD<'_, f64>,
    f: impl Fn(f64, f64) -> f64,
) -> Result<ArrayD<f64>> {
    let shape = IxDyn(&broadcast_shape(a.shape(), b.shape())?);
    match (a.broadcast(shape.clone()), b.broadcast(shape)) {
        (Some(a), Some(b)) => Ok(Zip::from(a).and(b).map_collect(|&x, &y| f(x, y))),
        _ => Err(SpectralError::Precondition("broadcast failed".into())),
    }
}

/// `c *= scale`, broadcasting `scale` into the shape of `c`.
pub(crate) fn scale_in_place(c: &mut ArrayViewMutD<'_, f64>, scale: &ArrayD<f64>) -> Result<()> {
    let Some(s) = scale.broadcast(c.raw_dim()) else {
        return Err(ValidationError::DimensionMismatch(format!(
            "scale of shape {:?} does not broadcast to {:?}",
            scale.shape(),
            c.shape()
        ))
        .into());
    };
    c.zip_mut_with(&s, |x, y| *x *= *y);
    Ok(())
}

/// Value of a broadcastable `scale` at `index`; unit extents read entry 0.
pub(crate) fn scale_value(scale: &ArrayD<f64>, index: &[usize]) -> Result<f64> {
    let idx: Vec<usize> = scale
        .shape()
        .iter()
        .zip(index)
        .map(|(&extent, &i)| if extent == 1 { 0 } else { i })
        .collect();
    scale.get(idx.as_slice()).copied().ok_or_else(|| {
        ValidationError::DimensionMismatch(format!(
            "index {index:?} outside scale of shape {:?}",
            scale.shape()
        ))
        .into()
    })
}

// ---------------------------------------------------------------------------
// TPMatrix
// ---------------------------------------------------------------------------

/// Outer product of per-axis operators with a broadcastable scale.
#[derive(Clone)]
pub struct TPMatrix {
    mats: Vec<Arc<dyn AxisOperator>>,
    test_space: Arc<dyn TensorSpace>,
    trial_space: Arc<dyn TensorSpace>,
    scale: ArrayD<f64>,
    global_index: (usize, usize),
    test_base: Option<Arc<MixedSpace>>,
    trial_base: Option<Arc<MixedSpace>>,
    naxes: Vec<usize>,
    simplified: bool,
    cache: OnceCell<Arc<TPMatrix>>,
}

impl TPMatrix {
    /// Term with unit scale in block `(0, 0)`.
    ///
    /// # Errors
    ///
    /// [`SpectralError::Precondition`] when the number of operators differs
    /// from the dimensionality of either space.
    pub fn new(
        mats: Vec<Arc<dyn AxisOperator>>,
        test_space: Arc<dyn TensorSpace>,
        trial_space: Arc<dyn TensorSpace>,
    ) -> Result<Self> {
        let dims = test_space.dimensions();
        if mats.len() != dims || trial_space.dimensions() != dims {
            return Err(SpectralError::Precondition(format!(
                "{} operators for a {dims}-dimensional test space and a {}-dimensional trial space",
                mats.len(),
                trial_space.dimensions()
            )));
        }
        Ok(Self {
            naxes: test_space.nondiagonal_axes(),
            scale: ArrayD::from_elem(IxDyn(&vec![1; dims]), 1.0),
            mats,
            test_space,
            trial_space,
            global_index: (0, 0),
            test_base: None,
            trial_base: None,
            simplified: false,
            cache: OnceCell::new(),
        })
    }

    /// Uniform scale.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale.fill(scale);
        self.cache = OnceCell::new();
        self
    }

    /// Scale array; it must broadcast against the spectral array.
    pub fn with_scale_array(mut self, scale: ArrayD<f64>) -> Result<Self> {
        self.set_scale(scale)?;
        Ok(self)
    }

    /// Block `(test component, trial component)` this term belongs to.
    pub fn with_global_index(mut self, index: (usize, usize)) -> Self {
        self.global_index = index;
        self
    }

    /// Mixed spaces this term is a component of.
    pub fn with_bases(mut self, test: Arc<MixedSpace>, trial: Arc<MixedSpace>) -> Self {
        self.test_base = Some(test);
        self.trial_base = Some(trial);
        self
    }

    // -- accessors -----------------------------------------------------------

    /// Per-axis operators.
    pub fn mats(&self) -> &[Arc<dyn AxisOperator>] {
        &self.mats
    }

    /// Broadcastable scale.
    pub fn scale(&self) -> &ArrayD<f64> {
        &self.scale
    }

    /// Replace the scale, dropping the cached simplified copy.
    pub fn set_scale(&mut self, scale: ArrayD<f64>) -> Result<()> {
        if scale.ndim() != self.dimensions() {
            return Err(ValidationError::DimensionMismatch(format!(
                "scale has {} axes, expected {}",
                scale.ndim(),
                self.dimensions()
            ))
            .into());
        }
        self.scale = scale;
        self.cache = OnceCell::new();
        Ok(())
    }

    /// `(test component, trial component)`.
    pub fn global_index(&self) -> (usize, usize) {
        self.global_index
    }

    /// Axes carrying a non-diagonal operator.
    pub fn naxes(&self) -> &[usize] {
        &self.naxes
    }

    /// Number of axes.
    pub fn dimensions(&self) -> usize {
        self.mats.len()
    }

    /// Test space.
    pub fn test_space(&self) -> &Arc<dyn TensorSpace> {
        &self.test_space
    }

    /// Trial space.
    pub fn trial_space(&self) -> &Arc<dyn TensorSpace> {
        &self.trial_space
    }

    /// Mixed test space, if any.
    pub fn test_base(&self) -> Option<&Arc<MixedSpace>> {
        self.test_base.as_ref()
    }

    /// Mixed trial space, if any.
    pub fn trial_base(&self) -> Option<&Arc<MixedSpace>> {
        self.trial_base.as_ref()
    }

    /// `true` for the output of [`get_simplified`](Self::get_simplified).
    pub fn is_simplified(&self) -> bool {
        self.simplified
    }

    /// Key of the single non-diagonal operator.
    pub fn get_key(&self) -> Result<MatrixKey> {
        match self.naxes.as_slice() {
            [axis] => Ok(self.mats[*axis].key()),
            axes => Err(SpectralError::Precondition(format!(
                "get_key needs exactly one non-diagonal axis, found {axes:?}"
            ))),
        }
    }

    /// Every operator is an identity and the scale is one.
    pub fn is_identity(&self) -> bool {
        self.mats.iter().all(|m| m.banded().is_identity()) && self.scale.iter().all(|&s| s == 1.0)
    }

    /// Every operator is diagonal.
    pub fn is_diagonal(&self) -> bool {
        self.mats.iter().all(|m| m.banded().is_diagonal())
    }

    /// Some operator lifts boundary values.
    pub fn is_bc_matrix(&self) -> bool {
        self.mats.iter().any(|m| m.is_bc_matrix())
    }

    fn keys(&self) -> Vec<String> {
        self.mats.iter().map(|m| m.key().to_string()).collect()
    }

    // -- simplification ------------------------------------------------------

    /// Copy with diagonal-axis operators folded into the scale.
    ///
    /// Diagonal axes get identity operators and their (scaled) main diagonal,
    /// zero-padded to the space extent, multiplied into `scale`. The scales
    /// of the remaining operators are folded in as well, and the result is
    /// restricted to the local index range. Computed once and cached.
    pub fn get_simplified(&self) -> Result<Arc<TPMatrix>> {
        self.cache
            .get_or_try_init(|| self.build_simplified().map(Arc::new))
            .map(Arc::clone)
    }

    fn build_simplified(&self) -> Result<TPMatrix> {
        if self.simplified {
            return Ok(self.clone());
        }
        let dims = self.dimensions();
        let shape = self.test_space.shape();
        let local = self.test_space.local_slice();

        let mut scale = self.scale.clone();
        for (axis, window) in local.iter().enumerate() {
            let extent = scale.len_of(ndarray::Axis(axis));
            if extent > 1 && extent == shape[axis] && window.len() != extent {
                scale = scale
                    .slice_axis(ndarray::Axis(axis), Slice::from(window.clone()))
                    .to_owned();
            }
        }

        let mut mats: Vec<Arc<dyn AxisOperator>> = Vec::with_capacity(dims);
        for (axis, op) in self.mats.iter().enumerate() {
            let m = op.banded();
            if self.naxes.contains(&axis) {
                let s = m.scale();
                if s != 1.0 {
                    scale.mapv_inplace(|x| x * s);
                }
                mats.push(op.rescaled(1.0));
                continue;
            }
            if !(m.is_diagonal() || m.is_empty()) {
                return Err(SpectralError::Precondition(format!(
                    "operator on diagonal axis {axis} stores offsets {:?}",
                    m.sorted_offsets()
                )));
            }
            let len = m.rows().min(m.cols());
            let mut values = m.get(0).map_or_else(|| vec![0.0; len], |d| d.to_vec(len));
            values.iter_mut().for_each(|v| *v *= m.scale());
            values.resize(len.max(shape[axis]), 0.0);

            let window = local[axis].clone();
            let mut factor_shape = vec![1; dims];
            factor_shape[axis] = window.len();
            let factor = ArrayD::from_shape_vec(IxDyn(&factor_shape), values[window].to_vec())
                .map_err(|e| SpectralError::Precondition(e.to_string()))?;
            scale = broadcast_zip(scale.view(), factor.view(), |a, b| a * b)?;
            mats.push(Arc::new(BandedMatrix::new(
                [(0, Diagonal::Scalar(1.0))],
                m.shape(),
            )?));
        }
        debug!(naxes = ?self.naxes, scale_shape = ?scale.shape(), "simplified tensor-product matrix");

        Ok(TPMatrix {
            mats,
            scale,
            simplified: true,
            cache: OnceCell::new(),
            ..self.clone()
        })
    }

    /// Copy with every operator's own scale folded into `scale`.
    fn normalized(&self) -> TPMatrix {
        let mut out = self.clone();
        out.cache = OnceCell::new();
        for op in out.mats.iter_mut() {
            let s = op.banded().scale();
            if s != 1.0 {
                out.scale.mapv_inplace(|x| x * s);
                *op = op.rescaled(1.0);
            }
        }
        out
    }

    // -- products ------------------------------------------------------------

    /// `c = self · v`.
    ///
    /// The two-axis case requires the current pencil to be undistributed
    /// along its aligned axis.
    pub fn matvec(
        &self,
        v: ArrayViewD<'_, f64>,
        mut c: ArrayViewMutD<'_, f64>,
        format: MatvecFormat,
    ) -> Result<()> {
        let dims = self.dimensions();
        if v.ndim() != dims || c.ndim() != dims {
            return Err(ValidationError::DimensionMismatch(format!(
                "{}-dimensional operator applied to arrays with {} and {} axes",
                dims,
                v.ndim(),
                c.ndim()
            ))
            .into());
        }
        let s = self.get_simplified()?;
        match s.naxes.as_slice() {
            [] => {
                if v.shape() != c.shape() {
                    return Err(ValidationError::DimensionMismatch(format!(
                        "input shape {:?} differs from output shape {:?}",
                        v.shape(),
                        c.shape()
                    ))
                    .into());
                }
                c.assign(&v);
                scale_in_place(&mut c, &s.scale)
            }
            [axis] => {
                s.mats[*axis].matvec(v, c.view_mut(), *axis, format)?;
                scale_in_place(&mut c, &s.scale)
            }
            [_, _] => s.matvec_two_axes(v, c, format),
            axes => Err(SpectralError::Precondition(format!(
                "matvec supports at most two non-diagonal axes, found {axes:?}"
            ))),
        }
    }

    fn matvec_two_axes(
        &self,
        v: ArrayViewD<'_, f64>,
        mut c: ArrayViewMutD<'_, f64>,
        format: MatvecFormat,
    ) -> Result<()> {
        let space = if self.test_space.is_padded() {
            self.test_space.unplanned().ok_or_else(|| {
                SpectralError::Precondition("padded space has no unpadded counterpart".into())
            })?
        } else {
            Arc::clone(&self.test_space)
        };
        let pencil = space.pencil();
        let axis = pencil.axis();
        let subcomms = pencil.subcomm_sizes();
        if subcomms.get(axis) != Some(&1) {
            return Err(SpectralError::Precondition(format!(
                "pencil is distributed along its aligned axis {axis} (subcomms {subcomms:?})"
            )));
        }
        let Some(&second) = self.naxes.iter().find(|&&a| a != axis) else {
            return Err(SpectralError::Precondition(format!(
                "aligned axis {axis} is not one of the non-diagonal axes {:?}",
                self.naxes
            )));
        };
        if !self.naxes.contains(&axis) {
            return Err(SpectralError::Precondition(format!(
                "aligned axis {axis} is not one of the non-diagonal axes {:?}",
                self.naxes
            )));
        }

        let transfer = pencil.transfer(second)?;
        let mut c_b = ArrayD::zeros(IxDyn(transfer.subshape_b()));
        let mut c_c = ArrayD::zeros(IxDyn(transfer.subshape_b()));
        self.mats[axis].matvec(v, c.view_mut(), axis, format)?;
        transfer.forward(c.view(), c_b.view_mut())?;
        self.mats[second].matvec(c_b.view(), c_c.view_mut(), second, format)?;
        transfer.backward(c_c.view(), c.view_mut())?;
        scale_in_place(&mut c, &self.scale)
    }

    /// Allocating [`matvec`](Self::matvec) into an array shaped like `v`.
    pub fn apply(&self, v: &ArrayViewD<'_, f64>, format: MatvecFormat) -> Result<ArrayD<f64>> {
        let mut c = ArrayD::zeros(v.raw_dim());
        self.matvec(v.view(), c.view_mut(), format)?;
        Ok(c)
    }

    // -- solves --------------------------------------------------------------

    /// Solve `self · u = b`.
    ///
    /// Without non-diagonal axes the constraints must be empty or
    /// `[(0, 0.0)]`; the quotient is taken on the trial active slices and
    /// non-finite entries are set to zero.
    pub fn solve(&self, b: &ArrayViewD<'_, f64>, constraints: &[Constraint]) -> Result<ArrayD<f64>> {
        let s = self.get_simplified()?;
        match s.naxes.len() {
            0 => s.solve_scaled_identity(b, constraints),
            1 => Generic1DSolver::new(std::slice::from_ref(s.as_ref()))?.solve(b, constraints),
            2 => Generic2DSolver::new(std::slice::from_ref(s.as_ref()))?.solve(b, constraints),
            n => Err(SpectralError::Precondition(format!(
                "solve supports at most two non-diagonal axes, found {n}"
            ))),
        }
    }

    fn solve_scaled_identity(
        &self,
        b: &ArrayViewD<'_, f64>,
        constraints: &[Constraint],
    ) -> Result<ArrayD<f64>> {
        if !(constraints.is_empty() || constraints == [(0, 0.0)]) {
            return Err(SpectralError::Precondition(format!(
                "scaled-identity solve accepts only the homogeneous constraint (0, 0.0), got {constraints:?}"
            )));
        }
        if b.ndim() != self.dimensions() {
            return Err(ValidationError::DimensionMismatch(format!(
                "rhs has {} axes, expected {}",
                b.ndim(),
                self.dimensions()
            ))
            .into());
        }
        let active = self.trial_space.active_slices();
        for (axis, window) in active.iter().enumerate() {
            if b.shape()[axis] < window.end {
                return Err(ValidationError::DimensionMismatch(format!(
                    "rhs extent {} along axis {axis} does not cover {window:?}",
                    b.shape()[axis]
                ))
                .into());
            }
        }
        let window = |ax: ndarray::AxisDescription| Slice::from(active[ax.axis.index()].clone());
        let scale = self.scale.slice_each_axis(|ax| {
            if ax.len > 1 {
                window(ax)
            } else {
                Slice::from(..)
            }
        });
        let rhs = b.slice_each_axis(window);

        let mut masked = 0usize;
        let mut quotient = broadcast_zip(rhs, scale, |x, s| x / s)?;
        quotient.mapv_inplace(|q| {
            if q.is_finite() {
                q
            } else {
                masked += 1;
                0.0
            }
        });
        if masked > 0 {
            debug!(masked, "zeroed non-finite entries of scaled-identity solve");
        }

        let mut u = ArrayD::zeros(b.raw_dim());
        u.slice_each_axis_mut(window).assign(&quotient);
        Ok(u)
    }

    // -- assembly ------------------------------------------------------------

    /// Kronecker product of all per-axis operators times the (single) scale.
    ///
    /// # Errors
    ///
    /// [`SpectralError::Precondition`] when the scale is not a single value.
    pub fn diags(&self, format: SparseFormat) -> Result<AssembledMatrix> {
        if self.scale.len() != 1 {
            return Err(SpectralError::Precondition(format!(
                "diags needs a single scale value, found shape {:?}",
                self.scale.shape()
            )));
        }
        let factor = self.scale.iter().next().copied().unwrap_or(1.0);
        let mut ops = self.mats.iter();
        let Some(first) = ops.next() else {
            return Err(SpectralError::Precondition("no axes to assemble".into()));
        };
        let product = ops.fold(first.banded().csr_scaled(), |acc, op| {
            acc.kron(&op.banded().csr_scaled())
        });
        Ok(AssembledMatrix::from_csr(product.scaled(factor), format))
    }

    /// Kronecker product over the non-diagonal axes, scaled by the entry of
    /// the simplified scale at `it` (indices along the diagonal axes,
    /// ascending; missing entries are zero).
    pub(crate) fn block_at(&self, it: &[usize]) -> Result<CsrMatrix> {
        let s = self.get_simplified()?;
        let mut index = vec![0; s.dimensions()];
        let diagonal_axes = (0..s.dimensions()).filter(|a| !s.naxes.contains(a));
        for (axis, &i) in diagonal_axes.zip(it) {
            index[axis] = i;
        }
        let value = scale_value(&s.scale, &index)?;
        let product = s.naxes.iter().fold(CsrMatrix::identity(1), |acc, &axis| {
            acc.kron(&s.mats[axis].banded().csr_scaled())
        });
        Ok(product.scaled(value))
    }

    // -- algebra -------------------------------------------------------------

    fn map_scale(&self, f: impl Fn(f64) -> f64) -> TPMatrix {
        let mut out = self.clone();
        out.scale.mapv_inplace(f);
        out.cache = OnceCell::new();
        out
    }

    /// `self * y`.
    pub fn scaled(&self, y: f64) -> TPMatrix {
        self.map_scale(|x| x * y)
    }

    /// `self / y`.
    ///
    /// # Errors
    ///
    /// [`SpectralError::Domain`] when `|y| < 1e-8`.
    pub fn checked_div(&self, y: f64) -> Result<TPMatrix> {
        if y.abs() < DIVISION_THRESHOLD {
            return Err(SpectralError::Domain {
                divisor: y,
                threshold: DIVISION_THRESHOLD,
            });
        }
        Ok(self.map_scale(|x| x / y))
    }

    /// `scale *= y` with broadcasting.
    pub fn mul_assign_array(&mut self, y: &ArrayViewD<'_, f64>) -> Result<()> {
        self.scale = broadcast_zip(self.scale.view(), y.view(), |a, b| a * b)?;
        self.cache = OnceCell::new();
        Ok(())
    }

    /// Sum of two structurally equal terms.
    ///
    /// # Errors
    ///
    /// [`SpectralError::StructuralMismatch`] when the terms differ in block
    /// index, per-axis key or per-axis values.
    pub fn try_add(&self, other: &TPMatrix) -> Result<TPMatrix> {
        self.combine(other, 1.0)
    }

    /// Difference of two structurally equal terms.
    pub fn try_sub(&self, other: &TPMatrix) -> Result<TPMatrix> {
        self.combine(other, -1.0)
    }

    /// `self += other` for structurally equal terms.
    pub fn merge(&mut self, other: &TPMatrix) -> Result<()> {
        *self = self.try_add(other)?;
        Ok(())
    }

    /// `self -= other` for structurally equal terms.
    pub fn merge_sub(&mut self, other: &TPMatrix) -> Result<()> {
        *self = self.try_sub(other)?;
        Ok(())
    }

    fn combine(&self, other: &TPMatrix, sign: f64) -> Result<TPMatrix> {
        if self != other {
            return Err(SpectralError::StructuralMismatch(format!(
                "terms {:?} {:?} and {:?} {:?} are not structurally equal",
                self.global_index,
                self.keys(),
                other.global_index,
                other.keys()
            )));
        }
        let a = self.normalized();
        let b = other.normalized();
        let scale = broadcast_zip(a.scale.view(), b.scale.view(), |x, y| x + sign * y)?;
        Ok(TPMatrix { scale, ..a })
    }
}

impl PartialEq for TPMatrix {
    /// Same block index, and per axis the same key and unscaled values.
    fn eq(&self, other: &Self) -> bool {
        self.global_index == other.global_index
            && self.mats.len() == other.mats.len()
            && self
                .mats
                .iter()
                .zip(&other.mats)
                .all(|(a, b)| operators_equal(a.as_ref(), b.as_ref()))
    }
}

impl fmt::Debug for TPMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TPMatrix")
            .field("keys", &self.keys())
            .field("global_index", &self.global_index)
            .field("naxes", &self.naxes)
            .field("scale_shape", &self.scale.shape())
            .field("simplified", &self.simplified)
            .finish()
    }
}

impl Neg for &TPMatrix {
    type Output = TPMatrix;

    fn neg(self) -> TPMatrix {
        self.scaled(-1.0)
    }
}

impl Mul<f64> for &TPMatrix {
    type Output = TPMatrix;

    fn mul(self, y: f64) -> TPMatrix {
        self.scaled(y)
    }
}

impl Mul<&TPMatrix> for f64 {
    type Output = TPMatrix;

    fn mul(self, m: &TPMatrix) -> TPMatrix {
        m.scaled(self)
    }
}

impl MulAssign<f64> for TPMatrix {
    fn mul_assign(&mut self, y: f64) {
        self.scale.mapv_inplace(|x| x * y);
        self.cache = OnceCell::new();
    }
}
