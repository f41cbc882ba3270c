//! Tensor-product function spaces and data layout.
//!
//! The matrix layer never owns a parallel decomposition; it sees one through
//! [`TensorSpace`], [`Pencil`] and [`Transfer`]. [`TensorProductSpace`] and
//! [`SerialPencil`] implement them for a single process, where every axis is
//! local and a transfer is a copy.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use ndarray::{ArrayViewD, ArrayViewMutD};

use crate::basis::{Basis, BoundaryRole};
use crate::error::{Result, ValidationError};
use crate::validation::validate_axis;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Redistribution of an array between two pencil alignments.
pub trait Transfer: Send + Sync + fmt::Debug {
    /// Local shape at the destination alignment.
    fn subshape_b(&self) -> &[usize];

    /// Move `a` (source alignment) into `b` (destination alignment).
    fn forward(&self, a: ArrayViewD<'_, f64>, b: ArrayViewMutD<'_, f64>) -> Result<()>;

    /// Move `b` (destination alignment) back into `a`.
    fn backward(&self, b: ArrayViewD<'_, f64>, a: ArrayViewMutD<'_, f64>) -> Result<()>;
}

/// One alignment of a distributed array.
pub trait Pencil: Send + Sync + fmt::Debug {
    /// Axis that is entirely local in this alignment.
    fn axis(&self) -> usize;

    /// Number of processes along each axis.
    fn subcomm_sizes(&self) -> Vec<usize>;

    /// Shape of the local block.
    fn local_shape(&self) -> Vec<usize>;

    /// Transfer from this alignment to the one aligned along `axis`.
    fn transfer(&self, axis: usize) -> Result<Box<dyn Transfer>>;
}

/// A D-dimensional tensor-product space as seen by the matrix layer.
pub trait TensorSpace: Send + Sync + fmt::Debug {
    /// Number of axes.
    fn dimensions(&self) -> usize;

    /// Global spectral shape.
    fn shape(&self) -> Vec<usize>;

    /// `true` when every operator along `axis` is diagonal.
    fn is_diagonal_axis(&self, axis: usize) -> bool;

    /// Axes whose operators are not diagonal, ascending.
    fn nondiagonal_axes(&self) -> Vec<usize> {
        (0..self.dimensions())
            .filter(|&axis| !self.is_diagonal_axis(axis))
            .collect()
    }

    /// Index range owned by this process along each axis.
    fn local_slice(&self) -> Vec<Range<usize>>;

    /// Active coefficient range of the basis along each axis.
    fn active_slices(&self) -> Vec<Range<usize>>;

    /// Current data alignment.
    fn pencil(&self) -> Arc<dyn Pencil>;

    /// `true` when the forward transform pads for dealiasing.
    fn is_padded(&self) -> bool {
        false
    }

    /// Counterpart of a padded space without padding.
    fn unplanned(&self) -> Option<Arc<dyn TensorSpace>> {
        None
    }
}

// ---------------------------------------------------------------------------
// Serial implementations
// ---------------------------------------------------------------------------

/// One axis of a [`TensorProductSpace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSpace {
    /// Number of coefficients.
    pub n: usize,
    /// Every operator along the axis is diagonal.
    pub diagonal: bool,
    /// Active coefficients.
    pub active: Range<usize>,
}

impl AxisSpace {
    /// Axis spanned by `basis`; periodic bases are diagonal.
    pub fn from_basis(basis: &dyn Basis) -> Self {
        Self {
            n: basis.n(),
            diagonal: basis.boundary_role() == BoundaryRole::Periodic,
            active: basis.slice(),
        }
    }

    /// Diagonal (Fourier-like) axis with `n` modes.
    pub fn periodic(n: usize) -> Self {
        Self {
            n,
            diagonal: true,
            active: 0..n,
        }
    }
}

/// Tensor-product space living entirely on one process.
#[derive(Debug, Clone)]
pub struct TensorProductSpace {
    axes: Vec<AxisSpace>,
    padded: bool,
}

impl TensorProductSpace {
    /// Space built from its axes.
    pub fn new(axes: Vec<AxisSpace>) -> Self {
        Self {
            axes,
            padded: false,
        }
    }

    /// Space whose axes are spanned by `bases`.
    pub fn from_bases(bases: &[Arc<dyn Basis>]) -> Self {
        Self::new(bases.iter().map(|b| AxisSpace::from_basis(b.as_ref())).collect())
    }

    /// Same space, marked as padding its transforms.
    pub fn padded(mut self) -> Self {
        self.padded = true;
        self
    }

    /// Per-axis descriptors.
    pub fn axes(&self) -> &[AxisSpace] {
        &self.axes
    }
}

impl TensorSpace for TensorProductSpace {
    fn dimensions(&self) -> usize {
        self.axes.len()
    }

    fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.n).collect()
    }

    fn is_diagonal_axis(&self, axis: usize) -> bool {
        self.axes.get(axis).is_some_and(|a| a.diagonal)
    }

    fn local_slice(&self) -> Vec<Range<usize>> {
        self.axes.iter().map(|a| 0..a.n).collect()
    }

    fn active_slices(&self) -> Vec<Range<usize>> {
        self.axes.iter().map(|a| a.active.clone()).collect()
    }

    fn pencil(&self) -> Arc<dyn Pencil> {
        let axis = self.nondiagonal_axes().first().copied().unwrap_or(0);
        Arc::new(SerialPencil::new(self.shape(), axis))
    }

    fn is_padded(&self) -> bool {
        self.padded
    }

    fn unplanned(&self) -> Option<Arc<dyn TensorSpace>> {
        self.padded.then(|| {
            Arc::new(Self {
                axes: self.axes.clone(),
                padded: false,
            }) as Arc<dyn TensorSpace>
        })
    }
}

/// Single-process alignment: every axis is local.
#[derive(Debug, Clone)]
pub struct SerialPencil {
    shape: Vec<usize>,
    axis: usize,
}

impl SerialPencil {
    /// Pencil over `shape` aligned along `axis`.
    pub fn new(shape: Vec<usize>, axis: usize) -> Self {
        Self { shape, axis }
    }
}

impl Pencil for SerialPencil {
    fn axis(&self) -> usize {
        self.axis
    }

    fn subcomm_sizes(&self) -> Vec<usize> {
        vec![1; self.shape.len()]
    }

    fn local_shape(&self) -> Vec<usize> {
        self.shape.clone()
    }

    fn transfer(&self, axis: usize) -> Result<Box<dyn Transfer>> {
        validate_axis(axis, self.shape.len())?;
        Ok(Box::new(CopyTransfer {
            shape: self.shape.clone(),
        }))
    }
}

/// Transfer between two alignments of the same local block.
#[derive(Debug, Clone)]
struct CopyTransfer {
    shape: Vec<usize>,
}

impl CopyTransfer {
    fn copy(&self, src: ArrayViewD<'_, f64>, mut dst: ArrayViewMutD<'_, f64>) -> Result<()> {
        if src.shape() != dst.shape() {
            return Err(ValidationError::DimensionMismatch(format!(
                "transfer between shapes {:?} and {:?}",
                src.shape(),
                dst.shape()
            ))
            .into());
        }
        dst.assign(&src);
        Ok(())
    }
}

impl Transfer for CopyTransfer {
    fn subshape_b(&self) -> &[usize] {
        &self.shape
    }

    fn forward(&self, a: ArrayViewD<'_, f64>, b: ArrayViewMutD<'_, f64>) -> Result<()> {
        self.copy(a, b)
    }

    fn backward(&self, b: ArrayViewD<'_, f64>, a: ArrayViewMutD<'_, f64>) -> Result<()> {
        self.copy(b, a)
    }
}

/// Ordered components of a multi-field (mixed) space.
#[derive(Debug, Clone)]
pub struct MixedSpace {
    components: Vec<Arc<dyn TensorSpace>>,
}

impl MixedSpace {
    /// Mixed space over `components`.
    pub fn new(components: Vec<Arc<dyn TensorSpace>>) -> Self {
        Self { components }
    }

    /// Number of components.
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Component `i`.
    pub fn component(&self, i: usize) -> Option<&Arc<dyn TensorSpace>> {
        self.components.get(i)
    }
}
