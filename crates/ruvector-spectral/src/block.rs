//! Block matrices for coupled multi-component systems.
//!
//! A [`BlockMatrix`] is a grid indexed by `(test component, trial component)`
//! whose cells hold either a scalar multiple of the identity or a list of
//! simplified [`TPMatrix`] terms. Terms that land in the same cell and are
//! structurally equal are merged instead of appended.
//!
//! Boundary-lifting terms (trial space with the `Apply` role) act on the
//! right-hand side and must be kept apart from the regular terms before
//! assembly or solve; see [`block_matrices`].

use std::collections::HashMap;
use std::ops::{Index, Range};
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn, Slice};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{MatvecFormat, SparseFormat};
use crate::direct::{apply_constraints, constrain_triplets, constraint_rows, Factorization, MovedEntries};
use crate::error::{Result, SpectralError, ValidationError};
use crate::lu::SparseLu;
use crate::simplify::{get_simplified_tpmatrices, merge_into};
use crate::space::TensorSpace;
use crate::sparse::{block_assemble, prefix_sums, AssembledMatrix, CsrMatrix};
use crate::tensor_solve::{multi_indices, subview, subview_mut};
use crate::tpmatrix::TPMatrix;
use crate::types::{BlockConstraint, Constraint};

// ---------------------------------------------------------------------------
// BlockEntry
// ---------------------------------------------------------------------------

/// Content of one block.
#[derive(Debug, Clone)]
pub enum BlockEntry {
    /// `value · I`.
    Scalar(f64),
    /// Sum of tensor-product terms; empty for an unoccupied block.
    Terms(Vec<TPMatrix>),
}

impl BlockEntry {
    /// Unoccupied block.
    pub fn is_empty(&self) -> bool {
        matches!(self, BlockEntry::Terms(terms) if terms.is_empty())
    }
}

// ---------------------------------------------------------------------------
// BlockMatrix
// ---------------------------------------------------------------------------

/// Grid of blocks over the components of mixed test and trial spaces.
#[derive(Debug, Clone)]
pub struct BlockMatrix {
    grid: Vec<Vec<BlockEntry>>,
    row_spaces: Vec<Option<Arc<dyn TensorSpace>>>,
    col_spaces: Vec<Option<Arc<dyn TensorSpace>>>,
    solver: OnceCell<Arc<BlockMatrixSolver>>,
}

impl BlockMatrix {
    /// Simplify, merge and place `terms` by their global block index.
    ///
    /// The grid spans the components of the terms' mixed spaces, or the
    /// largest block index when no mixed space is attached.
    pub fn new(terms: &[TPMatrix]) -> Result<Self> {
        if terms.is_empty() {
            return Err(SpectralError::Precondition(
                "a block matrix needs at least one term".into(),
            ));
        }
        let mut rows = 0;
        let mut cols = 0;
        for term in terms {
            let (i, j) = term.global_index();
            rows = rows.max(i + 1);
            cols = cols.max(j + 1);
            if let Some(base) = term.test_base() {
                rows = rows.max(base.num_components());
            }
            if let Some(base) = term.trial_base() {
                cols = cols.max(base.num_components());
            }
        }

        let mut matrix = Self {
            grid: vec![vec![BlockEntry::Terms(Vec::new()); cols]; rows],
            row_spaces: vec![None; rows],
            col_spaces: vec![None; cols],
            solver: OnceCell::new(),
        };
        for term in terms {
            if let Some(base) = term.test_base() {
                for (i, slot) in matrix.row_spaces.iter_mut().enumerate() {
                    if slot.is_none() {
                        *slot = base.component(i).cloned();
                    }
                }
            }
            if let Some(base) = term.trial_base() {
                for (j, slot) in matrix.col_spaces.iter_mut().enumerate() {
                    if slot.is_none() {
                        *slot = base.component(j).cloned();
                    }
                }
            }
        }
        for term in get_simplified_tpmatrices(terms)? {
            matrix.insert(term)?;
        }
        debug!(rows, cols, terms = terms.len(), "block matrix assembled");
        Ok(matrix)
    }

    fn insert(&mut self, term: TPMatrix) -> Result<()> {
        let (i, j) = term.global_index();
        let (rows, cols) = self.shape();
        if i >= rows || j >= cols {
            return Err(SpectralError::Precondition(format!(
                "term block ({i}, {j}) outside a {rows}x{cols} block grid"
            )));
        }
        let term = term.get_simplified()?.as_ref().clone();
        self.row_spaces[i].get_or_insert_with(|| Arc::clone(term.test_space()));
        self.col_spaces[j].get_or_insert_with(|| Arc::clone(term.trial_space()));
        match &mut self.grid[i][j] {
            BlockEntry::Scalar(_) => Err(SpectralError::StructuralMismatch(format!(
                "block ({i}, {j}) holds a scalar"
            ))),
            BlockEntry::Terms(terms) => merge_into(terms, term),
        }
    }

    /// Accumulate further terms with the same merge rule.
    pub fn add_terms(&mut self, terms: &[TPMatrix]) -> Result<()> {
        for term in terms {
            self.insert(term.clone())?;
        }
        self.solver = OnceCell::new();
        Ok(())
    }

    /// `self + other` for grids of the same shape.
    pub fn try_add(&self, other: &BlockMatrix) -> Result<BlockMatrix> {
        let mut out = self.clone();
        out.merge(other)?;
        Ok(out)
    }

    /// `self += other` for grids of the same shape.
    pub fn merge(&mut self, other: &BlockMatrix) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(SpectralError::Precondition(format!(
                "cannot add block grids {:?} and {:?}",
                self.shape(),
                other.shape()
            )));
        }
        for (i, row) in other.grid.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                match entry {
                    BlockEntry::Scalar(s) => {
                        let sum = match self.grid[i][j] {
                            BlockEntry::Scalar(existing) => existing + s,
                            _ => *s,
                        };
                        self.set_scalar(i, j, sum)?;
                    }
                    BlockEntry::Terms(terms) => {
                        for term in terms {
                            self.insert(term.clone())?;
                        }
                    }
                }
            }
        }
        for (slot, space) in self.row_spaces.iter_mut().zip(&other.row_spaces) {
            if slot.is_none() {
                *slot = space.clone();
            }
        }
        for (slot, space) in self.col_spaces.iter_mut().zip(&other.col_spaces) {
            if slot.is_none() {
                *slot = space.clone();
            }
        }
        self.solver = OnceCell::new();
        Ok(())
    }

    /// Put `value · I` into block `(i, j)`, which must not hold terms.
    pub fn set_scalar(&mut self, i: usize, j: usize, value: f64) -> Result<()> {
        let (rows, cols) = self.shape();
        if i >= rows || j >= cols {
            return Err(SpectralError::Precondition(format!(
                "block ({i}, {j}) outside a {rows}x{cols} block grid"
            )));
        }
        let entry = &mut self.grid[i][j];
        if !(entry.is_empty() || matches!(entry, BlockEntry::Scalar(_))) {
            return Err(SpectralError::StructuralMismatch(format!(
                "block ({i}, {j}) already holds terms"
            )));
        }
        *entry = BlockEntry::Scalar(value);
        self.solver = OnceCell::new();
        Ok(())
    }

    // -- accessors -----------------------------------------------------------

    /// `(test components, trial components)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.grid.len(), self.col_spaces.len())
    }

    /// Block `(i, j)`, if inside the grid.
    pub fn get(&self, i: usize, j: usize) -> Option<&BlockEntry> {
        self.grid.get(i).and_then(|row| row.get(j))
    }

    /// Every term, row by row.
    pub fn get_mats(&self) -> Vec<&TPMatrix> {
        self.grid
            .iter()
            .flatten()
            .filter_map(|entry| match entry {
                BlockEntry::Terms(terms) => Some(terms.iter()),
                BlockEntry::Scalar(_) => None,
            })
            .flatten()
            .collect()
    }

    /// Some term lifts boundary values.
    pub fn contains_bc_matrix(&self) -> bool {
        self.get_mats().iter().any(|t| t.is_bc_matrix())
    }

    /// Some block is a scalar or a regular term.
    pub fn contains_regular_matrix(&self) -> bool {
        self.grid
            .iter()
            .flatten()
            .any(|entry| matches!(entry, BlockEntry::Scalar(_)))
            || self.get_mats().iter().any(|t| !t.is_bc_matrix())
    }

    /// Test space of block row `i`.
    pub fn row_space(&self, i: usize) -> Option<&Arc<dyn TensorSpace>> {
        self.row_spaces.get(i).and_then(Option::as_ref)
    }

    /// Trial space of block column `j`.
    pub fn col_space(&self, j: usize) -> Option<&Arc<dyn TensorSpace>> {
        self.col_spaces.get(j).and_then(Option::as_ref)
    }

    fn require_space<'a>(
        spaces: &'a [Option<Arc<dyn TensorSpace>>],
        k: usize,
        what: &str,
    ) -> Result<&'a Arc<dyn TensorSpace>> {
        spaces[k].as_ref().ok_or_else(|| {
            SpectralError::Precondition(format!("block {what} {k} has no space attached"))
        })
    }

    // -- products ------------------------------------------------------------

    /// `c = self · v` over component arrays.
    pub fn matvec(&self, v: &[ArrayD<f64>], c: &mut [ArrayD<f64>], format: MatvecFormat) -> Result<()> {
        let (rows, cols) = self.shape();
        if v.len() != cols || c.len() != rows {
            return Err(ValidationError::DimensionMismatch(format!(
                "{rows}x{cols} block grid applied to {} inputs and {} outputs",
                v.len(),
                c.len()
            ))
            .into());
        }
        for out in c.iter_mut() {
            out.fill(0.0);
        }
        for (i, row) in self.grid.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                match entry {
                    BlockEntry::Scalar(s) => {
                        if c[i].shape() != v[j].shape() {
                            return Err(ValidationError::DimensionMismatch(format!(
                                "scalar block ({i}, {j}) maps {:?} to {:?}",
                                v[j].shape(),
                                c[i].shape()
                            ))
                            .into());
                        }
                        c[i].scaled_add(*s, &v[j]);
                    }
                    BlockEntry::Terms(terms) => {
                        for term in terms {
                            let mut product = ArrayD::zeros(c[i].raw_dim());
                            term.matvec(v[j].view(), product.view_mut(), format)?;
                            c[i] += &product;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Allocating [`matvec`](Self::matvec); outputs are shaped like the
    /// test space of each block row.
    pub fn apply(&self, v: &[ArrayD<f64>], format: MatvecFormat) -> Result<Vec<ArrayD<f64>>> {
        let mut c = (0..self.shape().0)
            .map(|i| {
                Self::require_space(&self.row_spaces, i, "row")
                    .map(|space| ArrayD::zeros(IxDyn(&space.shape())))
            })
            .collect::<Result<Vec<_>>>()?;
        self.matvec(v, &mut c, format)?;
        Ok(c)
    }

    // -- assembly ------------------------------------------------------------

    /// Global sparse matrix at index `it` of the diagonal axes.
    ///
    /// # Errors
    ///
    /// [`SpectralError::StructuralMismatch`] when boundary and regular terms
    /// are mixed.
    pub fn diags(&self, it: &[usize], format: SparseFormat) -> Result<AssembledMatrix> {
        Ok(AssembledMatrix::from_csr(self.assemble(it)?, format))
    }

    fn assemble(&self, it: &[usize]) -> Result<CsrMatrix> {
        if self.contains_bc_matrix() && self.contains_regular_matrix() {
            return Err(SpectralError::StructuralMismatch(
                "block matrix mixes boundary and regular terms; separate them first".into(),
            ));
        }
        let (rows, cols) = self.shape();
        let mut row_sizes: Vec<Option<usize>> = vec![None; rows];
        let mut col_sizes: Vec<Option<usize>> = vec![None; cols];
        let mut blocks: Vec<Vec<Option<CsrMatrix>>> = vec![vec![None; cols]; rows];

        for (i, row) in self.grid.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                let BlockEntry::Terms(terms) = entry else { continue };
                let mut sum: Option<CsrMatrix> = None;
                for term in terms {
                    let block = term.block_at(it)?;
                    sum = Some(match sum {
                        Some(acc) => acc.add(&block)?,
                        None => block,
                    });
                }
                if let Some(block) = sum {
                    let (r, c) = block.shape();
                    check_size(&mut row_sizes[i], r, "row", i)?;
                    check_size(&mut col_sizes[j], c, "column", j)?;
                    blocks[i][j] = Some(block);
                }
            }
        }
        for (i, row) in self.grid.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                let BlockEntry::Scalar(s) = entry else { continue };
                let n = row_sizes[i]
                    .or(col_sizes[j])
                    .or_else(|| self.row_space(i).map(|sp| nondiagonal_size(sp.as_ref())))
                    .ok_or_else(|| {
                        SpectralError::Precondition(format!(
                            "size of scalar block ({i}, {j}) is not determined by any term"
                        ))
                    })?;
                check_size(&mut row_sizes[i], n, "row", i)?;
                check_size(&mut col_sizes[j], n, "column", j)?;
                blocks[i][j] = Some(CsrMatrix::identity(n).scaled(*s));
            }
        }
        let unwrap_sizes = |sizes: Vec<Option<usize>>, what: &str| {
            sizes
                .into_iter()
                .enumerate()
                .map(|(k, s)| {
                    s.ok_or_else(|| {
                        SpectralError::Precondition(format!("block {what} {k} is empty"))
                    })
                })
                .collect::<Result<Vec<_>>>()
        };
        let row_sizes = unwrap_sizes(row_sizes, "row")?;
        let col_sizes = unwrap_sizes(col_sizes, "column")?;
        block_assemble(&blocks, &row_sizes, &col_sizes)
    }

    // -- solves --------------------------------------------------------------

    /// Solve `self · u = b` over component arrays.
    ///
    /// Constraints `(block, row, value)` pin unknown `row` of trial
    /// component `block` in the zero mode of the diagonal axes. The solver
    /// is built on first use and cached on this instance.
    pub fn solve(&self, b: &[ArrayD<f64>], constraints: &[BlockConstraint]) -> Result<Vec<ArrayD<f64>>> {
        let solver = self
            .solver
            .get_or_try_init(|| BlockMatrixSolver::new(self).map(Arc::new))?;
        solver.solve(self, b, constraints)
    }

    /// Split into (regular, boundary) block matrices; scalar blocks stay
    /// with the regular part.
    pub fn separate(&self) -> Result<(BlockMatrix, BlockMatrix)> {
        let terms: Vec<TPMatrix> = self.get_mats().into_iter().cloned().collect();
        let (mut regular, bc) = block_matrices(&terms)?;
        for (i, row) in self.grid.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                if let BlockEntry::Scalar(s) = entry {
                    regular.set_scalar(i, j, *s)?;
                }
            }
        }
        Ok((regular, bc))
    }
}

impl Index<(usize, usize)> for BlockMatrix {
    type Output = BlockEntry;

    fn index(&self, (i, j): (usize, usize)) -> &BlockEntry {
        &self.grid[i][j]
    }
}

/// Number of active coefficients over the non-diagonal axes of `space`.
fn nondiagonal_size(space: &dyn TensorSpace) -> usize {
    let active = space.active_slices();
    space.nondiagonal_axes().iter().map(|&a| active[a].len()).product()
}

fn check_size(slot: &mut Option<usize>, size: usize, what: &str, k: usize) -> Result<()> {
    match *slot {
        Some(existing) if existing != size => Err(ValidationError::DimensionMismatch(format!(
            "block {what} {k} has blocks of size {existing} and {size}"
        ))
        .into()),
        _ => {
            *slot = Some(size);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Separation
// ---------------------------------------------------------------------------

/// Remove the boundary-lifting terms from `terms` and return them.
pub fn extract_bc_matrices(terms: &mut Vec<TPMatrix>) -> Vec<TPMatrix> {
    let (bc, regular): (Vec<_>, Vec<_>) = terms.drain(..).partition(TPMatrix::is_bc_matrix);
    *terms = regular;
    bc
}

/// Build (regular, boundary) block matrices from a flat list of terms.
///
/// # Errors
///
/// [`SpectralError::Precondition`] when either part would be empty.
pub fn block_matrices(terms: &[TPMatrix]) -> Result<(BlockMatrix, BlockMatrix)> {
    let mut regular = terms.to_vec();
    let bc = extract_bc_matrices(&mut regular);
    if bc.is_empty() {
        return Err(SpectralError::Precondition(
            "no boundary-lifting terms to separate".into(),
        ));
    }
    Ok((BlockMatrix::new(&regular)?, BlockMatrix::new(&bc)?))
}

// ---------------------------------------------------------------------------
// BlockMatrixSolver
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Factored {
    lu: SparseLu,
    moved: MovedEntries,
}

/// Direct solver bound to one block structure.
///
/// For every index of the diagonal axes the global sparse matrix is
/// assembled and factored on first use; factorisations are cached per
/// (index, constrained rows).
#[derive(Debug)]
pub struct BlockMatrixSolver {
    naxes: Vec<usize>,
    dims: usize,
    row_offsets: Vec<usize>,
    col_offsets: Vec<usize>,
    test_active: Vec<Vec<Range<usize>>>,
    trial_active: Vec<Vec<Range<usize>>>,
    trial_shapes: Vec<Vec<usize>>,
    factors: Mutex<HashMap<(Vec<usize>, Vec<usize>), Arc<Factored>>>,
}

impl BlockMatrixSolver {
    /// Inspect the structure of `matrix`.
    pub fn new(matrix: &BlockMatrix) -> Result<Self> {
        if matrix.contains_bc_matrix() {
            return Err(SpectralError::StructuralMismatch(
                "boundary terms belong on the right-hand side; separate them before solving".into(),
            ));
        }
        let terms = matrix.get_mats();
        let Some(first) = terms.first() else {
            return Err(SpectralError::Precondition("no terms to solve".into()));
        };
        let naxes = first.naxes().to_vec();
        let dims = first.dimensions();
        if let Some(other) = terms.iter().find(|t| t.naxes() != naxes.as_slice()) {
            return Err(SpectralError::StructuralMismatch(format!(
                "terms act on non-diagonal axes {naxes:?} and {:?}",
                other.naxes()
            )));
        }

        let (rows, cols) = matrix.shape();
        let mut test_active = Vec::with_capacity(rows);
        let mut row_sizes = Vec::with_capacity(rows);
        for i in 0..rows {
            let slices = BlockMatrix::require_space(&matrix.row_spaces, i, "row")?.active_slices();
            row_sizes.push(naxes.iter().map(|&a| slices[a].len()).product());
            test_active.push(slices);
        }
        let mut trial_active = Vec::with_capacity(cols);
        let mut trial_shapes = Vec::with_capacity(cols);
        let mut col_sizes = Vec::with_capacity(cols);
        for j in 0..cols {
            let space = BlockMatrix::require_space(&matrix.col_spaces, j, "column")?;
            let slices = space.active_slices();
            col_sizes.push(naxes.iter().map(|&a| slices[a].len()).product());
            trial_active.push(slices);
            trial_shapes.push(space.shape());
        }
        info!(rows, cols, ?naxes, "block solver constructed");
        Ok(Self {
            naxes,
            dims,
            row_offsets: prefix_sums(&row_sizes),
            col_offsets: prefix_sums(&col_sizes),
            test_active,
            trial_active,
            trial_shapes,
            factors: Mutex::new(HashMap::new()),
        })
    }

    fn factored(&self, matrix: &BlockMatrix, it: &[usize], rows: &[usize]) -> Result<Arc<Factored>> {
        let key = (it.to_vec(), rows.to_vec());
        if let Some(found) = self.factors.lock().get(&key) {
            return Ok(Arc::clone(found));
        }
        let csr = matrix.assemble(it)?;
        let n = csr.rows;
        if csr.cols != n || n != self.row_offsets[self.row_offsets.len() - 1] {
            return Err(ValidationError::DimensionMismatch(format!(
                "assembled block system is {}x{}, expected {} unknowns",
                csr.rows,
                csr.cols,
                self.row_offsets[self.row_offsets.len() - 1]
            ))
            .into());
        }
        let (kept, moved) = constrain_triplets(csr.triplets(), rows);
        let factored = Arc::new(Factored {
            lu: SparseLu::factor(n, kept)?,
            moved,
        });
        debug!(?it, ?rows, n, "block system factorised");
        self.factors.lock().insert(key, Arc::clone(&factored));
        Ok(factored)
    }

    /// Solve for every index of the diagonal axes.
    pub fn solve(
        &self,
        matrix: &BlockMatrix,
        b: &[ArrayD<f64>],
        constraints: &[BlockConstraint],
    ) -> Result<Vec<ArrayD<f64>>> {
        let rows = self.test_active.len();
        if b.len() != rows {
            return Err(ValidationError::DimensionMismatch(format!(
                "{} right-hand sides for {rows} block rows",
                b.len()
            ))
            .into());
        }
        if let Some(bad) = b.iter().find(|bi| bi.ndim() != self.dims) {
            return Err(ValidationError::DimensionMismatch(format!(
                "rhs has {} axes, expected {}",
                bad.ndim(),
                self.dims
            ))
            .into());
        }
        let mut global: Vec<Constraint> = Vec::with_capacity(constraints.len());
        for &(block, row, value) in constraints {
            if block + 1 >= self.col_offsets.len() {
                return Err(SpectralError::Precondition(format!(
                    "constraint names block {block} of {}",
                    self.col_offsets.len() - 1
                )));
            }
            let offset = self.col_offsets[block];
            if row >= self.col_offsets[block + 1] - offset {
                return Err(ValidationError::ConstraintOutOfBounds {
                    row,
                    size: self.col_offsets[block + 1] - offset,
                }
                .into());
            }
            global.push((offset + row, value));
        }

        let mut u: Vec<ArrayD<f64>> = self
            .trial_shapes
            .iter()
            .map(|shape| ArrayD::zeros(IxDyn(shape)))
            .collect();
        let mut planes = b[0].shape().to_vec();
        for &axis in &self.naxes {
            planes[axis] = 1;
        }
        let n = self.row_offsets[rows];
        for idx in multi_indices(&planes) {
            let zero_mode = idx
                .iter()
                .enumerate()
                .all(|(ax, &i)| self.naxes.contains(&ax) || i == 0);
            let cons: &[Constraint] = if zero_mode { &global } else { &[] };
            let it: Vec<usize> = idx
                .iter()
                .enumerate()
                .filter(|(ax, _)| !self.naxes.contains(ax))
                .map(|(_, &i)| i)
                .collect();

            let mut x = Vec::with_capacity(n);
            for (bi, active) in b.iter().zip(&self.test_active) {
                let plane = subview(bi.view(), &idx, &self.naxes);
                x.extend(
                    plane
                        .slice_each_axis(|ax| Slice::from(active[self.naxes[ax.axis.index()]].clone()))
                        .iter()
                        .copied(),
                );
            }
            if x.len() != n {
                return Err(ValidationError::DimensionMismatch(format!(
                    "gathered {} rhs entries for {n} unknowns",
                    x.len()
                ))
                .into());
            }
            if cons.is_empty() && x.iter().all(|&v| v == 0.0) {
                continue;
            }

            let factored = self.factored(matrix, &it, &constraint_rows(cons))?;
            apply_constraints(&mut x, &factored.moved, cons);
            factored.lu.solve_in_place(&mut x);

            for (j, (uj, active)) in u.iter_mut().zip(&self.trial_active).enumerate() {
                let segment = &x[self.col_offsets[j]..self.col_offsets[j + 1]];
                let mut plane = subview_mut(uj.view_mut(), &idx, &self.naxes);
                let mut window = plane
                    .slice_each_axis_mut(|ax| Slice::from(active[self.naxes[ax.axis.index()]].clone()));
                for (dst, src) in window.iter_mut().zip(segment) {
                    *dst = *src;
                }
            }
        }
        Ok(u)
    }
}
