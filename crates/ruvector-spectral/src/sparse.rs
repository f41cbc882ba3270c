//! Standard compressed sparse formats.
//!
//! Provides [`CsrMatrix`] (the workhorse for products, Kronecker assembly and
//! the generic fallback solver) together with the [`DiaMatrix`] and
//! [`CscMatrix`] views returned by `diags`. Only what interoperation with
//! banded operators needs is implemented here.

use ndarray::Array2;

use crate::config::SparseFormat;
use crate::error::{Result, SpectralError, ValidationError};
use crate::types::{diagonal_length, diagonal_position};

// ---------------------------------------------------------------------------
// CsrMatrix
// ---------------------------------------------------------------------------

/// Compressed Sparse Row (CSR) matrix of `f64`.
///
/// # Layout
///
/// For a matrix with `m` rows and `nnz` non-zeros:
/// - `row_ptr` has length `m + 1`
/// - `col_indices` and `values` each have length `nnz`
/// - Row `i` spans indices `row_ptr[i]..row_ptr[i+1]`, sorted by column
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    /// Row pointers: `row_ptr[i]` is the start index in `col_indices`/`values`
    /// for row `i`.
    pub row_ptr: Vec<usize>,
    /// Column indices for each non-zero entry.
    pub col_indices: Vec<usize>,
    /// Values for each non-zero entry.
    pub values: Vec<f64>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl CsrMatrix {
    /// Build a CSR matrix from COO (coordinate) triplets.
    ///
    /// Entries are sorted by (row, col) internally and duplicate positions
    /// are summed.
    ///
    /// # Errors
    ///
    /// [`ValidationError::DimensionMismatch`] if an index lies outside
    /// `rows x cols`.
    pub fn from_coo(
        rows: usize,
        cols: usize,
        entries: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Result<Self> {
        let entries: Vec<_> = entries.into_iter().collect();
        if let Some(&(r, c, _)) = entries.iter().find(|&&(r, c, _)| r >= rows || c >= cols) {
            return Err(ValidationError::DimensionMismatch(format!(
                "entry ({r}, {c}) outside {rows}x{cols} matrix"
            ))
            .into());
        }
        Ok(Self::assemble(rows, cols, entries))
    }

    // Callers guarantee every index is in bounds.
    pub(crate) fn assemble(
        rows: usize,
        cols: usize,
        entries: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Self {
        let mut sorted: Vec<_> = entries.into_iter().collect();
        sorted.sort_unstable_by_key(|(r, c, _)| (*r, *c));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_indices: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut values: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for (r, c, v) in sorted {
            debug_assert!(r < rows && c < cols, "({r}, {c}) outside {rows}x{cols}");
            if last == Some((r, c)) {
                if let Some(tail) = values.last_mut() {
                    *tail += v;
                }
                continue;
            }
            row_ptr[r + 1] += 1;
            col_indices.push(c);
            values.push(v);
            last = Some((r, c));
        }
        for i in 1..=rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        Self {
            row_ptr,
            col_indices,
            values,
            rows,
            cols,
        }
    }

    /// Empty `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            row_ptr: vec![0; rows + 1],
            col_indices: Vec::new(),
            values: Vec::new(),
            rows,
            cols,
        }
    }

    /// Square identity matrix of dimension `n`.
    pub fn identity(n: usize) -> Self {
        Self {
            row_ptr: (0..=n).collect(),
            col_indices: (0..n).collect(),
            values: vec![1.0; n],
            rows: n,
            cols: n,
        }
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Iterate over `(col_index, value)` pairs for the given row.
    #[inline]
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_indices[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Iterate over all `(row, col, value)` triplets in row-major order.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.rows).flat_map(move |r| self.row_entries(r).map(move |(c, v)| (r, c, v)))
    }

    /// Entry at `(row, col)`, zero if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.row_entries(row)
            .find(|&(c, _)| c == col)
            .map_or(0.0, |(_, v)| v)
    }

    /// Sparse matrix-vector multiply: `y = A * x`.
    ///
    /// # Panics
    ///
    /// Debug-asserts that `x.len() >= self.cols` and `y.len() >= self.rows`.
    #[inline]
    pub fn spmv(&self, x: &[f64], y: &mut [f64]) {
        debug_assert!(x.len() >= self.cols, "spmv: x.len()={} < cols={}", x.len(), self.cols);
        debug_assert!(y.len() >= self.rows, "spmv: y.len()={} < rows={}", y.len(), self.rows);

        for (i, yi) in y.iter_mut().enumerate().take(self.rows) {
            let mut sum = 0.0;
            for idx in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[idx] * x[self.col_indices[idx]];
            }
            *yi = sum;
        }
    }

    /// Copy with every value multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut out = self.clone();
        out.values.iter_mut().for_each(|v| *v *= factor);
        out
    }

    /// Copy with exactly-zero entries removed.
    pub fn pruned(&self) -> Self {
        Self::assemble(
            self.rows,
            self.cols,
            self.triplets().filter(|&(_, _, v)| v != 0.0),
        )
    }

    /// Transpose: produces `A^T` in CSR form.
    ///
    /// Two-pass counting sort in O(nnz + rows + cols).
    pub fn transpose(&self) -> Self {
        let nnz = self.nnz();
        let mut row_ptr = vec![0usize; self.cols + 1];
        for &c in &self.col_indices {
            row_ptr[c + 1] += 1;
        }
        for i in 1..=self.cols {
            row_ptr[i] += row_ptr[i - 1];
        }

        let mut col_indices = vec![0usize; nnz];
        let mut values = vec![0.0; nnz];
        let mut cursor = row_ptr.clone();
        for row in 0..self.rows {
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                let c = self.col_indices[idx];
                let dest = cursor[c];
                col_indices[dest] = row;
                values[dest] = self.values[idx];
                cursor[c] += 1;
            }
        }

        Self {
            row_ptr,
            col_indices,
            values,
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Sum of two matrices of equal shape.
    pub fn add(&self, other: &CsrMatrix) -> Result<Self> {
        if self.shape() != other.shape() {
            return Err(SpectralError::Precondition(format!(
                "cannot add {}x{} and {}x{} sparse matrices",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        Ok(Self::assemble(
            self.rows,
            self.cols,
            self.triplets().chain(other.triplets()),
        ))
    }

    /// Sparse product `self * other`.
    pub fn matmul(&self, other: &CsrMatrix) -> Result<Self> {
        if self.cols != other.rows {
            return Err(SpectralError::Precondition(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut entries = Vec::new();
        let mut accumulator = vec![0.0; other.cols];
        let mut seen = vec![false; other.cols];
        let mut touched: Vec<usize> = Vec::new();
        for i in 0..self.rows {
            for (k, a) in self.row_entries(i) {
                for (j, b) in other.row_entries(k) {
                    if !seen[j] {
                        seen[j] = true;
                        touched.push(j);
                    }
                    accumulator[j] += a * b;
                }
            }
            for &j in &touched {
                entries.push((i, j, accumulator[j]));
                accumulator[j] = 0.0;
                seen[j] = false;
            }
            touched.clear();
        }
        Ok(Self::assemble(self.rows, other.cols, entries))
    }

    /// Kronecker product `self ⊗ other`.
    ///
    /// Row `i * other.rows + k`, column `j * other.cols + l` holds
    /// `self[i, j] * other[k, l]`.
    pub fn kron(&self, other: &CsrMatrix) -> Self {
        let (p, q) = other.shape();
        let mut entries = Vec::with_capacity(self.nnz() * other.nnz());
        for (i, j, a) in self.triplets() {
            for (k, l, b) in other.triplets() {
                entries.push((i * p + k, j * q + l, a * b));
            }
        }
        Self::assemble(self.rows * p, self.cols * q, entries)
    }

    /// Dense copy.
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for (r, c, v) in self.triplets() {
            dense[[r, c]] += v;
        }
        dense
    }

    /// 2-norm of the difference of the stored data arrays, or `None` when the
    /// two matrices do not store the same number of entries.
    pub fn data_distance(&self, other: &CsrMatrix) -> Option<f64> {
        if self.nnz() != other.nnz() {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt(),
        )
    }
}

/// Assemble a block matrix from a grid of optional sub-matrices.
///
/// `row_sizes[i]` and `col_sizes[j]` give the extent of block row `i` and
/// block column `j`; every present block must match them.
pub fn block_assemble(
    blocks: &[Vec<Option<CsrMatrix>>],
    row_sizes: &[usize],
    col_sizes: &[usize],
) -> Result<CsrMatrix> {
    let row_offsets = prefix_sums(row_sizes);
    let col_offsets = prefix_sums(col_sizes);
    let mut entries = Vec::new();
    for (i, block_row) in blocks.iter().enumerate() {
        for (j, block) in block_row.iter().enumerate() {
            let Some(block) = block else { continue };
            if block.shape() != (row_sizes[i], col_sizes[j]) {
                return Err(SpectralError::Precondition(format!(
                    "block ({i}, {j}) has shape {:?}, expected ({}, {})",
                    block.shape(),
                    row_sizes[i],
                    col_sizes[j]
                )));
            }
            entries.extend(
                block
                    .triplets()
                    .map(|(r, c, v)| (row_offsets[i] + r, col_offsets[j] + c, v)),
            );
        }
    }
    Ok(CsrMatrix::assemble(
        row_offsets[row_sizes.len()],
        col_offsets[col_sizes.len()],
        entries,
    ))
}

/// `[0, s0, s0 + s1, ...]`.
pub fn prefix_sums(sizes: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(sizes.len() + 1);
    offsets.push(0);
    for s in sizes {
        offsets.push(offsets[offsets.len() - 1] + s);
    }
    offsets
}

// ---------------------------------------------------------------------------
// DiaMatrix / CscMatrix
// ---------------------------------------------------------------------------

/// Diagonal storage: one dense vector per stored offset.
#[derive(Debug, Clone, PartialEq)]
pub struct DiaMatrix {
    /// Stored offsets in ascending order.
    pub offsets: Vec<isize>,
    /// `data[d]` holds the entries of diagonal `offsets[d]`, from the top-left.
    pub data: Vec<Vec<f64>>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl DiaMatrix {
    /// Collect the stored entries of `csr` by diagonal.
    pub fn from_csr(csr: &CsrMatrix) -> Self {
        let mut diagonals: std::collections::BTreeMap<isize, Vec<f64>> = Default::default();
        for (r, c, v) in csr.triplets() {
            let k = c as isize - r as isize;
            let len = diagonal_length(k, csr.rows, csr.cols);
            diagonals.entry(k).or_insert_with(|| vec![0.0; len])[r.min(c)] = v;
        }
        let (offsets, data) = diagonals.into_iter().unzip();
        Self {
            offsets,
            data,
            rows: csr.rows,
            cols: csr.cols,
        }
    }

    /// Convert to CSR, dropping explicit zeros.
    pub fn to_csr(&self) -> CsrMatrix {
        let entries = self.offsets.iter().zip(&self.data).flat_map(|(&k, values)| {
            let len = diagonal_length(k, self.rows, self.cols);
            values[..len].iter().enumerate().filter_map(move |(t, &v)| {
                (v != 0.0).then(|| {
                    let (r, c) = diagonal_position(k, t);
                    (r, c, v)
                })
            })
        });
        CsrMatrix::assemble(self.rows, self.cols, entries)
    }
}

/// Compressed Sparse Column matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CscMatrix {
    /// Column pointers.
    pub col_ptr: Vec<usize>,
    /// Row indices for each stored entry.
    pub row_indices: Vec<usize>,
    /// Values for each stored entry.
    pub values: Vec<f64>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl CscMatrix {
    /// Convert from CSR.
    pub fn from_csr(csr: &CsrMatrix) -> Self {
        let t = csr.transpose();
        Self {
            col_ptr: t.row_ptr,
            row_indices: t.col_indices,
            values: t.values,
            rows: csr.rows,
            cols: csr.cols,
        }
    }

    /// Convert back to CSR.
    pub fn to_csr(&self) -> CsrMatrix {
        CsrMatrix {
            row_ptr: self.col_ptr.clone(),
            col_indices: self.row_indices.clone(),
            values: self.values.clone(),
            rows: self.cols,
            cols: self.rows,
        }
        .transpose()
    }
}

/// A matrix in one of the standard sparse formats.
#[derive(Debug, Clone, PartialEq)]
pub enum AssembledMatrix {
    /// Diagonal storage.
    Dia(DiaMatrix),
    /// Compressed sparse rows.
    Csr(CsrMatrix),
    /// Compressed sparse columns.
    Csc(CscMatrix),
}

impl AssembledMatrix {
    /// Store `csr` in `format`.
    pub fn from_csr(csr: CsrMatrix, format: SparseFormat) -> Self {
        match format {
            SparseFormat::Dia => AssembledMatrix::Dia(DiaMatrix::from_csr(&csr)),
            SparseFormat::Csr => AssembledMatrix::Csr(csr),
            SparseFormat::Csc => AssembledMatrix::Csc(CscMatrix::from_csr(&csr)),
        }
    }

    /// Which format this value is stored in.
    pub fn format(&self) -> SparseFormat {
        match self {
            AssembledMatrix::Dia(_) => SparseFormat::Dia,
            AssembledMatrix::Csr(_) => SparseFormat::Csr,
            AssembledMatrix::Csc(_) => SparseFormat::Csc,
        }
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            AssembledMatrix::Dia(m) => (m.rows, m.cols),
            AssembledMatrix::Csr(m) => (m.rows, m.cols),
            AssembledMatrix::Csc(m) => (m.rows, m.cols),
        }
    }

    /// Convert to CSR.
    pub fn to_csr(&self) -> CsrMatrix {
        match self {
            AssembledMatrix::Dia(m) => m.to_csr(),
            AssembledMatrix::Csr(m) => m.clone(),
            AssembledMatrix::Csc(m) => m.to_csr(),
        }
    }

    /// Dense copy.
    pub fn to_dense(&self) -> Array2<f64> {
        self.to_csr().to_dense()
    }
}
