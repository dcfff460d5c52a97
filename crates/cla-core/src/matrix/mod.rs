//! Baseline dense/sparse numeric matrix.
//!
//! `MatrixBlock` is the uncompressed container the engine consumes during
//! planning, produces on decompression, and falls back to for operators the
//! compressed representation does not handle natively.

mod io;
mod ops;


pub(crate) use ops::check_chain_operands;

/// Sparsity below which `examine_sparsity` switches to sparse rows.
pub const SPARSITY_TURN_POINT: f64 = 0.4;

/// One row of a sparse matrix: column indices sorted ascending, non-zero values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseRow {
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseRow {
    /// Creates an empty row with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Column indices of the stored values.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Stored values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True if the row stores nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Appends an entry without keeping the order; call [`Self::sort`] afterwards.
    #[inline]
    pub fn append(&mut self, col: usize, value: f64) {
        self.indices.push(col);
        self.values.push(value);
    }

    /// Sorts entries by column index.
    pub fn sort(&mut self) {
        if self.indices.windows(2).all(|w| w[0] < w[1]) {
            return;
        }
        let mut pairs: Vec<(usize, f64)> = self
            .indices
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect();
        pairs.sort_unstable_by_key(|&(c, _)| c);
        self.indices = pairs.iter().map(|&(c, _)| c).collect();
        self.values = pairs.iter().map(|&(_, v)| v).collect();
    }

    /// Value at `col`, zero if absent.
    #[must_use]
    pub fn get(&self, col: usize) -> f64 {
        self.indices
            .binary_search(&col)
            .map_or(0.0, |pos| self.values[pos])
    }

    /// Sets `col` to `value`, keeping order. Returns the change in nnz.
    fn set(&mut self, col: usize, value: f64) -> isize {
        match self.indices.binary_search(&col) {
            Ok(pos) if value == 0.0 => {
                self.indices.remove(pos);
                self.values.remove(pos);
                -1
            }
            Ok(pos) => {
                self.values[pos] = value;
                0
            }
            Err(_) if value == 0.0 => 0,
            Err(pos) => {
                self.indices.insert(pos, col);
                self.values.insert(pos, value);
                1
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

/// Physical layout of a [`MatrixBlock`].
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    /// Row-major values, `rows * cols` entries.
    Dense(Vec<f64>),
    /// One sorted sparse row per matrix row.
    Sparse(Vec<SparseRow>),
}

/// Dense or sparse row-major matrix of doubles with nnz bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixBlock {
    rows: usize,
    cols: usize,
    nnz: usize,
    storage: Storage,
}

impl MatrixBlock {
    /// Creates an all-zero dense matrix.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            nnz: 0,
            storage: Storage::Dense(vec![0.0; rows * cols]),
        }
    }

    /// Creates an all-zero sparse matrix.
    #[must_use]
    pub fn sparse(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            nnz: 0,
            storage: Storage::Sparse(vec![SparseRow::default(); rows]),
        }
    }

    /// Creates an empty matrix in the requested layout.
    #[must_use]
    pub fn with_layout(rows: usize, cols: usize, sparse: bool) -> Self {
        if sparse {
            Self::sparse(rows, cols)
        } else {
            Self::zeros(rows, cols)
        }
    }

    /// Wraps row-major values.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `values.len() != rows * cols`.
    pub fn from_dense(rows: usize, cols: usize, values: Vec<f64>) -> crate::Result<Self> {
        if values.len() != rows * cols {
            return Err(crate::Error::DimensionMismatch {
                operation: "from_dense",
                expected: (rows, cols),
                actual: (values.len(), 1),
            });
        }
        let nnz = values.iter().filter(|v| **v != 0.0).count();
        Ok(Self {
            rows,
            cols,
            nnz,
            storage: Storage::Dense(values),
        })
    }

    /// Builds a dense matrix from row vectors.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the rows have different lengths.
    pub fn from_rows(rows: &[Vec<f64>]) -> crate::Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut values = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(crate::Error::DimensionMismatch {
                    operation: "from_rows",
                    expected: (1, cols),
                    actual: (1, row.len()),
                });
            }
            values.extend_from_slice(row);
        }
        Self::from_dense(rows.len(), cols, values)
    }

    /// Builds a `len x 1` column vector.
    #[must_use]
    pub fn column_vector(values: &[f64]) -> Self {
        let nnz = values.iter().filter(|v| **v != 0.0).count();
        Self {
            rows: values.len(),
            cols: 1,
            nnz,
            storage: Storage::Dense(values.to_vec()),
        }
    }

    /// Builds a `1 x len` row vector.
    #[must_use]
    pub fn row_vector(values: &[f64]) -> Self {
        let nnz = values.iter().filter(|v| **v != 0.0).count();
        Self {
            rows: 1,
            cols: values.len(),
            nnz,
            storage: Storage::Dense(values.to_vec()),
        }
    }

    /// Wraps pre-built sparse rows. `nnz` is recomputed.
    pub(crate) fn from_sparse_rows(rows: usize, cols: usize, data: Vec<SparseRow>) -> Self {
        let mut block = Self {
            rows,
            cols,
            nnz: 0,
            storage: Storage::Sparse(data),
        };
        block.recompute_nnz();
        block
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of non-zero cells.
    #[must_use]
    pub const fn nnz(&self) -> usize {
        self.nnz
    }

    /// True if stored as sparse rows.
    #[must_use]
    pub const fn is_sparse(&self) -> bool {
        matches!(self.storage, Storage::Sparse(_))
    }

    /// True if no cell is non-zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nnz == 0
    }

    /// Underlying storage.
    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Dense row-major values, if dense.
    #[must_use]
    pub fn dense_values(&self) -> Option<&[f64]> {
        match &self.storage {
            Storage::Dense(v) => Some(v),
            Storage::Sparse(_) => None,
        }
    }

    /// Sparse rows, if sparse.
    #[must_use]
    pub fn sparse_rows(&self) -> Option<&[SparseRow]> {
        match &self.storage {
            Storage::Sparse(r) => Some(r),
            Storage::Dense(_) => None,
        }
    }

    /// Reads one cell. Panics if out of bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match &self.storage {
            Storage::Dense(v) => v[row * self.cols + col],
            Storage::Sparse(r) => r[row].get(col),
        }
    }

    /// Writes one cell, maintaining nnz. Panics if out of bounds.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        match &mut self.storage {
            Storage::Dense(v) => {
                let cell = &mut v[row * self.cols + col];
                match (*cell != 0.0, value != 0.0) {
                    (false, true) => self.nnz += 1,
                    (true, false) => self.nnz -= 1,
                    _ => {}
                }
                *cell = value;
            }
            Storage::Sparse(r) => {
                let delta = r[row].set(col, value);
                self.nnz = self.nnz.saturating_add_signed(delta);
            }
        }
    }

    /// Recounts non-zeros from storage and returns the count.
    pub fn recompute_nnz(&mut self) -> usize {
        self.nnz = match &self.storage {
            Storage::Dense(v) => v.iter().filter(|x| **x != 0.0).count(),
            Storage::Sparse(r) => r
                .iter()
                .map(|row| row.values.iter().filter(|x| **x != 0.0).count())
                .sum(),
        };
        self.nnz
    }

    /// Non-zero count of one row.
    #[must_use]
    pub fn row_nnz(&self, row: usize) -> usize {
        match &self.storage {
            Storage::Dense(v) => v[row * self.cols..(row + 1) * self.cols]
                .iter()
                .filter(|x| **x != 0.0)
                .count(),
            Storage::Sparse(r) => r[row].values.iter().filter(|x| **x != 0.0).count(),
        }
    }

    /// Calls `f(row, col, value)` for every non-zero cell in rows `rl..ru`, row-major.
    pub fn for_each_nonzero(&self, rl: usize, ru: usize, mut f: impl FnMut(usize, usize, f64)) {
        match &self.storage {
            Storage::Dense(v) => {
                for r in rl..ru {
                    let row = &v[r * self.cols..(r + 1) * self.cols];
                    for (c, &x) in row.iter().enumerate() {
                        if x != 0.0 {
                            f(r, c, x);
                        }
                    }
                }
            }
            Storage::Sparse(rows) => {
                for (r, row) in rows.iter().enumerate().take(ru).skip(rl) {
                    for (c, x) in row.iter() {
                        if x != 0.0 {
                            f(r, c, x);
                        }
                    }
                }
            }
        }
    }

    /// Copies row `row` into a dense buffer of length `cols`.
    pub fn row_into(&self, row: usize, out: &mut [f64]) {
        match &self.storage {
            Storage::Dense(v) => out.copy_from_slice(&v[row * self.cols..(row + 1) * self.cols]),
            Storage::Sparse(r) => {
                out.fill(0.0);
                for (c, x) in r[row].iter() {
                    out[c] = x;
                }
            }
        }
    }

    /// Row-major dense copy of all values.
    #[must_use]
    pub fn to_row_major(&self) -> Vec<f64> {
        match &self.storage {
            Storage::Dense(v) => v.clone(),
            Storage::Sparse(_) => {
                let mut out = vec![0.0; self.rows * self.cols];
                self.for_each_nonzero(0, self.rows, |r, c, x| out[r * self.cols + c] = x);
                out
            }
        }
    }

    /// Converts to dense storage in place.
    pub fn to_dense(&mut self) {
        if self.is_sparse() {
            self.storage = Storage::Dense(self.to_row_major());
        }
    }

    /// Converts to sparse storage in place.
    pub fn to_sparse(&mut self) {
        if let Storage::Dense(v) = &self.storage {
            let mut rows = Vec::with_capacity(self.rows);
            for r in 0..self.rows {
                let src = &v[r * self.cols..(r + 1) * self.cols];
                let mut row = SparseRow::with_capacity(src.iter().filter(|x| **x != 0.0).count());
                for (c, &x) in src.iter().enumerate() {
                    if x != 0.0 {
                        row.append(c, x);
                    }
                }
                rows.push(row);
            }
            self.storage = Storage::Sparse(rows);
        }
    }

    /// Picks the layout matching the current sparsity.
    pub fn examine_sparsity(&mut self) {
        let cells = self.rows * self.cols;
        #[allow(clippy::cast_precision_loss)]
        let sparse = cells > 0 && (self.nnz as f64) / (cells as f64) < SPARSITY_TURN_POINT;
        if sparse {
            self.to_sparse();
        } else {
            self.to_dense();
        }
    }

    /// True if a matrix of this shape and nnz is stored sparse after `examine_sparsity`.
    #[must_use]
    pub fn evaluate_sparse(rows: usize, cols: usize, nnz: usize) -> bool {
        let cells = rows * cols;
        #[allow(clippy::cast_precision_loss)]
        let sparse = cells > 0 && (nnz as f64) / (cells as f64) < SPARSITY_TURN_POINT;
        sparse
    }

    /// Transposed copy in the same layout family.
    #[must_use]
    pub fn transpose(&self) -> Self {
        match &self.storage {
            Storage::Dense(v) => {
                let mut out = vec![0.0; v.len()];
                for r in 0..self.rows {
                    for c in 0..self.cols {
                        out[c * self.rows + r] = v[r * self.cols + c];
                    }
                }
                Self {
                    rows: self.cols,
                    cols: self.rows,
                    nnz: self.nnz,
                    storage: Storage::Dense(out),
                }
            }
            Storage::Sparse(rows) => {
                let mut out = vec![SparseRow::default(); self.cols];
                for (r, row) in rows.iter().enumerate() {
                    for (c, x) in row.iter() {
                        out[c].append(r, x);
                    }
                }
                Self {
                    rows: self.cols,
                    cols: self.rows,
                    nnz: self.nnz,
                    storage: Storage::Sparse(out),
                }
            }
        }
    }

    /// Copy of the listed columns, in the given order.
    #[must_use]
    pub fn slice_columns(&self, columns: &[usize]) -> Self {
        let k = columns.len();
        match &self.storage {
            Storage::Dense(v) => {
                let mut out = Vec::with_capacity(self.rows * k);
                for r in 0..self.rows {
                    let row = &v[r * self.cols..(r + 1) * self.cols];
                    out.extend(columns.iter().map(|&c| row[c]));
                }
                let mut block = Self {
                    rows: self.rows,
                    cols: k,
                    nnz: 0,
                    storage: Storage::Dense(out),
                };
                block.recompute_nnz();
                block
            }
            Storage::Sparse(rows) => {
                let data = rows
                    .iter()
                    .map(|row| {
                        let mut out = SparseRow::default();
                        for (j, &c) in columns.iter().enumerate() {
                            let x = row.get(c);
                            if x != 0.0 {
                                out.append(j, x);
                            }
                        }
                        out
                    })
                    .collect();
                Self::from_sparse_rows(self.rows, k, data)
            }
        }
    }

    /// Copy of rows `rl..ru`.
    #[must_use]
    pub fn slice_rows(&self, rl: usize, ru: usize) -> Self {
        match &self.storage {
            Storage::Dense(v) => {
                let mut block = Self {
                    rows: ru - rl,
                    cols: self.cols,
                    nnz: 0,
                    storage: Storage::Dense(v[rl * self.cols..ru * self.cols].to_vec()),
                };
                block.recompute_nnz();
                block
            }
            Storage::Sparse(rows) => Self::from_sparse_rows(ru - rl, self.cols, rows[rl..ru].to_vec()),
        }
    }

    /// Estimated in-memory size in bytes: `min(8·r·c, 4·r + 12·nnz)`.
    #[must_use]
    pub fn estimate_size_in_memory(rows: usize, cols: usize, nnz: usize) -> usize {
        let dense = 8 * rows * cols;
        let sparse = 4 * rows + 12 * nnz;
        dense.min(sparse)
    }

    /// Estimated in-memory size of this matrix.
    #[must_use]
    pub fn size_in_memory(&self) -> usize {
        Self::estimate_size_in_memory(self.rows, self.cols, self.nnz)
    }

    /// Element-wise comparison within `tolerance`, independent of layout.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        self.to_row_major()
            .iter()
            .zip(other.to_row_major().iter())
            .all(|(a, b)| a == b || (a - b).abs() <= tolerance)
    }
}
