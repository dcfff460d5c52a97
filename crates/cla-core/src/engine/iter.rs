//! Streaming row and cell access.
//!
//! Rows are decoded from the column groups one block at a time, so walking a
//! large matrix only ever holds one block of rows in memory.

use std::sync::Arc;

use super::{CompressedMatrix, State};
use crate::colgroup::ColumnGroup;
use crate::error::{Error, Result};
use crate::matrix::{MatrixBlock, SparseRow};

/// Cells decoded per block refill.
const BLOCK_CELLS: usize = 1 << 16;

/// Layout of the rows produced by [`RowIter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// One value per column, zeros included.
    Dense,
    /// Non-zeros only, sorted by column.
    Sparse,
}

/// One row yielded by [`RowIter`].
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixRow {
    /// One value per column.
    Dense(Vec<f64>),
    /// Non-zeros sorted by column.
    Sparse(SparseRow),
}

impl MatrixRow {
    /// Value at `col`, zero if absent.
    #[must_use]
    pub fn get(&self, col: usize) -> f64 {
        match self {
            Self::Dense(values) => values.get(col).copied().unwrap_or(0.0),
            Self::Sparse(row) => row.get(col),
        }
    }

    /// Writes every column of the row into `out`, zeros included.
    ///
    /// # Panics
    ///
    /// Panics if `out` is not one slot per column.
    pub fn fill_dense(&self, out: &mut [f64]) {
        match self {
            Self::Dense(values) => out.copy_from_slice(values),
            Self::Sparse(row) => {
                out.fill(0.0);
                for (&c, &x) in row.indices().iter().zip(row.values()) {
                    out[c] = x;
                }
            }
        }
    }
}

/// Where rows are decoded from.
#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Block(&'a MatrixBlock),
    Groups(&'a [Arc<ColumnGroup>]),
}

impl Source<'_> {
    /// Writes rows `rl..ru` into `out` (row-major, `cols` wide).
    fn decode_dense(self, out: &mut [f64], cols: usize, rl: usize, ru: usize) {
        out.fill(0.0);
        match self {
            Self::Block(block) => {
                for r in rl..ru {
                    let start = (r - rl) * cols;
                    block.row_into(r, &mut out[start..start + cols]);
                }
            }
            Self::Groups(groups) => {
                for g in groups {
                    g.decompress_to_dense(out, cols, rl, ru);
                }
            }
        }
    }

    fn decode_sparse(self, rl: usize, ru: usize) -> Vec<SparseRow> {
        match self {
            Self::Block(block) => {
                let mut rows: Vec<SparseRow> = (rl..ru)
                    .map(|r| SparseRow::with_capacity(block.row_nnz(r)))
                    .collect();
                block.for_each_nonzero(rl, ru, |r, c, x| rows[r - rl].append(c, x));
                rows
            }
            Self::Groups(groups) => {
                let mut counts = vec![0usize; ru - rl];
                for g in groups {
                    g.count_nonzeros_per_row(&mut counts, rl, ru);
                }
                let mut rows: Vec<SparseRow> =
                    counts.into_iter().map(SparseRow::with_capacity).collect();
                for g in groups {
                    g.decompress_to_sparse(&mut rows, rl, ru);
                }
                rows.iter_mut().for_each(SparseRow::sort);
                rows
            }
        }
    }
}

fn block_rows(cols: usize) -> usize {
    (BLOCK_CELLS / cols.max(1)).max(1)
}

/// Rows of a [`CompressedMatrix`], decoded a block at a time.
#[derive(Debug)]
pub struct RowIter<'a> {
    source: Source<'a>,
    cols: usize,
    format: RowFormat,
    /// First row not yet decoded.
    next_row: usize,
    end: usize,
    buffered: std::vec::IntoIter<MatrixRow>,
}

impl RowIter<'_> {
    /// Layout of the yielded rows.
    #[must_use]
    pub const fn format(&self) -> RowFormat {
        self.format
    }

    fn refill(&mut self) {
        let rl = self.next_row;
        let ru = self.end.min(rl + block_rows(self.cols));
        let rows: Vec<MatrixRow> = match self.format {
            RowFormat::Dense => {
                let mut values = vec![0.0; (ru - rl) * self.cols];
                self.source.decode_dense(&mut values, self.cols, rl, ru);
                (rl..ru)
                    .map(|r| {
                        let start = (r - rl) * self.cols;
                        MatrixRow::Dense(values[start..start + self.cols].to_vec())
                    })
                    .collect()
            }
            RowFormat::Sparse => self
                .source
                .decode_sparse(rl, ru)
                .into_iter()
                .map(MatrixRow::Sparse)
                .collect(),
        };
        self.next_row = ru;
        self.buffered = rows.into_iter();
    }
}

impl Iterator for RowIter<'_> {
    type Item = MatrixRow;

    fn next(&mut self) -> Option<MatrixRow> {
        if self.buffered.as_slice().is_empty() {
            if self.next_row >= self.end {
                return None;
            }
            self.refill();
        }
        self.buffered.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.buffered.len() + (self.end - self.next_row);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RowIter<'_> {}

/// `(row, col, value)` triples over the columns of a range of groups.
#[derive(Debug)]
pub struct CellIter<'a> {
    source: Source<'a>,
    cols: usize,
    /// Columns covered by the selected groups, ascending.
    columns: Vec<usize>,
    incl_zeros: bool,
    block: Vec<f64>,
    block_start: usize,
    block_len: usize,
    /// Next cell of the block, as `row_offset * columns.len() + k`.
    cursor: usize,
    next_row: usize,
    end: usize,
}

impl CellIter<'_> {
    /// Columns the iterator walks, ascending.
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    fn refill(&mut self) {
        let rl = self.next_row;
        let ru = self.end.min(rl + block_rows(self.cols));
        self.block.resize((ru - rl) * self.cols, 0.0);
        self.source.decode_dense(&mut self.block, self.cols, rl, ru);
        self.block_start = rl;
        self.block_len = ru - rl;
        self.cursor = 0;
        self.next_row = ru;
    }
}

impl Iterator for CellIter<'_> {
    type Item = (usize, usize, f64);

    fn next(&mut self) -> Option<(usize, usize, f64)> {
        let width = self.columns.len();
        loop {
            while self.cursor < self.block_len * width {
                let (i, k) = (self.cursor / width, self.cursor % width);
                self.cursor += 1;
                let col = self.columns[k];
                let x = self.block[i * self.cols + col];
                if x != 0.0 || self.incl_zeros {
                    return Some((self.block_start + i, col, x));
                }
            }
            if self.next_row >= self.end {
                return None;
            }
            self.refill();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let width = self.columns.len();
        let remaining =
            (self.block_len * width - self.cursor) + (self.end - self.next_row) * width;
        if self.incl_zeros {
            (remaining, Some(remaining))
        } else {
            (0, Some(remaining))
        }
    }
}

impl CompressedMatrix {
    /// Rows `rl..ru`, dense when [`Self::decompress`] would produce a dense
    /// block and sparse otherwise.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` if `rl..ru` is reversed or past the last row.
    pub fn row_iter(&self, rl: usize, ru: usize) -> Result<RowIter<'_>> {
        let format = if MatrixBlock::evaluate_sparse(self.rows, self.cols, self.nnz) {
            RowFormat::Sparse
        } else {
            RowFormat::Dense
        };
        self.row_iter_as(rl, ru, format)
    }

    /// Rows `rl..ru` in the given layout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` if `rl..ru` is reversed or past the last row.
    pub fn row_iter_as(&self, rl: usize, ru: usize, format: RowFormat) -> Result<RowIter<'_>> {
        Error::check_range("row", rl, ru, self.rows)?;
        Ok(RowIter {
            source: self.source(),
            cols: self.cols,
            format,
            next_row: rl,
            end: ru,
            buffered: Vec::new().into_iter(),
        })
    }

    /// Cells of rows `rl..ru` in the columns of groups `cgl..cgu`, row-major.
    ///
    /// Without `incl_zeros` only non-zero cells are produced. An uncompressed
    /// matrix counts as one group over every column.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` for a reversed or out-of-range row or group
    /// range.
    pub fn cell_iter(
        &self,
        rl: usize,
        ru: usize,
        cgl: usize,
        cgu: usize,
        incl_zeros: bool,
    ) -> Result<CellIter<'_>> {
        Error::check_range("row", rl, ru, self.rows)?;
        let (source, mut columns) = match &self.state {
            State::Uncompressed(block) => {
                Error::check_range("group", cgl, cgu, 1)?;
                let columns = if cgl < cgu { (0..self.cols).collect() } else { Vec::new() };
                (Source::Block(block), columns)
            }
            State::Compressed { groups, .. } => {
                Error::check_range("group", cgl, cgu, groups.len())?;
                let selected = &groups[cgl..cgu];
                let columns: Vec<usize> = selected
                    .iter()
                    .flat_map(|g| g.columns().iter().copied())
                    .collect();
                (Source::Groups(selected), columns)
            }
        };
        columns.sort_unstable();
        Ok(CellIter {
            source,
            cols: self.cols,
            columns,
            incl_zeros,
            block: Vec::new(),
            block_start: rl,
            block_len: 0,
            cursor: 0,
            next_row: rl,
            end: ru,
        })
    }

    fn source(&self) -> Source<'_> {
        match &self.state {
            State::Uncompressed(block) => Source::Block(block),
            State::Compressed { groups, .. } => Source::Groups(groups),
        }
    }
}
