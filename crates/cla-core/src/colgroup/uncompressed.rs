//! Uncompressed fallback group wrapping a plain matrix block.

use std::sync::Arc;

use super::aggregate::AggregateBuffer;
use crate::error::{Error, Result};
use crate::matrix::MatrixBlock;
use crate::operators::{IndexFunction, ScalarOperator};

/// Column group that stores its columns as an ordinary [`MatrixBlock`].
#[derive(Debug, Clone, PartialEq)]
pub struct UncompressedGroup {
    columns: Vec<usize>,
    data: Arc<MatrixBlock>,
}

impl UncompressedGroup {
    /// Wraps a block whose columns are the group's columns, in order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnGroup` if the column counts differ.
    pub fn new(columns: Vec<usize>, data: MatrixBlock) -> Result<Self> {
        Self::from_shared(columns, Arc::new(data))
    }

    fn from_shared(columns: Vec<usize>, data: Arc<MatrixBlock>) -> Result<Self> {
        if data.cols() != columns.len() {
            return Err(Error::InvalidColumnGroup(format!(
                "uncompressed group has {} columns but block has {}",
                columns.len(),
                data.cols()
            )));
        }
        Ok(Self { columns, data })
    }

    /// Extracts `columns` from the original row-major input.
    ///
    /// When the group spans every column of `source`, the block is shared
    /// instead of copied.
    #[must_use]
    pub fn from_source(source: &Arc<MatrixBlock>, columns: Vec<usize>) -> Self {
        let full = columns.len() == source.cols() && columns.iter().enumerate().all(|(i, &c)| i == c);
        let data = if full {
            Arc::clone(source)
        } else {
            let mut block = source.slice_columns(&columns);
            block.examine_sparsity();
            Arc::new(block)
        };
        Self { columns, data }
    }

    /// Column indices.
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Row count.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.data.rows()
    }

    /// Wrapped block.
    #[must_use]
    pub fn data(&self) -> &MatrixBlock {
        &self.data
    }

    /// Same payload under new column indices.
    #[must_use]
    pub fn with_columns(&self, columns: Vec<usize>) -> Self {
        Self {
            columns,
            data: Arc::clone(&self.data),
        }
    }

    /// Value at `row` of the group's `pos`-th column.
    #[must_use]
    pub fn get(&self, row: usize, pos: usize) -> f64 {
        self.data.get(row, pos)
    }

    pub(crate) fn for_each_nonzero(&self, rl: usize, ru: usize, mut f: impl FnMut(usize, usize, f64)) {
        self.data
            .for_each_nonzero(rl, ru, |r, j, x| f(r, self.columns[j], x));
    }

    pub(crate) fn count_nonzeros_per_row(&self, counts: &mut [usize], rl: usize, ru: usize) {
        for r in rl..ru {
            counts[r - rl] += self.data.row_nnz(r);
        }
    }

    /// Writes (not adds) this group's product into `out`; run it before other groups.
    pub(crate) fn right_mult(&self, vector: &[f64], out: &mut [f64], rl: usize, ru: usize) {
        let gathered: Vec<f64> = self.columns.iter().map(|&c| vector[c]).collect();
        out[..ru - rl].fill(0.0);
        self.data
            .for_each_nonzero(rl, ru, |r, j, x| out[r - rl] += x * gathered[j]);
    }

    pub(crate) fn left_mult(&self, vector: &[f64], out: &mut [f64]) {
        self.data
            .for_each_nonzero(0, self.data.rows(), |r, j, x| out[self.columns[j]] += vector[r] * x);
    }

    pub(crate) fn aggregate(
        &self,
        buf: &mut AggregateBuffer,
        index: IndexFunction,
        rl: usize,
        ru: usize,
    ) {
        match index {
            IndexFunction::ReduceAll | IndexFunction::ReduceRow => {
                let mut nnz = vec![0usize; self.columns.len()];
                let slot = |j: usize| {
                    if index == IndexFunction::ReduceAll {
                        0
                    } else {
                        self.columns[j]
                    }
                };
                self.data.for_each_nonzero(rl, ru, |_, j, x| {
                    nnz[j] += 1;
                    buf.add(slot(j), x, 1);
                });
                for (j, &n) in nnz.iter().enumerate() {
                    if n < ru - rl {
                        buf.fold_zero(slot(j));
                    }
                }
            }
            IndexFunction::ReduceCol => {
                self.data
                    .for_each_nonzero(rl, ru, |r, _, x| buf.add(r - rl, x, 1));
            }
        }
    }

    /// Applies `op` through the block's own scalar operator.
    #[must_use]
    pub fn scalar_op(&self, op: &ScalarOperator) -> Self {
        Self {
            columns: self.columns.clone(),
            data: Arc::new(self.data.scalar_operation(op)),
        }
    }

    /// Estimated in-memory size in bytes.
    #[must_use]
    pub fn size_in_memory(&self) -> usize {
        self.data.size_in_memory()
    }
}
