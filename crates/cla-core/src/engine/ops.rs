//! Operators on a compressed matrix.
//!
//! Every operator first checks [`CompressedMatrix::fallback_block`]: a matrix
//! that is not compressed, or that holds a single uncompressed group over all
//! columns, delegates to the plain [`MatrixBlock`] implementation.

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use super::{CompressedMatrix, State};
use crate::colgroup::{
    AggregateBuffer, ColumnGroup, Dictionary, UncompressedGroup, BITMAP_BLOCK_SZ,
};
use crate::error::{Error, Result};
use crate::matrix::{check_chain_operands, MatrixBlock, SparseRow};
use crate::operators::{
    AggregateFn, AggregateUnaryOperator, BindDirection, ChainType, IndexFunction, ScalarOperator,
    TsmmType,
};
use crate::parallel::{round_robin, row_partitions, ScratchGuard, TaskPool};

impl CompressedMatrix {
    /// Value at (`row`, `col`).
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` outside the matrix.
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        self.check_bounds(row, col)?;
        match &self.state {
            State::Uncompressed(block) => Ok(block.get(row, col)),
            State::Compressed { groups, .. } => Ok(groups
                .iter()
                .find(|g| g.position_of(col).is_some())
                .map_or(0.0, |g| g.get(row, col))),
        }
    }

    /// Materialises the matrix, sparse or dense depending on its nnz.
    ///
    /// Rows are split into block-aligned ranges. Sparse output pre-sizes
    /// every row from the per-row non-zero counts before any group writes.
    ///
    /// # Errors
    ///
    /// Returns `TaskFailed` if a worker fails.
    pub fn decompress(&self, threads: usize) -> Result<MatrixBlock> {
        let groups = match &self.state {
            State::Uncompressed(block) => return Ok(MatrixBlock::clone(block)),
            State::Compressed { groups, .. } => groups,
        };
        let (rows, cols) = self.shape();
        let pool = TaskPool::new(threads)?;
        let parts = row_partitions(rows, pool.threads());
        let max_values = max_values(groups);

        if MatrixBlock::evaluate_sparse(rows, cols, self.nnz) {
            let mut data = vec![SparseRow::default(); rows];
            let tasks: Vec<_> = split_rows(&mut data, &parts, 1)
                .into_iter()
                .zip(parts.iter().cloned())
                .map(|(chunk, range)| {
                    move || -> Result<()> {
                        let _scratch = ScratchGuard::acquire(max_values);
                        let (rl, ru) = (range.start, range.end);
                        let mut counts = vec![0usize; ru - rl];
                        for g in groups {
                            g.count_nonzeros_per_row(&mut counts, rl, ru);
                        }
                        for (row, &n) in chunk.iter_mut().zip(&counts) {
                            *row = SparseRow::with_capacity(n);
                        }
                        for g in groups {
                            g.decompress_to_sparse(chunk, rl, ru);
                        }
                        chunk.iter_mut().for_each(SparseRow::sort);
                        Ok(())
                    }
                })
                .collect();
            pool.run(tasks)?;
            Ok(MatrixBlock::from_sparse_rows(rows, cols, data))
        } else {
            let mut values = vec![0.0; rows * cols];
            let tasks: Vec<_> = split_rows(&mut values, &parts, cols)
                .into_iter()
                .zip(parts.iter().cloned())
                .map(|(chunk, range)| {
                    move || -> Result<()> {
                        for g in groups {
                            g.decompress_to_dense(chunk, cols, range.start, range.end);
                        }
                        Ok(())
                    }
                })
                .collect();
            pool.run(tasks)?;
            MatrixBlock::from_dense(rows, cols, values)
        }
    }

    /// Applies `op` to every cell; the result stays compressed.
    ///
    /// Groups sharing a dictionary keep sharing the rewritten one. The
    /// resulting nnz is reported as `rows * cols`.
    #[must_use]
    pub fn scalar_operation(&self, op: &ScalarOperator) -> Self {
        let (groups, shared) = match &self.state {
            State::Uncompressed(block) => return Self::new(block.scalar_operation(op)),
            State::Compressed {
                groups,
                shared_dictionary_active,
            } => (groups, *shared_dictionary_active),
        };
        let mut rewritten: Vec<(Dictionary, Dictionary)> = Vec::new();
        let groups = groups
            .iter()
            .map(|g| {
                let out = match g.as_ref() {
                    ColumnGroup::Ddc(ddc) => {
                        let old = ddc.dictionary();
                        let known = rewritten
                            .iter()
                            .find(|(o, _)| old.ptr_eq(o))
                            .map(|(_, new)| new.clone());
                        let dict = known.unwrap_or_else(|| {
                            let new = old.apply(op);
                            rewritten.push((old.clone(), new.clone()));
                            new
                        });
                        ColumnGroup::Ddc(ddc.with_dictionary(dict))
                    }
                    other => other.scalar_op(op),
                };
                Arc::new(out)
            })
            .collect();
        Self {
            rows: self.rows,
            cols: self.cols,
            nnz: self.rows * self.cols,
            state: State::Compressed {
                groups,
                shared_dictionary_active: shared,
            },
            stats: None,
        }
    }

    /// `X · v` for a `cols x 1` vector.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` for a wrongly shaped vector and
    /// `TaskFailed` if a worker fails.
    pub fn right_multiply(&self, vector: &MatrixBlock, threads: usize) -> Result<MatrixBlock> {
        if vector.shape() != (self.cols, 1) {
            return Err(Error::DimensionMismatch {
                operation: "right_multiply",
                expected: (self.cols, 1),
                actual: vector.shape(),
            });
        }
        if let Some(block) = self.fallback_block() {
            return block.matrix_multiply(vector);
        }
        let v = vector.to_row_major();
        let out = self.right_multiply_values(&v, threads)?;
        let mut block = MatrixBlock::from_dense(self.rows, 1, out)?;
        block.examine_sparsity();
        Ok(block)
    }

    /// `v · X` for a `1 x rows` vector.
    ///
    /// Groups are spread round-robin over the workers; per-worker partial
    /// results are summed.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` for a wrongly shaped vector and
    /// `TaskFailed` if a worker fails.
    pub fn left_multiply_by_row_vector(
        &self,
        vector: &MatrixBlock,
        threads: usize,
    ) -> Result<MatrixBlock> {
        if vector.shape() != (1, self.rows) {
            return Err(Error::DimensionMismatch {
                operation: "left_multiply_by_row_vector",
                expected: (1, self.rows),
                actual: vector.shape(),
            });
        }
        if let Some(block) = self.fallback_block() {
            return vector.matrix_multiply(block);
        }
        let v = vector.to_row_major();
        let out = self.left_multiply_values(&v, threads)?;
        let mut block = MatrixBlock::from_dense(1, self.cols, out)?;
        block.examine_sparsity();
        Ok(block)
    }

    /// `X · B`, one right multiply per column of `B`.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `rhs.rows() != self.cols()`.
    pub fn matrix_multiply(&self, rhs: &MatrixBlock, threads: usize) -> Result<MatrixBlock> {
        if rhs.rows() != self.cols {
            return Err(Error::DimensionMismatch {
                operation: "matrix_multiply",
                expected: (self.cols, rhs.cols()),
                actual: rhs.shape(),
            });
        }
        if let Some(block) = self.fallback_block() {
            return block.matrix_multiply(rhs);
        }
        let groups = self.column_groups();
        let (rows, k) = (self.rows, rhs.cols());
        let columns = rhs.transpose().to_row_major();
        let pool = TaskPool::new(threads)?;
        let indices: Vec<usize> = (0..k).collect();
        let max_values = max_values(groups);
        let tasks: Vec<_> = round_robin(&indices, pool.threads())
            .into_iter()
            .map(|bucket| {
                let columns = &columns;
                move || -> Result<Vec<(usize, Vec<f64>)>> {
                    let _scratch = ScratchGuard::acquire(max_values);
                    Ok(bucket
                        .into_iter()
                        .map(|j| {
                            let v = &columns[j * rhs.rows()..(j + 1) * rhs.rows()];
                            let mut out = vec![0.0; rows];
                            right_mult_range(groups, v, &mut out, 0, rows);
                            (j, out)
                        })
                        .collect())
                }
            })
            .collect();
        let mut values = vec![0.0; rows * k];
        for (j, column) in pool.run(tasks)?.into_iter().flatten() {
            for (r, x) in column.into_iter().enumerate() {
                values[r * k + j] = x;
            }
        }
        let mut block = MatrixBlock::from_dense(rows, k, values)?;
        block.examine_sparsity();
        Ok(block)
    }

    /// `A · X`, one row-vector left multiply per row of `A`.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `lhs.cols() != self.rows()`.
    pub fn left_matrix_multiply(&self, lhs: &MatrixBlock, threads: usize) -> Result<MatrixBlock> {
        if lhs.cols() != self.rows {
            return Err(Error::DimensionMismatch {
                operation: "left_matrix_multiply",
                expected: (lhs.rows(), self.rows),
                actual: lhs.shape(),
            });
        }
        if let Some(block) = self.fallback_block() {
            return lhs.matrix_multiply(block);
        }
        let groups = self.column_groups();
        let (m, rows, cols) = (lhs.rows(), self.rows, self.cols);
        let lhs_values = lhs.to_row_major();
        let pool = TaskPool::new(threads)?;
        let indices: Vec<usize> = (0..m).collect();
        let max_values = max_values(groups);
        let tasks: Vec<_> = round_robin(&indices, pool.threads())
            .into_iter()
            .map(|bucket| {
                let lhs_values = &lhs_values;
                move || -> Result<Vec<(usize, Vec<f64>)>> {
                    let _scratch = ScratchGuard::acquire(max_values);
                    Ok(bucket
                        .into_iter()
                        .map(|i| {
                            let v = &lhs_values[i * rows..(i + 1) * rows];
                            let mut out = vec![0.0; cols];
                            for g in groups {
                                g.left_mult(v, &mut out);
                            }
                            (i, out)
                        })
                        .collect())
                }
            })
            .collect();
        let mut values = vec![0.0; m * cols];
        for (i, row) in pool.run(tasks)?.into_iter().flatten() {
            values[i * cols..(i + 1) * cols].copy_from_slice(&row);
        }
        let mut block = MatrixBlock::from_dense(m, cols, values)?;
        block.examine_sparsity();
        Ok(block)
    }

    /// `t(X) · X`.
    ///
    /// For each group, its columns are decoded one at a time and multiplied
    /// against that group and every later one; the lower triangle is then
    /// mirrored from the upper one.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for [`TsmmType::Right`] on a compressed
    /// matrix and `TaskFailed` if a worker fails.
    pub fn transpose_self_multiply(&self, kind: TsmmType, threads: usize) -> Result<MatrixBlock> {
        if kind == TsmmType::Right && self.is_compressed() {
            return Err(Error::unsupported(
                "right transpose-self multiply on a compressed matrix",
            ));
        }
        if let Some(block) = self.fallback_block() {
            return Ok(block.transpose_self_multiply(kind));
        }
        let groups = self.column_groups();
        let (rows, n) = self.shape();
        let pool = TaskPool::new(threads)?;
        let max_values = max_values(groups);

        let mut out = vec![0.0; n * n];
        {
            let mut slots: Vec<Option<&mut [f64]>> = out.chunks_mut(n).map(Some).collect();
            let indices: Vec<usize> = (0..groups.len()).collect();
            let mut tasks = Vec::new();
            for bucket in round_robin(&indices, pool.threads()) {
                let mut work = Vec::new();
                for i in bucket {
                    for &col in groups[i].columns() {
                        if let Some(row) = slots.get_mut(col).and_then(Option::take) {
                            work.push((i, col, row));
                        }
                    }
                }
                tasks.push(move || -> Result<()> {
                    let _scratch = ScratchGuard::acquire(max_values);
                    let mut column = vec![0.0; rows];
                    for (i, col, row) in work {
                        tsmm_row(groups, i, col, &mut column, row);
                    }
                    Ok(())
                });
            }
            pool.run(tasks)?;
        }

        let mut owner = vec![0usize; n];
        for (i, g) in groups.iter().enumerate() {
            for &c in g.columns() {
                owner[c] = i;
            }
        }
        for a in 0..n {
            for b in 0..n {
                if owner[a] < owner[b] {
                    out[b * n + a] = out[a * n + b];
                }
            }
        }
        let mut block = MatrixBlock::from_dense(n, n, out)?;
        block.examine_sparsity();
        Ok(block)
    }

    /// Sum, sum of squares, min or max over all cells, rows or columns.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for `Mean` and `Product` on a
    /// compressed matrix and `TaskFailed` if a worker fails.
    pub fn unary_aggregate(&self, op: &AggregateUnaryOperator) -> Result<MatrixBlock> {
        if let Some(block) = self.fallback_block() {
            return block.aggregate_unary(op);
        }
        if !matches!(
            op.function,
            AggregateFn::Sum | AggregateFn::SumSq | AggregateFn::Min | AggregateFn::Max
        ) {
            return Err(Error::unsupported(format!(
                "{:?} aggregate on a compressed matrix",
                op.function
            )));
        }
        let groups = self.column_groups();
        let (rows, cols) = self.shape();
        let (out_rows, out_cols) = op.output_shape(rows, cols);
        let pool = TaskPool::new(op.threads)?;
        let max_values = max_values(groups);
        let extreme = matches!(op.function, AggregateFn::Min | AggregateFn::Max);

        let tasks: Vec<_> = row_partitions(rows, pool.threads())
            .into_iter()
            .map(|range| {
                move || -> Result<AggregateBuffer> {
                    let _scratch = ScratchGuard::acquire(max_values);
                    let (rl, ru) = (range.start, range.end);
                    let len = match op.index {
                        IndexFunction::ReduceAll => 1,
                        IndexFunction::ReduceRow => cols,
                        IndexFunction::ReduceCol => ru - rl,
                    };
                    let mut buf = AggregateBuffer::new(op.function, len);
                    for g in groups {
                        g.aggregate(&mut buf, op.index, rl, ru);
                    }
                    if extreme && op.index == IndexFunction::ReduceCol {
                        let mut counts = vec![0usize; ru - rl];
                        for g in groups {
                            g.count_nonzeros_per_row(&mut counts, rl, ru);
                        }
                        for (i, &n) in counts.iter().enumerate() {
                            if n < cols {
                                buf.fold_zero(i);
                            }
                        }
                    }
                    Ok(buf)
                }
            })
            .collect();
        let buffers = pool.run(tasks)?;

        let values = if op.index == IndexFunction::ReduceCol {
            buffers.into_iter().flat_map(AggregateBuffer::finish).collect()
        } else {
            let mut buffers = buffers.into_iter();
            match buffers.next() {
                Some(mut acc) => {
                    for b in buffers {
                        acc.merge(&b);
                    }
                    acc.finish()
                }
                None => vec![0.0; out_rows * out_cols],
            }
        };
        debug!(function = ?op.function, index = ?op.index, "compressed aggregate");
        MatrixBlock::from_dense(out_rows, out_cols, values)
    }

    /// `t(X) · (X · v)` or `t(X) · (w ⊙ (X · v))`, returned as `cols x 1`.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` for wrongly shaped operands and
    /// `UnsupportedOperation` if `XtwXv` has no weights.
    pub fn chain_multiply(
        &self,
        v: &MatrixBlock,
        w: Option<&MatrixBlock>,
        chain: ChainType,
        threads: usize,
    ) -> Result<MatrixBlock> {
        if let Some(block) = self.fallback_block() {
            return block.chain_multiply(v, w, chain);
        }
        check_chain_operands(self.rows, self.cols, v, w, chain)?;
        let mut tmp = self.right_multiply_values(&v.to_row_major(), threads)?;
        if let (ChainType::XtwXv, Some(w)) = (chain, w) {
            for (t, x) in tmp.iter_mut().zip(w.to_row_major()) {
                *t *= x;
            }
        }
        let out = self.left_multiply_values(&tmp, threads)?;
        MatrixBlock::from_dense(self.cols, 1, out)
    }

    /// Concatenates `other` to the right (`Cbind`) or below (`Rbind`).
    ///
    /// Column binding of a compressed matrix keeps its groups and adds the
    /// groups of `other` with shifted column indices; an uncompressed `other`
    /// becomes one uncompressed group. Row binding always goes through the
    /// uncompressed path.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the shared dimension differs.
    pub fn append(&self, other: &Self, direction: BindDirection, threads: usize) -> Result<Self> {
        let groups = match (&self.state, direction) {
            (State::Compressed { groups, .. }, BindDirection::Cbind) => groups,
            _ => {
                let left = self.decompress(threads)?;
                let right = other.decompress(threads)?;
                return Ok(Self::new(left.append(&right, direction)?));
            }
        };
        if other.rows != self.rows {
            return Err(Error::DimensionMismatch {
                operation: "cbind",
                expected: (self.rows, other.cols),
                actual: other.shape(),
            });
        }
        let mut out: Vec<Arc<ColumnGroup>> = groups.iter().map(Arc::clone).collect();
        match &other.state {
            State::Compressed { groups, .. } => {
                out.extend(groups.iter().map(|g| Arc::new(g.shift_columns(self.cols))));
            }
            State::Uncompressed(block) if other.cols > 0 => {
                let columns = (self.cols..self.cols + other.cols).collect();
                out.push(Arc::new(ColumnGroup::Uncompressed(
                    UncompressedGroup::new(columns, MatrixBlock::clone(block))?,
                )));
            }
            State::Uncompressed(_) => {}
        }
        Self::from_groups(
            self.rows,
            self.cols + other.cols,
            self.nnz + other.nnz,
            out,
            self.shared_dictionary_active() || other.shared_dictionary_active(),
        )
    }

    fn right_multiply_values(&self, v: &[f64], threads: usize) -> Result<Vec<f64>> {
        let groups = self.column_groups();
        let pool = TaskPool::new(threads)?;
        let parts = row_partitions(self.rows, pool.threads());
        let max_values = max_values(groups);
        let mut out = vec![0.0; self.rows];
        let tasks: Vec<_> = split_rows(&mut out, &parts, 1)
            .into_iter()
            .zip(parts.iter().cloned())
            .map(|(chunk, range)| {
                move || -> Result<()> {
                    let _scratch = ScratchGuard::acquire(max_values);
                    right_mult_range(groups, v, chunk, range.start, range.end);
                    Ok(())
                }
            })
            .collect();
        pool.run(tasks)?;
        Ok(out)
    }

    fn left_multiply_values(&self, v: &[f64], threads: usize) -> Result<Vec<f64>> {
        let groups: Vec<&ColumnGroup> = self.column_groups().iter().map(AsRef::as_ref).collect();
        let pool = TaskPool::new(threads)?;
        let cols = self.cols;
        let max_values = max_values(self.column_groups());
        let tasks: Vec<_> = round_robin(&groups, pool.threads())
            .into_iter()
            .map(|bucket| {
                move || -> Result<Vec<f64>> {
                    let _scratch = ScratchGuard::acquire(max_values);
                    let mut out = vec![0.0; cols];
                    for g in bucket {
                        g.left_mult(v, &mut out);
                    }
                    Ok(out)
                }
            })
            .collect();
        let mut out = vec![0.0; cols];
        for partial in pool.run(tasks)? {
            for (o, x) in out.iter_mut().zip(partial) {
                *o += x;
            }
        }
        Ok(out)
    }
}

/// Right multiply of rows `rl..ru` into `out` (length `ru - rl`).
///
/// The first uncompressed group overwrites `out`; further uncompressed
/// groups go through a temporary and are added; compressed groups add.
fn right_mult_range(groups: &[Arc<ColumnGroup>], v: &[f64], out: &mut [f64], rl: usize, ru: usize) {
    let mut overwritten = false;
    for g in groups {
        if !matches!(g.as_ref(), ColumnGroup::Uncompressed(_)) {
            continue;
        }
        if overwritten {
            let mut tmp = vec![0.0; ru - rl];
            g.right_mult(v, &mut tmp, rl, ru);
            for (o, x) in out.iter_mut().zip(tmp) {
                *o += x;
            }
        } else {
            g.right_mult(v, out, rl, ru);
            overwritten = true;
        }
    }
    if !overwritten {
        out.fill(0.0);
    }
    for g in groups {
        if !matches!(g.as_ref(), ColumnGroup::Uncompressed(_)) {
            g.right_mult(v, out, rl, ru);
        }
    }
}

/// Row `col` of `t(X) · X` restricted to groups `i..`.
fn tsmm_row(groups: &[Arc<ColumnGroup>], i: usize, col: usize, column: &mut [f64], row: &mut [f64]) {
    let lhs = groups[i]
        .as_ddc()
        .filter(|d| d.columns().len() == 1 && d.num_rows() <= BITMAP_BLOCK_SZ);
    let mut decoded = false;
    for g in &groups[i..] {
        match (lhs, g.as_ddc()) {
            (Some(lhs), Some(rhs)) => rhs.left_mult_by_ddc_column(lhs, row),
            _ => {
                if !decoded {
                    groups[i].decompress_column(col, column);
                    decoded = true;
                }
                g.left_mult(column, row);
            }
        }
    }
}

fn max_values(groups: &[Arc<ColumnGroup>]) -> usize {
    groups.iter().map(|g| g.num_values()).max().unwrap_or(0)
}

/// Splits a row-major buffer into one chunk per row range.
fn split_rows<'a, T>(mut data: &'a mut [T], parts: &[Range<usize>], width: usize) -> Vec<&'a mut [T]> {
    let mut chunks = Vec::with_capacity(parts.len());
    for range in parts {
        let (head, tail) = std::mem::take(&mut data).split_at_mut(range.len() * width);
        chunks.push(head);
        data = tail;
    }
    chunks
}
