//! Uncompressed operator implementations.
//!
//! These are the reference semantics the compressed operators must match and
//! the fallback used whenever a matrix is not compressed.

use super::{MatrixBlock, SparseRow, Storage};
use crate::error::{Error, Result};
use crate::kahan::KahanSum;
use crate::operators::{
    AggregateFn, AggregateUnaryOperator, BindDirection, ChainType, IndexFunction, ScalarOperator,
    TsmmType,
};

/// Running state of one aggregate output cell.
#[derive(Debug, Clone, Copy)]
struct Cell {
    sum: KahanSum,
    extreme: f64,
    product: f64,
    count: usize,
}

impl Cell {
    fn new(function: AggregateFn) -> Self {
        Self {
            sum: KahanSum::new(),
            extreme: match function {
                AggregateFn::Min => f64::INFINITY,
                AggregateFn::Max => f64::NEG_INFINITY,
                _ => 0.0,
            },
            product: 1.0,
            count: 0,
        }
    }

    fn push(&mut self, function: AggregateFn, x: f64) {
        self.count += 1;
        match function {
            AggregateFn::Sum | AggregateFn::Mean => self.sum.add(x),
            AggregateFn::SumSq => self.sum.add(x * x),
            AggregateFn::Min => self.extreme = self.extreme.min(x),
            AggregateFn::Max => self.extreme = self.extreme.max(x),
            AggregateFn::Product => self.product *= x,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(&self, function: AggregateFn) -> f64 {
        match function {
            AggregateFn::Sum | AggregateFn::SumSq => self.sum.value(),
            AggregateFn::Mean if self.count == 0 => f64::NAN,
            AggregateFn::Mean => self.sum.value() / self.count as f64,
            AggregateFn::Min | AggregateFn::Max => self.extreme,
            AggregateFn::Product => self.product,
        }
    }
}

impl MatrixBlock {
    /// Applies a scalar operator to every cell.
    #[must_use]
    pub fn scalar_operation(&self, op: &ScalarOperator) -> Self {
        let mut out = match &self.storage {
            Storage::Sparse(rows) if op.is_sparse_safe() => {
                let data = rows
                    .iter()
                    .map(|row| {
                        let mut out = SparseRow::with_capacity(row.len());
                        for (c, x) in row.iter() {
                            let y = op.apply(x);
                            if y != 0.0 {
                                out.append(c, y);
                            }
                        }
                        out
                    })
                    .collect();
                Self::from_sparse_rows(self.rows, self.cols, data)
            }
            _ => {
                let values = self.to_row_major().into_iter().map(|x| op.apply(x)).collect();
                let mut block = Self {
                    rows: self.rows,
                    cols: self.cols,
                    nnz: 0,
                    storage: Storage::Dense(values),
                };
                block.recompute_nnz();
                block
            }
        };
        out.examine_sparsity();
        out
    }

    /// Matrix product `self · rhs`.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `self.cols() != rhs.rows()`.
    pub fn matrix_multiply(&self, rhs: &Self) -> Result<Self> {
        if self.cols != rhs.rows {
            return Err(Error::DimensionMismatch {
                operation: "matrix_multiply",
                expected: (self.cols, rhs.cols),
                actual: rhs.shape(),
            });
        }
        let k = rhs.cols;
        let b = rhs.to_row_major();
        let mut out = vec![0.0; self.rows * k];
        self.for_each_nonzero(0, self.rows, |r, c, x| {
            let dst = &mut out[r * k..(r + 1) * k];
            for (d, &y) in dst.iter_mut().zip(&b[c * k..(c + 1) * k]) {
                *d += x * y;
            }
        });
        let mut block = Self::from_dense(self.rows, k, out)?;
        block.examine_sparsity();
        Ok(block)
    }

    /// Unary aggregate over all cells, zeros included.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches the compressed path.
    pub fn aggregate_unary(&self, op: &AggregateUnaryOperator) -> Result<Self> {
        let (out_rows, out_cols) = op.output_shape(self.rows, self.cols);
        let f = op.function;
        let mut cells = vec![Cell::new(f); out_rows * out_cols];
        let mut row = vec![0.0; self.cols];
        for r in 0..self.rows {
            self.row_into(r, &mut row);
            for (c, &x) in row.iter().enumerate() {
                let idx = match op.index {
                    IndexFunction::ReduceAll => 0,
                    IndexFunction::ReduceRow => c,
                    IndexFunction::ReduceCol => r,
                };
                cells[idx].push(f, x);
            }
        }
        let values = cells.iter().map(|cell| cell.finish(f)).collect();
        Self::from_dense(out_rows, out_cols, values)
    }

    /// `t(X) %*% (X %*% v)` or `t(X) %*% (w * (X %*% v))`.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` for a wrongly shaped `v` or `w`, and
    /// `UnsupportedOperation` if `XtwXv` is requested without weights.
    pub fn chain_multiply(
        &self,
        v: &Self,
        w: Option<&Self>,
        chain: ChainType,
    ) -> Result<Self> {
        check_chain_operands(self.rows, self.cols, v, w, chain)?;
        let mut tmp = self.matrix_multiply(v)?.to_row_major();
        if let (ChainType::XtwXv, Some(w)) = (chain, w) {
            for (t, x) in tmp.iter_mut().zip(w.to_row_major()) {
                *t *= x;
            }
        }
        let mut out = vec![0.0; self.cols];
        self.for_each_nonzero(0, self.rows, |r, c, x| out[c] += x * tmp[r]);
        Self::from_dense(self.cols, 1, out)
    }

    /// `t(X) %*% X` (left) or `X %*% t(X)` (right), both triangles filled.
    #[must_use]
    pub fn transpose_self_multiply(&self, kind: TsmmType) -> Self {
        let (n, source) = match kind {
            TsmmType::Left => (self.cols, self.clone()),
            TsmmType::Right => (self.rows, self.transpose()),
        };
        let mut out = vec![0.0; n * n];
        let mut row = vec![0.0; source.cols];
        for r in 0..source.rows {
            source.row_into(r, &mut row);
            for i in 0..n {
                let xi = row[i];
                if xi == 0.0 {
                    continue;
                }
                for j in i..n {
                    out[i * n + j] += xi * row[j];
                }
            }
        }
        for i in 0..n {
            for j in 0..i {
                out[i * n + j] = out[j * n + i];
            }
        }
        let nnz = out.iter().filter(|x| **x != 0.0).count();
        let mut block = Self {
            rows: n,
            cols: n,
            nnz,
            storage: Storage::Dense(out),
        };
        block.examine_sparsity();
        block
    }

    /// Column or row concatenation.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the shared dimension differs.
    pub fn append(&self, other: &Self, direction: BindDirection) -> Result<Self> {
        match direction {
            BindDirection::Cbind => {
                if self.rows != other.rows {
                    return Err(Error::DimensionMismatch {
                        operation: "cbind",
                        expected: (self.rows, other.cols),
                        actual: other.shape(),
                    });
                }
                let cols = self.cols + other.cols;
                let (a, b) = (self.to_row_major(), other.to_row_major());
                let mut values = Vec::with_capacity(self.rows * cols);
                for r in 0..self.rows {
                    values.extend_from_slice(&a[r * self.cols..(r + 1) * self.cols]);
                    values.extend_from_slice(&b[r * other.cols..(r + 1) * other.cols]);
                }
                let mut block = Self::from_dense(self.rows, cols, values)?;
                block.examine_sparsity();
                Ok(block)
            }
            BindDirection::Rbind => {
                if self.cols != other.cols {
                    return Err(Error::DimensionMismatch {
                        operation: "rbind",
                        expected: (other.rows, self.cols),
                        actual: other.shape(),
                    });
                }
                let mut values = self.to_row_major();
                values.extend(other.to_row_major());
                let mut block = Self::from_dense(self.rows + other.rows, self.cols, values)?;
                block.examine_sparsity();
                Ok(block)
            }
        }
    }
}

/// Shape checks shared by the compressed and uncompressed chain multiply.
pub(crate) fn check_chain_operands(
    rows: usize,
    cols: usize,
    v: &MatrixBlock,
    w: Option<&MatrixBlock>,
    chain: ChainType,
) -> Result<()> {
    if v.shape() != (cols, 1) {
        return Err(Error::DimensionMismatch {
            operation: "chain_multiply",
            expected: (cols, 1),
            actual: v.shape(),
        });
    }
    if chain == ChainType::XtwXv {
        match w {
            None => {
                return Err(Error::unsupported("XtwXv chain multiply requires weights"));
            }
            Some(w) if w.shape() != (rows, 1) => {
                return Err(Error::DimensionMismatch {
                    operation: "chain_multiply",
                    expected: (rows, 1),
                    actual: w.shape(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}
