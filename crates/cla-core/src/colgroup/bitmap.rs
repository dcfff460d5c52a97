//! Distinct-tuple extraction from the raw input.
//!
//! A [`ColumnBitmap`] lists, for one set of columns, every distinct non-zero
//! value tuple and the sorted rows holding it. Rows whose tuple is all zeros
//! are not listed. Both the size estimator (over a row sample) and the group
//! constructors (over all rows) start from it.

use rustc_hash::FxHashMap;

use crate::matrix::MatrixBlock;

/// Planning-time view of the input, optionally through a transposed copy.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSource<'a> {
    block: &'a MatrixBlock,
    transposed: bool,
}

impl<'a> ColumnSource<'a> {
    /// Reads `block` directly.
    #[must_use]
    pub const fn row_major(block: &'a MatrixBlock) -> Self {
        Self {
            block,
            transposed: false,
        }
    }

    /// Reads a transposed copy, so `block.rows()` is the logical column count.
    #[must_use]
    pub const fn transposed(block: &'a MatrixBlock) -> Self {
        Self {
            block,
            transposed: true,
        }
    }

    /// Logical row count.
    #[must_use]
    pub const fn rows(&self) -> usize {
        if self.transposed {
            self.block.cols()
        } else {
            self.block.rows()
        }
    }

    /// Logical column count.
    #[must_use]
    pub const fn cols(&self) -> usize {
        if self.transposed {
            self.block.rows()
        } else {
            self.block.cols()
        }
    }

    /// Logical cell value.
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if self.transposed {
            self.block.get(col, row)
        } else {
            self.block.get(row, col)
        }
    }

    /// Exact non-zero count of one logical column.
    #[must_use]
    pub fn column_nnz(&self, col: usize) -> usize {
        if self.transposed {
            self.block.row_nnz(col)
        } else {
            (0..self.block.rows())
                .filter(|&r| self.block.get(r, col) != 0.0)
                .count()
        }
    }

    /// Values of `col` at `rows`, or at every row when `rows` is `None`.
    fn gather_column(&self, col: usize, rows: Option<&[usize]>) -> Vec<f64> {
        match rows {
            None if self.transposed => {
                let mut out = vec![0.0; self.rows()];
                self.block.row_into(col, &mut out);
                out
            }
            None => (0..self.rows()).map(|r| self.get(r, col)).collect(),
            Some(rows) => rows.iter().map(|&r| self.get(r, col)).collect(),
        }
    }
}

/// Distinct non-zero tuples of a column set and the rows holding each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnBitmap {
    num_cols: usize,
    values: Vec<f64>,
    offsets: Vec<Vec<u32>>,
}

impl ColumnBitmap {
    /// Scans `columns` over all rows, or over the sorted `sample` rows.
    ///
    /// Tuples are numbered in first-occurrence order and offsets are original
    /// row indices in ascending order.
    #[must_use]
    pub fn extract(source: &ColumnSource<'_>, columns: &[usize], sample: Option<&[usize]>) -> Self {
        let num_cols = columns.len();
        let gathered: Vec<Vec<f64>> = columns
            .iter()
            .map(|&c| source.gather_column(c, sample))
            .collect();
        let n = sample.map_or(source.rows(), <[usize]>::len);

        let mut index: FxHashMap<Vec<u64>, u32> = FxHashMap::default();
        let mut values = Vec::new();
        let mut offsets: Vec<Vec<u32>> = Vec::new();
        let mut key = vec![0u64; num_cols];
        for i in 0..n {
            let mut all_zero = true;
            for (slot, column) in key.iter_mut().zip(&gathered) {
                let x = column[i];
                if x == 0.0 {
                    *slot = 0;
                } else {
                    all_zero = false;
                    *slot = x.to_bits();
                }
            }
            if all_zero {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            let row = sample.map_or(i, |s| s[i]) as u32;
            let code = match index.get(key.as_slice()) {
                Some(&code) => code as usize,
                None => {
                    let code = offsets.len();
                    #[allow(clippy::cast_possible_truncation)]
                    index.insert(key.clone(), code as u32);
                    values.extend(gathered.iter().map(|column| {
                        let x = column[i];
                        if x == 0.0 {
                            0.0
                        } else {
                            x
                        }
                    }));
                    offsets.push(Vec::new());
                    code
                }
            };
            offsets[code].push(row);
        }
        Self {
            num_cols,
            values,
            offsets,
        }
    }

    /// Builds a bitmap from parts. Offsets must be sorted and disjoint across tuples.
    #[must_use]
    pub fn from_parts(num_cols: usize, values: Vec<f64>, offsets: Vec<Vec<u32>>) -> Self {
        debug_assert_eq!(values.len(), num_cols * offsets.len());
        Self {
            num_cols,
            values,
            offsets,
        }
    }

    /// Number of columns per tuple.
    #[must_use]
    pub const fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Number of distinct non-zero tuples.
    #[must_use]
    pub fn num_values(&self) -> usize {
        self.offsets.len()
    }

    /// Total listed rows over all tuples.
    #[must_use]
    pub fn num_offsets(&self) -> usize {
        self.offsets.iter().map(Vec::len).sum()
    }

    /// Flattened tuples.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Sorted rows of tuple `k`.
    #[must_use]
    pub fn offsets(&self, k: usize) -> &[u32] {
        &self.offsets[k]
    }

    /// All offset lists.
    #[must_use]
    pub fn offset_lists(&self) -> &[Vec<u32>] {
        &self.offsets
    }

    /// Number of maximal runs of consecutive rows, summed over tuples.
    #[must_use]
    pub fn num_runs(&self) -> usize {
        self.offsets.iter().map(|list| count_runs(list)).sum()
    }

    /// Splits into `(values, offsets)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<f64>, Vec<Vec<u32>>) {
        (self.values, self.offsets)
    }
}

/// Runs of consecutive values in a sorted list.
pub(crate) fn count_runs(sorted: &[u32]) -> usize {
    if sorted.is_empty() {
        return 0;
    }
    1 + sorted.windows(2).filter(|w| w[1] != w[0] + 1).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> MatrixBlock {
        MatrixBlock::from_rows(&[
            vec![1.0, 0.0, 7.0],
            vec![1.0, 0.0, 0.0],
            vec![2.0, 3.0, 7.0],
            vec![0.0, 0.0, 7.0],
            vec![1.0, 0.0, 0.0],
        ])
        .expect("rows")
    }

    #[test]
    fn test_extract_single_column() {
        // Arrange
        let m = block();
        let source = ColumnSource::row_major(&m);

        // Act
        let bitmap = ColumnBitmap::extract(&source, &[0], None);

        // Assert
        assert_eq!(bitmap.num_values(), 2);
        assert_eq!(bitmap.values(), &[1.0, 2.0]);
        assert_eq!(bitmap.offsets(0), &[0, 1, 4]);
        assert_eq!(bitmap.offsets(1), &[2]);
        assert_eq!(bitmap.num_offsets(), 4);
        assert_eq!(bitmap.num_runs(), 3);
    }

    #[test]
    fn test_extract_column_pair_from_transposed() {
        let m = block();
        let t = m.transpose();
        let direct = ColumnBitmap::extract(&ColumnSource::row_major(&m), &[0, 2], None);
        let via_t = ColumnBitmap::extract(&ColumnSource::transposed(&t), &[0, 2], None);

        assert_eq!(direct, via_t);
        // (1,7) (1,0) (2,7) (0,7); row 4 repeats (1,0)
        assert_eq!(direct.num_values(), 4);
        assert_eq!(direct.offsets(1), &[1, 4]);
    }

    #[test]
    fn test_extract_sample_keeps_row_ids() {
        let m = block();
        let source = ColumnSource::row_major(&m);

        let bitmap = ColumnBitmap::extract(&source, &[2], Some(&[1, 3, 4]));

        assert_eq!(bitmap.num_values(), 1);
        assert_eq!(bitmap.offsets(0), &[3]);
    }

    #[test]
    fn test_column_nnz_both_orientations() {
        let m = block();
        let t = m.transpose();
        assert_eq!(ColumnSource::row_major(&m).column_nnz(2), 3);
        assert_eq!(ColumnSource::transposed(&t).column_nnz(2), 3);
        assert_eq!(ColumnSource::transposed(&t).rows(), 5);
    }

    #[test]
    fn test_count_runs() {
        assert_eq!(count_runs(&[]), 0);
        assert_eq!(count_runs(&[4]), 1);
        assert_eq!(count_runs(&[1, 2, 3, 7, 8, 10]), 3);
    }
}
