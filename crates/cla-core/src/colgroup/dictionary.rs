//! Distinct-tuple dictionary shared by dictionary and bitmap encodings.

use std::sync::Arc;

use crate::operators::ScalarOperator;

/// Row-major table of distinct value tuples, one tuple per code.
///
/// Cloning is a reference-count bump; shared dictionaries are compared by
/// pointer with [`Dictionary::ptr_eq`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dictionary {
    values: Arc<[f64]>,
}

impl Dictionary {
    /// Wraps flattened tuples.
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// Flattened tuples.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of stored doubles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the dictionary holds no tuple.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of tuples for a group of `num_cols` columns.
    #[inline]
    #[must_use]
    pub fn num_tuples(&self, num_cols: usize) -> usize {
        if num_cols == 0 {
            0
        } else {
            self.values.len() / num_cols
        }
    }

    /// Tuple `k` of a group with `num_cols` columns.
    #[inline]
    #[must_use]
    pub fn tuple(&self, k: usize, num_cols: usize) -> &[f64] {
        &self.values[k * num_cols..(k + 1) * num_cols]
    }

    /// True if both handles point at the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    /// New dictionary with `op` applied to every value.
    #[must_use]
    pub fn apply(&self, op: &ScalarOperator) -> Self {
        Self::new(self.values.iter().map(|&x| op.apply(x)).collect())
    }

    /// Dot product of every tuple with `vector` gathered at `columns`.
    pub(crate) fn dot_tuples(&self, columns: &[usize], vector: &[f64], out: &mut [f64]) {
        let c = columns.len();
        for (k, slot) in out.iter_mut().enumerate().take(self.num_tuples(c)) {
            *slot = self
                .tuple(k, c)
                .iter()
                .zip(columns)
                .map(|(&v, &col)| v * vector[col])
                .sum();
        }
    }

    /// Non-zero count of every tuple.
    pub(crate) fn tuple_nnz(&self, num_cols: usize) -> Vec<usize> {
        (0..self.num_tuples(num_cols))
            .map(|k| self.tuple(k, num_cols).iter().filter(|x| **x != 0.0).count())
            .collect()
    }

    /// Size in bytes.
    #[must_use]
    pub fn size_in_memory(&self) -> usize {
        8 * self.values.len()
    }
}
