//! Bitmap column groups: per-tuple row lists under a pluggable encoding.
//!
//! [`BitmapGroup`] holds the columns and the tuple dictionary; the
//! [`OffsetEncoding`] parameter decides how each tuple's rows are stored
//! (offset lists or run lengths). All operators are written once against
//! [`OffsetEncoding::for_each_run`].

use std::fmt::Debug;

use super::aggregate::AggregateBuffer;
use super::bitmap::ColumnBitmap;
use super::dictionary::Dictionary;
use super::EncodingKind;
use crate::error::{Error, Result};
use crate::operators::{IndexFunction, ScalarOperator};
use crate::parallel::with_scratch;

/// Storage of the sorted row lists of every tuple.
pub trait OffsetEncoding: Clone + Debug + PartialEq + Send + Sync {
    /// Encoding tag.
    const KIND: EncodingKind;

    /// Encodes sorted, cross-tuple disjoint row lists.
    fn encode(offsets: &[Vec<u32>], rows: usize) -> Self;

    /// Rebuilds from the raw arrays of [`Self::ptr`] and [`Self::data`].
    fn from_raw(ptr: Vec<u32>, data: Vec<u16>) -> Self;

    /// Start of each tuple's slice in `data`, plus a final end marker.
    fn ptr(&self) -> &[u32];

    /// Encoded payload.
    fn data(&self) -> &[u16];

    /// Calls `f(start, end)` for each run of tuple `k` clipped to `rl..ru`.
    fn for_each_run(&self, k: usize, rl: usize, ru: usize, f: impl FnMut(usize, usize));

    /// Checks the payload structure against the row count.
    ///
    /// # Errors
    ///
    /// Returns `Deserialization` describing the first inconsistency.
    fn validate(&self, rows: usize) -> Result<()>;

    /// Number of encoded tuples.
    fn num_values(&self) -> usize {
        self.ptr().len().saturating_sub(1)
    }
}

/// Checks that `ptr` is a monotone index into `data` covering all of it.
pub(crate) fn validate_ptr(ptr: &[u32], data_len: usize) -> Result<()> {
    if ptr.first().copied().unwrap_or(0) != 0 {
        return Err(Error::Deserialization("bitmap pointer must start at 0".into()));
    }
    if ptr.windows(2).any(|w| w[0] > w[1]) {
        return Err(Error::Deserialization("bitmap pointers are not monotone".into()));
    }
    if ptr.last().map_or(0, |&p| p as usize) != data_len {
        return Err(Error::Deserialization(format!(
            "bitmap pointer end does not match payload length {data_len}"
        )));
    }
    Ok(())
}

/// Column group storing, per distinct tuple, the rows that hold it.
///
/// Rows not listed under any tuple are zero in every column of the group.
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapGroup<E> {
    columns: Vec<usize>,
    rows: usize,
    dict: Dictionary,
    encoding: E,
}

impl<E: OffsetEncoding> BitmapGroup<E> {
    /// Encodes a full-row bitmap.
    #[must_use]
    pub fn from_bitmap(columns: Vec<usize>, rows: usize, bitmap: ColumnBitmap) -> Self {
        let (values, offsets) = bitmap.into_parts();
        Self {
            columns,
            rows,
            dict: Dictionary::new(values),
            encoding: E::encode(&offsets, rows),
        }
    }

    /// Assembles a group from decoded parts.
    ///
    /// # Errors
    ///
    /// Returns `Deserialization` if the dictionary and payload disagree.
    pub fn from_parts(columns: Vec<usize>, rows: usize, dict: Dictionary, encoding: E) -> Result<Self> {
        let nv = dict.num_tuples(columns.len());
        if encoding.num_values() != nv || dict.len() != nv * columns.len() {
            return Err(Error::Deserialization(format!(
                "{:?} group has {} dictionary values for {} encoded tuples",
                E::KIND,
                dict.len(),
                encoding.num_values()
            )));
        }
        encoding.validate(rows)?;
        Ok(Self {
            columns,
            rows,
            dict,
            encoding,
        })
    }

    /// Column indices.
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Row count.
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.rows
    }

    /// Tuple dictionary.
    #[must_use]
    pub const fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    /// Row-list encoding.
    #[must_use]
    pub const fn encoding(&self) -> &E {
        &self.encoding
    }

    /// Number of distinct tuples.
    #[must_use]
    pub fn num_values(&self) -> usize {
        self.encoding.num_values()
    }

    /// Same payload under new column indices.
    #[must_use]
    pub fn with_columns(&self, columns: Vec<usize>) -> Self {
        Self {
            columns,
            ..self.clone()
        }
    }

    /// Value at `row` of the group's `pos`-th column.
    #[must_use]
    pub fn get(&self, row: usize, pos: usize) -> f64 {
        let c = self.columns.len();
        for k in 0..self.num_values() {
            let mut hit = false;
            self.encoding.for_each_run(k, row, row + 1, |_, _| hit = true);
            if hit {
                return self.dict.tuple(k, c)[pos];
            }
        }
        0.0
    }

    pub(crate) fn for_each_nonzero(&self, rl: usize, ru: usize, mut f: impl FnMut(usize, usize, f64)) {
        let c = self.columns.len();
        for k in 0..self.num_values() {
            let tuple = self.dict.tuple(k, c);
            if tuple.iter().all(|x| *x == 0.0) {
                continue;
            }
            self.encoding.for_each_run(k, rl, ru, |s, e| {
                for r in s..e {
                    for (j, &x) in tuple.iter().enumerate() {
                        if x != 0.0 {
                            f(r, self.columns[j], x);
                        }
                    }
                }
            });
        }
    }

    pub(crate) fn count_nonzeros_per_row(&self, counts: &mut [usize], rl: usize, ru: usize) {
        let nnz = self.dict.tuple_nnz(self.columns.len());
        for (k, &n) in nnz.iter().enumerate() {
            if n == 0 {
                continue;
            }
            self.encoding.for_each_run(k, rl, ru, |s, e| {
                for count in &mut counts[s - rl..e - rl] {
                    *count += n;
                }
            });
        }
    }

    pub(crate) fn right_mult(&self, vector: &[f64], out: &mut [f64], rl: usize, ru: usize) {
        with_scratch(self.num_values(), |vals| {
            self.dict.dot_tuples(&self.columns, vector, vals);
            for (k, &v) in vals.iter().enumerate() {
                if v == 0.0 {
                    continue;
                }
                self.encoding.for_each_run(k, rl, ru, |s, e| {
                    for o in &mut out[s - rl..e - rl] {
                        *o += v;
                    }
                });
            }
        });
    }

    pub(crate) fn left_mult(&self, vector: &[f64], out: &mut [f64]) {
        let c = self.columns.len();
        with_scratch(self.num_values(), |sums| {
            for (k, sum) in sums.iter_mut().enumerate() {
                self.encoding
                    .for_each_run(k, 0, self.rows, |s, e| *sum += vector[s..e].iter().sum::<f64>());
            }
            for (k, &s) in sums.iter().enumerate() {
                if s == 0.0 {
                    continue;
                }
                for (j, &x) in self.dict.tuple(k, c).iter().enumerate() {
                    out[self.columns[j]] += s * x;
                }
            }
        });
    }

    /// Rows per tuple within `rl..ru`.
    fn value_counts(&self, rl: usize, ru: usize) -> Vec<usize> {
        (0..self.num_values())
            .map(|k| {
                let mut n = 0;
                self.encoding.for_each_run(k, rl, ru, |s, e| n += e - s);
                n
            })
            .collect()
    }

    pub(crate) fn aggregate(
        &self,
        buf: &mut AggregateBuffer,
        index: IndexFunction,
        rl: usize,
        ru: usize,
    ) {
        let c = self.columns.len();
        match index {
            IndexFunction::ReduceAll | IndexFunction::ReduceRow => {
                let counts = self.value_counts(rl, ru);
                let slot = |j: usize| {
                    if index == IndexFunction::ReduceAll {
                        0
                    } else {
                        self.columns[j]
                    }
                };
                for (k, &count) in counts.iter().enumerate() {
                    for (j, &x) in self.dict.tuple(k, c).iter().enumerate() {
                        buf.add(slot(j), x, count);
                    }
                }
                if counts.iter().sum::<usize>() < ru - rl {
                    for j in 0..c {
                        buf.fold_zero(slot(j));
                    }
                }
            }
            IndexFunction::ReduceCol => {
                for k in 0..self.num_values() {
                    let partial = AggregateBuffer::tuple_partial(buf.function(), self.dict.tuple(k, c));
                    self.encoding.for_each_run(k, rl, ru, |s, e| {
                        for r in s..e {
                            buf.add_partial(r - rl, partial);
                        }
                    });
                }
            }
        }
    }

    /// Decodes back into a full-row bitmap.
    #[must_use]
    pub fn to_bitmap(&self) -> ColumnBitmap {
        let offsets = (0..self.num_values())
            .map(|k| {
                let mut list = Vec::new();
                self.encoding.for_each_run(k, 0, self.rows, |s, e| {
                    #[allow(clippy::cast_possible_truncation)]
                    list.extend((s..e).map(|r| r as u32));
                });
                list
            })
            .collect();
        ColumnBitmap::from_parts(self.columns.len(), self.dict.values().to_vec(), offsets)
    }

    /// Applies `op` to every cell of the group.
    ///
    /// Sparse-safe operators only rewrite the dictionary. Otherwise the rows
    /// not listed under any tuple receive a new tuple `op(0)`.
    #[must_use]
    pub fn scalar_op(&self, op: &ScalarOperator) -> Self {
        if op.is_sparse_safe() {
            return Self {
                dict: self.dict.apply(op),
                ..self.clone()
            };
        }
        let c = self.columns.len();
        let (values, mut offsets) = self.to_bitmap().into_parts();
        let mut values: Vec<f64> = values.into_iter().map(|x| op.apply(x)).collect();
        let mut covered = vec![false; self.rows];
        for &r in offsets.iter().flatten() {
            covered[r as usize] = true;
        }
        #[allow(clippy::cast_possible_truncation)]
        let uncovered: Vec<u32> = (0..self.rows)
            .filter(|&r| !covered[r])
            .map(|r| r as u32)
            .collect();
        if !uncovered.is_empty() {
            values.extend(std::iter::repeat(op.apply(0.0)).take(c));
            offsets.push(uncovered);
        }
        Self::from_bitmap(
            self.columns.clone(),
            self.rows,
            ColumnBitmap::from_parts(c, values, offsets),
        )
    }

    /// Estimated in-memory size in bytes; an empty group costs nothing.
    #[must_use]
    pub fn size_in_memory(&self) -> usize {
        let nv = self.num_values();
        if nv == 0 {
            0
        } else {
            self.dict.size_in_memory() + 4 * (nv + 1) + 2 * self.encoding.data().len()
        }
    }
}
