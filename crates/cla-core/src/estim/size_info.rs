//! Encoding size formulas and per-column-set estimates.

use serde::Serialize;

use crate::colgroup::{num_blocks, ColumnBitmap, EncodingKind, MAX_BYTE_VALUES, MAX_SHORT_VALUES};
use crate::matrix::MatrixBlock;

/// Statistics of one column set that drive the encoding size formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EstimationFactors {
    /// Columns in the set.
    pub num_cols: usize,
    /// Rows of the input.
    pub num_rows: usize,
    /// Distinct non-zero tuples.
    pub num_values: usize,
    /// Rows holding a non-zero tuple.
    pub num_offsets: usize,
    /// Maximal runs of consecutive rows sharing a tuple.
    pub num_runs: usize,
    /// Non-zero cells over all columns of the set.
    pub nnz: usize,
}

impl EstimationFactors {
    /// Exact factors of a full-row bitmap.
    #[must_use]
    pub fn from_bitmap(bitmap: &ColumnBitmap, num_rows: usize) -> Self {
        let c = bitmap.num_cols();
        let nnz = (0..bitmap.num_values())
            .map(|k| {
                let tuple = &bitmap.values()[k * c..(k + 1) * c];
                tuple.iter().filter(|x| **x != 0.0).count() * bitmap.offsets(k).len()
            })
            .sum();
        Self {
            num_cols: c,
            num_rows,
            num_values: bitmap.num_values(),
            num_offsets: bitmap.num_offsets(),
            num_runs: bitmap.num_runs(),
            nnz,
        }
    }

    /// True if some rows hold the all-zero tuple.
    #[must_use]
    pub const fn has_zero_rows(&self) -> bool {
        self.num_offsets < self.num_rows
    }

    /// DDC kind and size, or `None` if there are too many tuples for 16-bit codes.
    #[must_use]
    pub fn ddc_size(&self) -> Option<(EncodingKind, usize)> {
        let tuples = self.num_values + usize::from(self.has_zero_rows());
        let (kind, width) = if tuples <= MAX_BYTE_VALUES {
            (EncodingKind::Ddc8, 1)
        } else if tuples <= MAX_SHORT_VALUES {
            (EncodingKind::Ddc16, 2)
        } else {
            return None;
        };
        Some((kind, 8 * tuples * self.num_cols + width * self.num_rows))
    }

    /// Offset-list size: dictionary, pointers, one header per tuple and block, one entry per offset.
    #[must_use]
    pub fn ole_size(&self) -> usize {
        if self.num_values == 0 {
            return 0;
        }
        let data = self.num_offsets + self.num_values * num_blocks(self.num_rows);
        8 * self.num_values * self.num_cols + 4 * (self.num_values + 1) + 2 * data
    }

    /// Run-length size: dictionary, pointers, two `u16` per run.
    #[must_use]
    pub fn rle_size(&self) -> usize {
        if self.num_values == 0 {
            return 0;
        }
        8 * self.num_values * self.num_cols + 4 * (self.num_values + 1) + 4 * self.num_runs
    }

    /// Size of the set stored as a plain matrix block.
    #[must_use]
    pub fn uncompressed_size(&self) -> usize {
        MatrixBlock::estimate_size_in_memory(self.num_rows, self.num_cols, self.nnz)
    }
}

/// Candidate encodings of one column set with their sizes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedSizeInfo {
    factors: EstimationFactors,
    candidates: Vec<(EncodingKind, usize)>,
}

impl CompressedSizeInfo {
    /// Evaluates every allowed encoding.
    #[must_use]
    pub fn new(factors: EstimationFactors, allow_ddc: bool) -> Self {
        let mut candidates = Vec::with_capacity(3);
        if allow_ddc {
            if let Some(ddc) = factors.ddc_size() {
                candidates.push(ddc);
            }
        }
        candidates.push((EncodingKind::OffsetList, factors.ole_size()));
        candidates.push((EncodingKind::RunLength, factors.rle_size()));
        Self {
            factors,
            candidates,
        }
    }

    /// Underlying statistics.
    #[must_use]
    pub const fn factors(&self) -> &EstimationFactors {
        &self.factors
    }

    /// Estimated distinct non-zero tuples.
    #[must_use]
    pub const fn cardinality(&self) -> usize {
        self.factors.num_values
    }

    /// Size of one encoding, if it was a candidate.
    #[must_use]
    pub fn size_of(&self, kind: EncodingKind) -> Option<usize> {
        self.candidates
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|&(_, s)| s)
    }

    /// Cheapest candidate; ties go to the earlier of DDC, OLE, RLE.
    #[must_use]
    pub fn best(&self) -> (EncodingKind, usize) {
        self.candidates
            .iter()
            .copied()
            .min_by_key(|&(_, s)| s)
            .unwrap_or((EncodingKind::Uncompressed, self.factors.uncompressed_size()))
    }

    /// Size of the cheapest candidate.
    #[must_use]
    pub fn min_size(&self) -> usize {
        self.best().1
    }

    /// Uncompressed over best compressed size; infinite for an empty set.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        ratio(self.factors.uncompressed_size(), self.min_size())
    }
}

/// `uncompressed / compressed`, infinite when nothing needs storing.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn ratio(uncompressed: usize, compressed: usize) -> f64 {
    if compressed == 0 {
        f64::INFINITY
    } else {
        uncompressed as f64 / compressed as f64
    }
}
