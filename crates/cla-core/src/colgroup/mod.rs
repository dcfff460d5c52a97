//! Column groups: disjoint column subsets stored under one encoding.
//!
//! [`ColumnGroup`] is a closed enum over the four encodings. Every numeric
//! operator the engine needs is dispatched here with an exhaustive `match`,
//! so adding an encoding forces every operator and the wire tag to be handled.

mod aggregate;
mod bitmap;
mod ddc;
mod dictionary;
mod io;
mod offset;
mod ole;
mod rle;
mod uncompressed;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matrix::SparseRow;
use crate::operators::{IndexFunction, ScalarOperator};

pub use aggregate::AggregateBuffer;
pub use bitmap::{ColumnBitmap, ColumnSource};
pub use ddc::{Codes, DdcGroup, MAX_BYTE_VALUES, MAX_SHORT_VALUES};
pub use dictionary::Dictionary;
pub use offset::{BitmapGroup, OffsetEncoding};
pub use ole::{num_blocks, OffsetList, OleGroup};
pub use rle::{RleGroup, RunList};
pub use uncompressed::UncompressedGroup;

pub(crate) use bitmap::count_runs;
pub(crate) use ddc::value_key;
pub(crate) use io::SharedDictionarySlot;

/// Rows per offset-list block. Offsets inside a block fit in a `u16`.
pub const BITMAP_BLOCK_SZ: usize = 1 << 15;

/// Encoding of a column group, with its stable wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncodingKind {
    /// Plain matrix block.
    Uncompressed = 0,
    /// Run-length bitmap.
    RunLength = 1,
    /// Offset-list bitmap.
    OffsetList = 2,
    /// Dictionary codes, one byte per row.
    Ddc8 = 3,
    /// Dictionary codes, two bytes per row.
    Ddc16 = 4,
}

impl EncodingKind {
    /// All kinds in tag order.
    pub const ALL: [Self; 5] = [
        Self::Uncompressed,
        Self::RunLength,
        Self::OffsetList,
        Self::Ddc8,
        Self::Ddc16,
    ];

    /// Wire tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    ///
    /// # Errors
    ///
    /// Returns `Deserialization` for an unknown tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.tag() == tag)
            .ok_or_else(|| Error::Deserialization(format!("unknown column group type tag {tag}")))
    }

    /// Short display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uncompressed => "UNCOMPRESSED",
            Self::RunLength => "RLE",
            Self::OffsetList => "OLE",
            Self::Ddc8 => "DDC8",
            Self::Ddc16 => "DDC16",
        }
    }
}

impl std::fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of columns stored under one encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnGroup {
    /// Raw storage.
    Uncompressed(UncompressedGroup),
    /// Dense dictionary codes (byte or short).
    Ddc(DdcGroup),
    /// Offset-list bitmap.
    OffsetList(OleGroup),
    /// Run-length bitmap.
    RunLength(RleGroup),
}

macro_rules! dispatch {
    ($self:expr, $g:ident => $body:expr) => {
        match $self {
            ColumnGroup::Uncompressed($g) => $body,
            ColumnGroup::Ddc($g) => $body,
            ColumnGroup::OffsetList($g) => $body,
            ColumnGroup::RunLength($g) => $body,
        }
    };
}

impl ColumnGroup {
    /// Sorted column indices covered by this group.
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        dispatch!(self, g => g.columns())
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns().len()
    }

    /// Row count.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        dispatch!(self, g => g.num_rows())
    }

    /// Encoding tag.
    #[must_use]
    pub fn kind(&self) -> EncodingKind {
        match self {
            Self::Uncompressed(_) => EncodingKind::Uncompressed,
            Self::Ddc(g) => g.kind(),
            Self::OffsetList(_) => EncodingKind::OffsetList,
            Self::RunLength(_) => EncodingKind::RunLength,
        }
    }

    /// Distinct tuples in the dictionary, 0 for uncompressed groups.
    #[must_use]
    pub fn num_values(&self) -> usize {
        match self {
            Self::Uncompressed(_) => 0,
            Self::Ddc(g) => g.num_values(),
            Self::OffsetList(g) => g.num_values(),
            Self::RunLength(g) => g.num_values(),
        }
    }

    /// Position of a global column inside this group.
    #[must_use]
    pub fn position_of(&self, col: usize) -> Option<usize> {
        self.columns().binary_search(&col).ok()
    }

    /// Value at (`row`, global `col`), or 0 if the column is not in this group.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.position_of(col)
            .map_or(0.0, |pos| dispatch!(self, g => g.get(row, pos)))
    }

    /// Calls `f(row, global_col, value)` for every non-zero in rows `rl..ru`.
    pub fn for_each_nonzero(&self, rl: usize, ru: usize, f: impl FnMut(usize, usize, f64)) {
        dispatch!(self, g => g.for_each_nonzero(rl, ru, f));
    }

    /// Writes rows `rl..ru` into a row-major dense slice with `out_cols` columns.
    pub fn decompress_to_dense(&self, out: &mut [f64], out_cols: usize, rl: usize, ru: usize) {
        self.for_each_nonzero(rl, ru, |r, c, x| out[(r - rl) * out_cols + c] = x);
    }

    /// Appends rows `rl..ru` to pre-sized sparse rows (unsorted across groups).
    pub fn decompress_to_sparse(&self, rows: &mut [SparseRow], rl: usize, ru: usize) {
        self.for_each_nonzero(rl, ru, |r, c, x| rows[r - rl].append(c, x));
    }

    /// Writes the full global column `col` into `out` (length = rows).
    pub fn decompress_column(&self, col: usize, out: &mut [f64]) {
        out.fill(0.0);
        if self.position_of(col).is_none() {
            return;
        }
        self.for_each_nonzero(0, self.num_rows(), |r, c, x| {
            if c == col {
                out[r] = x;
            }
        });
    }

    /// Adds the non-zero count of each row `rl..ru` into `counts`.
    pub fn count_nonzeros_per_row(&self, counts: &mut [usize], rl: usize, ru: usize) {
        dispatch!(self, g => g.count_nonzeros_per_row(counts, rl, ru));
    }

    /// Total non-zeros.
    #[must_use]
    pub fn nnz(&self) -> usize {
        let rows = self.num_rows();
        let mut counts = vec![0; rows];
        self.count_nonzeros_per_row(&mut counts, 0, rows);
        counts.iter().sum()
    }

    /// Contributes `X[rl..ru, cols] · vector[cols]` into `out[0..ru-rl]`.
    ///
    /// Compressed groups add; the uncompressed group overwrites and must run
    /// first.
    pub fn right_mult(&self, vector: &[f64], out: &mut [f64], rl: usize, ru: usize) {
        dispatch!(self, g => g.right_mult(vector, out, rl, ru));
    }

    /// Adds `vector · X[:, cols]` into `out` (indexed by global column).
    pub fn left_mult(&self, vector: &[f64], out: &mut [f64]) {
        dispatch!(self, g => g.left_mult(vector, out));
    }

    /// Folds rows `rl..ru` of this group into `buf`.
    ///
    /// Slots: 0 for `ReduceAll`, global column for `ReduceRow`, `row - rl`
    /// for `ReduceCol`.
    pub fn aggregate(&self, buf: &mut AggregateBuffer, index: IndexFunction, rl: usize, ru: usize) {
        dispatch!(self, g => g.aggregate(buf, index, rl, ru));
    }

    /// Applies `op` to every cell of the group.
    #[must_use]
    pub fn scalar_op(&self, op: &ScalarOperator) -> Self {
        match self {
            Self::Uncompressed(g) => Self::Uncompressed(g.scalar_op(op)),
            Self::Ddc(g) => Self::Ddc(g.scalar_op(op)),
            Self::OffsetList(g) => Self::OffsetList(g.scalar_op(op)),
            Self::RunLength(g) => Self::RunLength(g.scalar_op(op)),
        }
    }

    /// Same payload with every column index moved by `offset`.
    #[must_use]
    pub fn shift_columns(&self, offset: usize) -> Self {
        let columns: Vec<usize> = self.columns().iter().map(|c| c + offset).collect();
        match self {
            Self::Uncompressed(g) => Self::Uncompressed(g.with_columns(columns)),
            Self::Ddc(g) => Self::Ddc(g.with_columns(columns)),
            Self::OffsetList(g) => Self::OffsetList(g.with_columns(columns)),
            Self::RunLength(g) => Self::RunLength(g.with_columns(columns)),
        }
    }

    /// Estimated in-memory size in bytes.
    #[must_use]
    pub fn size_in_memory(&self) -> usize {
        dispatch!(self, g => g.size_in_memory())
    }

    /// Dictionary of a compressed group.
    #[must_use]
    pub fn dictionary(&self) -> Option<&Dictionary> {
        match self {
            Self::Uncompressed(_) => None,
            Self::Ddc(g) => Some(g.dictionary()),
            Self::OffsetList(g) => Some(g.dictionary()),
            Self::RunLength(g) => Some(g.dictionary()),
        }
    }

    /// The DDC payload, if this is a DDC group.
    #[must_use]
    pub const fn as_ddc(&self) -> Option<&DdcGroup> {
        match self {
            Self::Ddc(g) => Some(g),
            _ => None,
        }
    }

    /// True for single-column byte-coded DDC groups, the candidates for a shared dictionary.
    #[must_use]
    pub fn is_single_column_ddc8(&self) -> bool {
        self.kind() == EncodingKind::Ddc8 && self.num_columns() == 1
    }
}
