//! The compressed matrix: lifecycle, operator dispatch, and persistence.
//!
//! A [`CompressedMatrix`] starts out wrapping a plain [`MatrixBlock`]. A
//! successful [`CompressedMatrix::compress`] replaces it with a list of
//! column groups that cover every column exactly once. After that the group
//! list is frozen: operators only read it, and operators that produce a new
//! compressed result build a new matrix. Rows can also be streamed out
//! block by block through [`CompressedMatrix::row_iter`].

mod compress;
mod iter;
mod ops;
mod serialize;
mod shared;


use std::sync::Arc;

use crate::colgroup::{ColumnGroup, Dictionary};
use crate::error::{Error, Result};
use crate::matrix::MatrixBlock;
use crate::stats::CompressionStats;

pub use compress::CompressionOutcome;
pub use iter::{CellIter, MatrixRow, RowFormat, RowIter};

#[derive(Debug, Clone)]
enum State {
    Uncompressed(Arc<MatrixBlock>),
    Compressed {
        groups: Vec<Arc<ColumnGroup>>,
        shared_dictionary_active: bool,
    },
}

/// A matrix that is either plain or stored as compressed column groups.
#[derive(Debug, Clone)]
pub struct CompressedMatrix {
    rows: usize,
    cols: usize,
    nnz: usize,
    state: State,
    stats: Option<CompressionStats>,
}

impl CompressedMatrix {
    /// Wraps an uncompressed matrix.
    #[must_use]
    pub fn new(block: MatrixBlock) -> Self {
        Self::from_shared(Arc::new(block))
    }

    /// Wraps a shared uncompressed matrix without copying it.
    #[must_use]
    pub fn from_shared(block: Arc<MatrixBlock>) -> Self {
        Self {
            rows: block.rows(),
            cols: block.cols(),
            nnz: block.nnz(),
            state: State::Uncompressed(block),
            stats: None,
        }
    }

    /// Assembles a compressed matrix from groups, checking that they cover
    /// every column exactly once and agree on the row count.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnGroup` if the groups do not form a disjoint cover.
    pub fn from_groups(
        rows: usize,
        cols: usize,
        nnz: usize,
        groups: Vec<Arc<ColumnGroup>>,
        shared_dictionary_active: bool,
    ) -> Result<Self> {
        check_disjoint_cover(rows, cols, &groups)?;
        Ok(Self {
            rows,
            cols,
            nnz,
            state: State::Compressed {
                groups,
                shared_dictionary_active,
            },
            stats: None,
        })
    }

    /// Row count.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Column count.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Non-zero count as tracked by the last operation.
    #[must_use]
    pub const fn nnz(&self) -> usize {
        self.nnz
    }

    /// True once [`Self::compress`] has succeeded.
    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        matches!(self.state, State::Compressed { .. })
    }

    /// Whether single-column DDC groups share one dictionary.
    #[must_use]
    pub const fn shared_dictionary_active(&self) -> bool {
        match &self.state {
            State::Compressed {
                shared_dictionary_active,
                ..
            } => *shared_dictionary_active,
            State::Uncompressed(_) => false,
        }
    }

    /// Column groups, empty while uncompressed.
    #[must_use]
    pub fn column_groups(&self) -> &[Arc<ColumnGroup>] {
        match &self.state {
            State::Compressed { groups, .. } => groups,
            State::Uncompressed(_) => &[],
        }
    }

    /// The wrapped plain matrix, while uncompressed.
    #[must_use]
    pub fn uncompressed(&self) -> Option<&MatrixBlock> {
        match &self.state {
            State::Uncompressed(block) => Some(block),
            State::Compressed { .. } => None,
        }
    }

    /// Statistics of the last `compress()` call.
    #[must_use]
    pub const fn stats(&self) -> Option<&CompressionStats> {
        self.stats.as_ref()
    }

    /// Estimated in-memory size in bytes. A shared dictionary is billed once.
    #[must_use]
    pub fn in_memory_size(&self) -> usize {
        match &self.state {
            State::Uncompressed(block) => block.size_in_memory(),
            State::Compressed { groups, .. } => groups_size(groups.iter().map(AsRef::as_ref)),
        }
    }

    /// Non-zero count of every row, summed over all groups.
    #[must_use]
    pub fn count_nonzeros_per_row(&self) -> Vec<usize> {
        let mut counts = vec![0; self.rows];
        match &self.state {
            State::Uncompressed(block) => {
                for (r, count) in counts.iter_mut().enumerate() {
                    *count = block.row_nnz(r);
                }
            }
            State::Compressed { groups, .. } => {
                for g in groups {
                    g.count_nonzeros_per_row(&mut counts, 0, self.rows);
                }
            }
        }
        counts
    }

    /// The plain matrix operators can delegate to: the uncompressed input, or
    /// the block of a single uncompressed group spanning every column.
    fn fallback_block(&self) -> Option<&MatrixBlock> {
        match &self.state {
            State::Uncompressed(block) => Some(block),
            State::Compressed { groups, .. } => match groups.as_slice() {
                [only] => match only.as_ref() {
                    ColumnGroup::Uncompressed(g) if g.columns().len() == self.cols => Some(g.data()),
                    _ => None,
                },
                _ => None,
            },
        }
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }
}

/// Sum of group sizes with every distinct dictionary allocation billed once.
pub(crate) fn groups_size<'a>(groups: impl Iterator<Item = &'a ColumnGroup>) -> usize {
    let mut seen: Vec<&'a Dictionary> = Vec::new();
    let mut total = 0;
    for g in groups {
        total += g.size_in_memory();
        if let Some(dict) = g.dictionary() {
            if seen.iter().any(|d| d.ptr_eq(dict)) {
                total -= dict.size_in_memory();
            } else {
                seen.push(dict);
            }
        }
    }
    total
}

fn check_disjoint_cover(rows: usize, cols: usize, groups: &[Arc<ColumnGroup>]) -> Result<()> {
    let mut covered = vec![false; cols];
    for g in groups {
        if g.num_rows() != rows {
            return Err(Error::InvalidColumnGroup(format!(
                "{} group has {} rows, matrix has {rows}",
                g.kind(),
                g.num_rows()
            )));
        }
        for &c in g.columns() {
            match covered.get_mut(c) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(Error::InvalidColumnGroup(format!(
                        "column {c} belongs to more than one group"
                    )))
                }
                None => {
                    return Err(Error::InvalidColumnGroup(format!(
                        "column {c} out of range for {cols} columns"
                    )))
                }
            }
        }
    }
    if let Some(missing) = covered.iter().position(|c| !c) {
        return Err(Error::InvalidColumnGroup(format!(
            "column {missing} is not covered by any group"
        )));
    }
    Ok(())
}
