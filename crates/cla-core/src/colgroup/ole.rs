//! Offset-list encoding (OLE).
//!
//! Rows are split into blocks of [`BITMAP_BLOCK_SZ`]. For every tuple and
//! every block the payload holds one segment `[len, off_1, ..., off_len]`
//! with offsets relative to the block start, so scans can skip whole blocks.

use super::offset::{validate_ptr, BitmapGroup, OffsetEncoding};
use super::{EncodingKind, BITMAP_BLOCK_SZ};
use crate::error::{Error, Result};

/// Blocked offset lists of all tuples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OffsetList {
    ptr: Vec<u32>,
    data: Vec<u16>,
}

/// Offset-list column group.
pub type OleGroup = BitmapGroup<OffsetList>;

/// Number of row blocks for `rows` rows.
#[must_use]
pub fn num_blocks(rows: usize) -> usize {
    rows.div_ceil(BITMAP_BLOCK_SZ)
}

impl OffsetEncoding for OffsetList {
    const KIND: EncodingKind = EncodingKind::OffsetList;

    #[allow(clippy::cast_possible_truncation)]
    fn encode(offsets: &[Vec<u32>], rows: usize) -> Self {
        let blocks = num_blocks(rows);
        let mut ptr = Vec::with_capacity(offsets.len() + 1);
        let mut data = Vec::new();
        ptr.push(0);
        for list in offsets {
            let mut i = 0;
            for b in 0..blocks {
                let base = b * BITMAP_BLOCK_SZ;
                let end = base + BITMAP_BLOCK_SZ;
                let len_pos = data.len();
                data.push(0);
                while i < list.len() && (list[i] as usize) < end {
                    data.push((list[i] as usize - base) as u16);
                    i += 1;
                }
                data[len_pos] = (data.len() - len_pos - 1) as u16;
            }
            ptr.push(data.len() as u32);
        }
        Self { ptr, data }
    }

    fn from_raw(ptr: Vec<u32>, data: Vec<u16>) -> Self {
        Self { ptr, data }
    }

    fn ptr(&self) -> &[u32] {
        &self.ptr
    }

    fn data(&self) -> &[u16] {
        &self.data
    }

    fn for_each_run(&self, k: usize, rl: usize, ru: usize, mut f: impl FnMut(usize, usize)) {
        let end = self.ptr[k + 1] as usize;
        let mut pos = self.ptr[k] as usize;
        let mut base = 0;
        while pos < end && base < ru {
            let len = self.data[pos] as usize;
            if base + BITMAP_BLOCK_SZ > rl {
                for &off in &self.data[pos + 1..pos + 1 + len] {
                    let row = base + off as usize;
                    if row >= ru {
                        break;
                    }
                    if row >= rl {
                        f(row, row + 1);
                    }
                }
            }
            pos += 1 + len;
            base += BITMAP_BLOCK_SZ;
        }
    }

    fn validate(&self, rows: usize) -> Result<()> {
        validate_ptr(&self.ptr, self.data.len())?;
        let blocks = num_blocks(rows);
        for k in 0..self.num_values() {
            let end = self.ptr[k + 1] as usize;
            let mut pos = self.ptr[k] as usize;
            for b in 0..blocks {
                if pos >= end {
                    return Err(Error::Deserialization(format!(
                        "offset list {k} is missing block {b}"
                    )));
                }
                let len = self.data[pos] as usize;
                let segment = self
                    .data
                    .get(pos + 1..pos + 1 + len)
                    .filter(|_| pos + 1 + len <= end)
                    .ok_or_else(|| {
                        Error::Deserialization(format!("offset list {k} block {b} overruns payload"))
                    })?;
                let base = b * BITMAP_BLOCK_SZ;
                if segment.windows(2).any(|w| w[0] >= w[1])
                    || segment
                        .last()
                        .is_some_and(|&o| o as usize >= BITMAP_BLOCK_SZ || base + o as usize >= rows)
                {
                    return Err(Error::Deserialization(format!(
                        "offset list {k} block {b} has unsorted or out-of-range offsets"
                    )));
                }
                pos += 1 + len;
            }
            if pos != end {
                return Err(Error::Deserialization(format!(
                    "offset list {k} has trailing data"
                )));
            }
        }
        Ok(())
    }
}
