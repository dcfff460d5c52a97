//! Run-length encoding (RLE).
//!
//! Each tuple's rows are stored as `(gap, length)` pairs of `u16`, where the
//! gap is measured from the end of the previous run. Gaps and runs longer
//! than `u16::MAX` are split; a `(u16::MAX, 0)` pair only advances the cursor.

use super::offset::{validate_ptr, BitmapGroup, OffsetEncoding};
use super::EncodingKind;
use crate::error::{Error, Result};

const MAX_PIECE: usize = u16::MAX as usize;

/// Run lists of all tuples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunList {
    ptr: Vec<u32>,
    data: Vec<u16>,
}

/// Run-length column group.
pub type RleGroup = BitmapGroup<RunList>;

#[allow(clippy::cast_possible_truncation)]
fn push_run(data: &mut Vec<u16>, mut gap: usize, mut len: usize) {
    while gap > MAX_PIECE {
        data.push(MAX_PIECE as u16);
        data.push(0);
        gap -= MAX_PIECE;
    }
    while len > MAX_PIECE {
        data.push(gap as u16);
        data.push(MAX_PIECE as u16);
        gap = 0;
        len -= MAX_PIECE;
    }
    data.push(gap as u16);
    data.push(len as u16);
}

impl OffsetEncoding for RunList {
    const KIND: EncodingKind = EncodingKind::RunLength;

    #[allow(clippy::cast_possible_truncation)]
    fn encode(offsets: &[Vec<u32>], _rows: usize) -> Self {
        let mut ptr = Vec::with_capacity(offsets.len() + 1);
        let mut data = Vec::new();
        ptr.push(0);
        for list in offsets {
            let mut cursor = 0usize;
            let mut i = 0;
            while i < list.len() {
                let start = list[i] as usize;
                let mut end = start + 1;
                i += 1;
                while i < list.len() && list[i] as usize == end {
                    end += 1;
                    i += 1;
                }
                push_run(&mut data, start - cursor, end - start);
                cursor = end;
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
        let mut cursor = 0usize;
        while pos + 1 < end {
            let start = cursor + self.data[pos] as usize;
            let stop = start + self.data[pos + 1] as usize;
            cursor = stop;
            pos += 2;
            if stop <= rl || start == stop {
                continue;
            }
            if start >= ru {
                break;
            }
            f(start.max(rl), stop.min(ru));
        }
    }

    fn validate(&self, rows: usize) -> Result<()> {
        validate_ptr(&self.ptr, self.data.len())?;
        for k in 0..self.num_values() {
            let (start, end) = (self.ptr[k] as usize, self.ptr[k + 1] as usize);
            if (end - start) % 2 != 0 {
                return Err(Error::Deserialization(format!(
                    "run list {k} has an odd number of entries"
                )));
            }
            let mut cursor = 0usize;
            for pair in self.data[start..end].chunks_exact(2) {
                let stop = cursor + pair[0] as usize + pair[1] as usize;
                if pair[1] > 0 && stop > rows {
                    return Err(Error::Deserialization(format!(
                        "run list {k} extends to row {stop} beyond {rows} rows"
                    )));
                }
                cursor = stop;
            }
        }
        Ok(())
    }
}
