//! Binary format of an uncompressed block.
//!
//! ```text
//! [sparse: u8][rows: i32][cols: i32][nnz: i64]
//! dense:  rows*cols × f64
//! sparse: rows × ([len: i32] len × ([col: i32][value: f64]))
//! ```

use bytes::{Buf, BufMut};

use super::{MatrixBlock, SparseRow, Storage};
use crate::codec::{read_bool, read_f64, read_f64_vec, read_i64, read_len, wire_i32};
use crate::error::{Error, Result};

impl MatrixBlock {
    /// Appends the binary encoding of this block to `out`.
    pub(crate) fn write_to(&self, out: &mut impl BufMut) -> Result<()> {
        out.put_u8(u8::from(self.is_sparse()));
        out.put_i32(wire_i32(self.rows, "row count")?);
        out.put_i32(wire_i32(self.cols, "column count")?);
        #[allow(clippy::cast_possible_wrap)]
        out.put_i64(self.nnz as i64);
        match &self.storage {
            Storage::Dense(values) => {
                for &x in values {
                    out.put_f64(x);
                }
            }
            Storage::Sparse(rows) => {
                for row in rows {
                    out.put_i32(wire_i32(row.len(), "sparse row length")?);
                    for (c, x) in row.iter() {
                        out.put_i32(wire_i32(c, "column index")?);
                        out.put_f64(x);
                    }
                }
            }
        }
        Ok(())
    }

    /// Exact length of [`Self::write_to`] output.
    pub(crate) fn serialized_size(&self) -> usize {
        let header = 1 + 4 + 4 + 8;
        match &self.storage {
            Storage::Dense(values) => header + 8 * values.len(),
            Storage::Sparse(rows) => header + rows.iter().map(|r| 4 + 12 * r.len()).sum::<usize>(),
        }
    }

    /// Decodes a block written by [`Self::write_to`].
    pub(crate) fn read_from(buf: &mut impl Buf) -> Result<Self> {
        let sparse = read_bool(buf, "block layout flag")?;
        let rows = read_len(buf, "block rows")?;
        let cols = read_len(buf, "block columns")?;
        let declared_nnz = read_i64(buf, "block nnz")?;
        let block = if sparse {
            let mut data = Vec::with_capacity(rows);
            for _ in 0..rows {
                let len = read_len(buf, "sparse row length")?;
                let mut row = SparseRow::with_capacity(len.min(cols));
                for _ in 0..len {
                    let c = read_len(buf, "column index")?;
                    if c >= cols {
                        return Err(Error::Deserialization(format!(
                            "column index {c} out of range for {cols} columns"
                        )));
                    }
                    row.append(c, read_f64(buf, "sparse value")?);
                }
                row.sort();
                data.push(row);
            }
            Self::from_sparse_rows(rows, cols, data)
        } else {
            let values = read_f64_vec(buf, rows * cols, "dense values")?;
            Self::from_dense(rows, cols, values)?
        };
        if i64::try_from(block.nnz).ok() != Some(declared_nnz) {
            return Err(Error::Deserialization(format!(
                "block nnz mismatch: header says {declared_nnz}, payload has {}",
                block.nnz
            )));
        }
        Ok(block)
    }
}
