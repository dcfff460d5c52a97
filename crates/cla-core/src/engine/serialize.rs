//! Binary format of a whole matrix.
//!
//! ```text
//! [compressed: bool]
//! compressed:   [rows: i32][cols: i32][nnz: i64][shared_dict: bool][count: i32] count × group
//! uncompressed: block in the matrix block format
//! ```
//!
//! All integers are big-endian.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use bytes::{Buf, BufMut};
use tracing::debug;

use super::{CompressedMatrix, State};
use crate::codec::{read_bool, read_i64, read_len, wire_i32};
use crate::colgroup::{ColumnGroup, SharedDictionarySlot};
use crate::error::{Error, Result};
use crate::matrix::MatrixBlock;

impl CompressedMatrix {
    /// Appends the binary encoding of this matrix to `out`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` if a dimension does not fit the wire
    /// integer width.
    pub fn write_to(&self, out: &mut impl BufMut) -> Result<()> {
        match &self.state {
            State::Uncompressed(block) => {
                out.put_u8(0);
                block.write_to(out)
            }
            State::Compressed {
                groups,
                shared_dictionary_active,
            } => {
                out.put_u8(1);
                out.put_i32(wire_i32(self.rows, "row count")?);
                out.put_i32(wire_i32(self.cols, "column count")?);
                out.put_i64(
                    i64::try_from(self.nnz)
                        .map_err(|_| Error::unsupported(format!("nnz {} exceeds i64", self.nnz)))?,
                );
                out.put_u8(u8::from(*shared_dictionary_active));
                out.put_i32(wire_i32(groups.len(), "group count")?);
                let mut slot = SharedDictionarySlot::new(*shared_dictionary_active);
                for g in groups {
                    g.write_to(out, &mut slot)?;
                }
                Ok(())
            }
        }
    }

    /// Decodes a matrix written by [`Self::write_to`].
    ///
    /// # Errors
    ///
    /// Returns `Deserialization` on a truncated or inconsistent payload,
    /// including groups that do not cover every column exactly once.
    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        if !read_bool(buf, "compressed flag")? {
            return Ok(Self::new(MatrixBlock::read_from(buf)?));
        }
        let rows = read_len(buf, "row count")?;
        let cols = read_len(buf, "column count")?;
        let raw_nnz = read_i64(buf, "nnz")?;
        let nnz = usize::try_from(raw_nnz)
            .map_err(|_| Error::Deserialization(format!("negative nnz: {raw_nnz}")))?;
        let shared = read_bool(buf, "shared dictionary flag")?;
        let count = read_len(buf, "group count")?;

        let mut slot = SharedDictionarySlot::new(shared);
        let mut groups = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            groups.push(Arc::new(ColumnGroup::read_from(buf, &mut slot)?));
        }
        Self::from_groups(rows, cols, nnz, groups, shared).map_err(|e| match e {
            Error::InvalidColumnGroup(msg) => Error::Deserialization(msg),
            other => other,
        })
    }

    /// Serializes into a fresh buffer of exactly [`Self::exact_size_on_disk`] bytes.
    ///
    /// # Errors
    ///
    /// See [`Self::write_to`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.exact_size_on_disk());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Decodes a matrix from a complete buffer.
    ///
    /// # Errors
    ///
    /// Returns `Deserialization` on malformed input or trailing bytes.
    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        let matrix = Self::read_from(&mut data)?;
        if data.has_remaining() {
            return Err(Error::Deserialization(format!(
                "{} trailing bytes after matrix",
                data.remaining()
            )));
        }
        Ok(matrix)
    }

    /// Writes the binary encoding to `path`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path.as_ref(), &bytes)?;
        debug!(path = %path.as_ref().display(), bytes = bytes.len(), "matrix written");
        Ok(())
    }

    /// Reads a matrix written by [`Self::write_file`].
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `Deserialization` if its
    /// content is malformed.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        debug!(path = %path.as_ref().display(), bytes = bytes.len(), "matrix read");
        Self::from_bytes(&bytes)
    }

    /// Exact length of the binary encoding in bytes.
    #[must_use]
    pub fn exact_size_on_disk(&self) -> usize {
        match &self.state {
            State::Uncompressed(block) => 1 + block.serialized_size(),
            State::Compressed {
                groups,
                shared_dictionary_active,
            } => {
                let mut slot = SharedDictionarySlot::new(*shared_dictionary_active);
                let header = 1 + 4 + 4 + 8 + 1 + 4;
                header
                    + groups
                        .iter()
                        .map(|g| g.serialized_size(&mut slot))
                        .sum::<usize>()
            }
        }
    }
}
