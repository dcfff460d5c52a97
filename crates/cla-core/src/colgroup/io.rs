//! Binary format of a single column group.
//!
//! ```text
//! [tag: u8][rows: i32][ncols: i32][ncols × col: i32] payload
//! UNCOMPRESSED  block in the matrix block format
//! DDC8 / DDC16  [reuse_shared: bool] (if !reuse_shared: [nv: i32] nv*ncols × f64)
//!               rows × code (u8 for DDC8, u16 for DDC16)
//! OLE / RLE     [nv: i32] nv*ncols × f64, (nv+1) × ptr: i32, [len: i32] len × u16
//! ```

use bytes::{Buf, BufMut};

use super::{
    BitmapGroup, Codes, ColumnGroup, DdcGroup, Dictionary, EncodingKind, OffsetEncoding,
    OffsetList, RunList, UncompressedGroup,
};
use crate::codec::{
    read_bool, read_f64_vec, read_len, read_u16_vec, read_u8, read_u8_vec, wire_i32,
};
use crate::error::{Error, Result};
use crate::matrix::MatrixBlock;

/// The dictionary shared by single-column DDC8 groups while (de)serializing.
///
/// The first qualifying group writes its dictionary in full and fills the
/// slot; later groups pointing at the same dictionary only write a flag.
#[derive(Debug, Default)]
pub(crate) struct SharedDictionarySlot {
    active: bool,
    dict: Option<Dictionary>,
}

impl SharedDictionarySlot {
    pub(crate) fn new(active: bool) -> Self {
        Self { active, dict: None }
    }

    /// True if `group` can refer to the already recorded dictionary.
    fn reuses(&self, group: &DdcGroup) -> bool {
        self.dict
            .as_ref()
            .is_some_and(|d| d.ptr_eq(group.dictionary()))
    }

    fn record(&mut self, group: &DdcGroup) {
        if self.active && self.dict.is_none() && group.columns().len() == 1 {
            if let Codes::Byte(_) = group.codes() {
                self.dict = Some(group.dictionary().clone());
            }
        }
    }
}

impl ColumnGroup {
    /// Appends this group's encoding to `out`.
    pub(crate) fn write_to(&self, out: &mut impl BufMut, slot: &mut SharedDictionarySlot) -> Result<()> {
        out.put_u8(self.kind().tag());
        out.put_i32(wire_i32(self.num_rows(), "group rows")?);
        out.put_i32(wire_i32(self.num_columns(), "group column count")?);
        for &c in self.columns() {
            out.put_i32(wire_i32(c, "column index")?);
        }
        match self {
            Self::Uncompressed(g) => g.data().write_to(out)?,
            Self::Ddc(g) => {
                let reuse = slot.reuses(g);
                out.put_u8(u8::from(reuse));
                if !reuse {
                    out.put_i32(wire_i32(g.num_values(), "dictionary size")?);
                    put_values(out, g.dictionary());
                    slot.record(g);
                }
                match g.codes() {
                    Codes::Byte(codes) => out.put_slice(codes),
                    Codes::Short(codes) => codes.iter().for_each(|&c| out.put_u16(c)),
                }
            }
            Self::OffsetList(g) => write_bitmap(out, g)?,
            Self::RunLength(g) => write_bitmap(out, g)?,
        }
        Ok(())
    }

    /// Exact length of [`Self::write_to`] output under the same slot state.
    pub(crate) fn serialized_size(&self, slot: &mut SharedDictionarySlot) -> usize {
        let header = 1 + 4 + 4 + 4 * self.num_columns();
        let payload = match self {
            Self::Uncompressed(g) => g.data().serialized_size(),
            Self::Ddc(g) => {
                let dict = if slot.reuses(g) {
                    0
                } else {
                    slot.record(g);
                    4 + 8 * g.dictionary().len()
                };
                1 + dict + g.codes().width() * g.num_rows()
            }
            Self::OffsetList(g) => bitmap_size(g),
            Self::RunLength(g) => bitmap_size(g),
        };
        header + payload
    }

    /// Decodes one group.
    ///
    /// # Errors
    ///
    /// Returns `Deserialization` on an unknown tag, a truncated buffer or an
    /// inconsistent payload.
    pub(crate) fn read_from(buf: &mut impl Buf, slot: &mut SharedDictionarySlot) -> Result<Self> {
        let kind = EncodingKind::from_tag(read_u8(buf, "group type tag")?)?;
        let rows = read_len(buf, "group rows")?;
        let ncols = read_len(buf, "group column count")?;
        if ncols == 0 {
            return Err(Error::Deserialization("column group without columns".into()));
        }
        let mut columns = Vec::with_capacity(ncols.min(buf.remaining() / 4));
        for _ in 0..ncols {
            columns.push(read_len(buf, "column index")?);
        }
        if columns.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Deserialization(
                "group column indices are not strictly increasing".into(),
            ));
        }
        let group = match kind {
            EncodingKind::Uncompressed => {
                let block = MatrixBlock::read_from(buf)?;
                if block.rows() != rows {
                    return Err(Error::Deserialization(format!(
                        "uncompressed group declares {rows} rows but holds {}",
                        block.rows()
                    )));
                }
                Self::Uncompressed(
                    UncompressedGroup::new(columns, block).map_err(into_deserialization)?,
                )
            }
            EncodingKind::Ddc8 | EncodingKind::Ddc16 => {
                let reuse = read_bool(buf, "shared dictionary flag")?;
                let dict = if reuse {
                    slot.dict.clone().ok_or_else(|| {
                        Error::Deserialization("group reuses a shared dictionary that was never written".into())
                    })?
                } else {
                    read_values(buf, ncols)?
                };
                let codes = if kind == EncodingKind::Ddc8 {
                    Codes::Byte(read_u8_vec(buf, rows, "DDC8 codes")?)
                } else {
                    Codes::Short(read_u16_vec(buf, rows, "DDC16 codes")?)
                };
                let group = DdcGroup::from_parts(columns, rows, dict, codes).map_err(into_deserialization)?;
                if !reuse {
                    slot.record(&group);
                }
                Self::Ddc(group)
            }
            EncodingKind::OffsetList => Self::OffsetList(read_bitmap::<OffsetList>(buf, columns, rows)?),
            EncodingKind::RunLength => Self::RunLength(read_bitmap::<RunList>(buf, columns, rows)?),
        };
        Ok(group)
    }
}

fn into_deserialization(err: Error) -> Error {
    match err {
        Error::InvalidColumnGroup(msg) => Error::Deserialization(msg),
        other => other,
    }
}

fn put_values(out: &mut impl BufMut, dict: &Dictionary) {
    for &x in dict.values() {
        out.put_f64(x);
    }
}

fn read_values(buf: &mut impl Buf, ncols: usize) -> Result<Dictionary> {
    let nv = read_len(buf, "dictionary size")?;
    let count = nv
        .checked_mul(ncols)
        .ok_or_else(|| Error::Deserialization(format!("dictionary size {nv} overflows")))?;
    Ok(Dictionary::new(read_f64_vec(buf, count, "dictionary values")?))
}

fn write_bitmap<E: OffsetEncoding>(out: &mut impl BufMut, group: &BitmapGroup<E>) -> Result<()> {
    out.put_i32(wire_i32(group.num_values(), "dictionary size")?);
    put_values(out, group.dictionary());
    for &p in group.encoding().ptr() {
        out.put_i32(wire_i32(p as usize, "bitmap pointer")?);
    }
    let data = group.encoding().data();
    out.put_i32(wire_i32(data.len(), "bitmap payload length")?);
    for &d in data {
        out.put_u16(d);
    }
    Ok(())
}

fn bitmap_size<E: OffsetEncoding>(group: &BitmapGroup<E>) -> usize {
    4 + 8 * group.dictionary().len() + 4 * (group.num_values() + 1) + 4 + 2 * group.encoding().data().len()
}

fn read_bitmap<E: OffsetEncoding>(buf: &mut impl Buf, columns: Vec<usize>, rows: usize) -> Result<BitmapGroup<E>> {
    let dict = read_values(buf, columns.len())?;
    let nv = dict.num_tuples(columns.len());
    let mut ptr = Vec::with_capacity((nv + 1).min(buf.remaining() / 4));
    for _ in 0..=nv {
        let p = read_len(buf, "bitmap pointer")?;
        ptr.push(u32::try_from(p).map_err(|_| Error::Deserialization(format!("bitmap pointer {p} too large")))?);
    }
    let len = read_len(buf, "bitmap payload length")?;
    let data = read_u16_vec(buf, len, "bitmap payload")?;
    BitmapGroup::from_parts(columns, rows, dict, E::from_raw(ptr, data))
}
