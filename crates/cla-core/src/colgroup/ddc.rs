//! Dense dictionary coding (DDC): one fixed-width code per row.

use rustc_hash::FxHashMap;

use super::aggregate::AggregateBuffer;
use super::bitmap::ColumnBitmap;
use super::dictionary::Dictionary;
use super::EncodingKind;
use crate::error::{Error, Result};
use crate::operators::{IndexFunction, ScalarOperator};
use crate::parallel::with_scratch;

/// Largest dictionary addressable by byte codes.
pub const MAX_BYTE_VALUES: usize = 256;
/// Largest dictionary addressable by short codes.
pub const MAX_SHORT_VALUES: usize = 65_536;

/// Per-row codes, byte- or short-wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codes {
    /// Up to 256 distinct tuples.
    Byte(Vec<u8>),
    /// Up to 65 536 distinct tuples.
    Short(Vec<u16>),
}

impl Codes {
    /// Picks the narrowest width for `num_values` tuples.
    #[allow(clippy::cast_possible_truncation)]
    fn from_codes(codes: &[u32], num_values: usize) -> Self {
        if num_values <= MAX_BYTE_VALUES {
            Self::Byte(codes.iter().map(|&c| c as u8).collect())
        } else {
            Self::Short(codes.iter().map(|&c| c as u16).collect())
        }
    }

    /// Code of row `r`.
    #[inline]
    #[must_use]
    pub fn get(&self, r: usize) -> usize {
        match self {
            Self::Byte(c) => c[r] as usize,
            Self::Short(c) => c[r] as usize,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Byte(c) => c.len(),
            Self::Short(c) => c.len(),
        }
    }

    /// True if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per code.
    #[must_use]
    pub const fn width(&self) -> usize {
        match self {
            Self::Byte(_) => 1,
            Self::Short(_) => 2,
        }
    }

    fn max_code(&self) -> Option<usize> {
        match self {
            Self::Byte(c) => c.iter().max().map(|&m| m as usize),
            Self::Short(c) => c.iter().max().map(|&m| m as usize),
        }
    }
}

/// Dictionary-coded column group.
///
/// Every row has a code; rows whose tuple is all zeros point at an explicit
/// zero tuple, so the dictionary covers all rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DdcGroup {
    columns: Vec<usize>,
    rows: usize,
    dict: Dictionary,
    codes: Codes,
}

impl DdcGroup {
    /// Builds codes from a full-row bitmap, adding a zero tuple if some rows are uncovered.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnGroup` if more than 65 536 tuples are needed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_bitmap(columns: Vec<usize>, rows: usize, bitmap: &ColumnBitmap) -> Result<Self> {
        let nv = bitmap.num_values();
        let needs_zero = bitmap.num_offsets() < rows;
        let total = nv + usize::from(needs_zero);
        if total > MAX_SHORT_VALUES {
            return Err(Error::InvalidColumnGroup(format!(
                "{total} distinct tuples exceed the DDC limit of {MAX_SHORT_VALUES}"
            )));
        }
        let mut values = bitmap.values().to_vec();
        if needs_zero {
            values.extend(std::iter::repeat(0.0).take(columns.len()));
        }
        let mut codes = vec![nv as u32; rows];
        for k in 0..nv {
            for &r in bitmap.offsets(k) {
                codes[r as usize] = k as u32;
            }
        }
        Ok(Self {
            columns,
            rows,
            dict: Dictionary::new(values),
            codes: Codes::from_codes(&codes, total),
        })
    }

    /// Assembles a group from decoded parts, checking every code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnGroup` on a length mismatch or an out-of-range code.
    pub fn from_parts(
        columns: Vec<usize>,
        rows: usize,
        dict: Dictionary,
        codes: Codes,
    ) -> Result<Self> {
        if codes.len() != rows {
            return Err(Error::InvalidColumnGroup(format!(
                "DDC group has {} codes for {rows} rows",
                codes.len()
            )));
        }
        if !columns.is_empty() && dict.len() % columns.len() != 0 {
            return Err(Error::InvalidColumnGroup(
                "DDC dictionary length is not a multiple of the column count".into(),
            ));
        }
        let nv = dict.num_tuples(columns.len());
        if let Some(max) = codes.max_code() {
            if max >= nv {
                return Err(Error::InvalidColumnGroup(format!(
                    "DDC code {max} out of range for {nv} tuples"
                )));
            }
        }
        Ok(Self {
            columns,
            rows,
            dict,
            codes,
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

    /// Dictionary.
    #[must_use]
    pub const fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    /// Row codes.
    #[must_use]
    pub const fn codes(&self) -> &Codes {
        &self.codes
    }

    /// Number of dictionary tuples.
    #[must_use]
    pub fn num_values(&self) -> usize {
        self.dict.num_tuples(self.columns.len())
    }

    /// `Ddc8` or `Ddc16`.
    #[must_use]
    pub const fn kind(&self) -> EncodingKind {
        match self.codes {
            Codes::Byte(_) => EncodingKind::Ddc8,
            Codes::Short(_) => EncodingKind::Ddc16,
        }
    }

    /// Same codes over a replacement dictionary of identical shape.
    #[must_use]
    pub fn with_dictionary(&self, dict: Dictionary) -> Self {
        Self {
            dict,
            ..self.clone()
        }
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
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, pos: usize) -> f64 {
        let c = self.columns.len();
        self.dict.values()[self.codes.get(row) * c + pos]
    }

    pub(crate) fn for_each_nonzero(&self, rl: usize, ru: usize, mut f: impl FnMut(usize, usize, f64)) {
        let c = self.columns.len();
        for r in rl..ru {
            let tuple = self.dict.tuple(self.codes.get(r), c);
            for (j, &x) in tuple.iter().enumerate() {
                if x != 0.0 {
                    f(r, self.columns[j], x);
                }
            }
        }
    }

    pub(crate) fn count_nonzeros_per_row(&self, counts: &mut [usize], rl: usize, ru: usize) {
        let nnz = self.dict.tuple_nnz(self.columns.len());
        for r in rl..ru {
            counts[r - rl] += nnz[self.codes.get(r)];
        }
    }

    pub(crate) fn right_mult(&self, vector: &[f64], out: &mut [f64], rl: usize, ru: usize) {
        with_scratch(self.num_values(), |vals| {
            self.dict.dot_tuples(&self.columns, vector, vals);
            for r in rl..ru {
                out[r - rl] += vals[self.codes.get(r)];
            }
        });
    }

    pub(crate) fn left_mult(&self, vector: &[f64], out: &mut [f64]) {
        with_scratch(self.num_values(), |sums| {
            for (r, &x) in vector.iter().enumerate().take(self.rows) {
                sums[self.codes.get(r)] += x;
            }
            self.scatter_code_sums(sums, out);
        });
    }

    /// Left multiply by the single column of another DDC group without decoding it.
    pub(crate) fn left_mult_by_ddc_column(&self, lhs: &Self, out: &mut [f64]) {
        let lhs_values = lhs.dict.values();
        with_scratch(self.num_values(), |sums| {
            for r in 0..self.rows {
                sums[self.codes.get(r)] += lhs_values[lhs.codes.get(r)];
            }
            self.scatter_code_sums(sums, out);
        });
    }

    fn scatter_code_sums(&self, sums: &[f64], out: &mut [f64]) {
        let c = self.columns.len();
        for (k, &s) in sums.iter().enumerate() {
            if s == 0.0 {
                continue;
            }
            for (j, &x) in self.dict.tuple(k, c).iter().enumerate() {
                out[self.columns[j]] += s * x;
            }
        }
    }

    /// Rows per code within `rl..ru`.
    fn code_counts(&self, rl: usize, ru: usize) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_values()];
        for r in rl..ru {
            counts[self.codes.get(r)] += 1;
        }
        counts
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
                let counts = self.code_counts(rl, ru);
                for (k, &count) in counts.iter().enumerate() {
                    if count == 0 {
                        continue;
                    }
                    for (j, &x) in self.dict.tuple(k, c).iter().enumerate() {
                        let slot = if index == IndexFunction::ReduceAll {
                            0
                        } else {
                            self.columns[j]
                        };
                        buf.add(slot, x, count);
                    }
                }
            }
            IndexFunction::ReduceCol => {
                let partials: Vec<f64> = (0..self.num_values())
                    .map(|k| AggregateBuffer::tuple_partial(buf.function(), self.dict.tuple(k, c)))
                    .collect();
                for r in rl..ru {
                    buf.add_partial(r - rl, partials[self.codes.get(r)]);
                }
            }
        }
    }

    /// Applies `op` to the dictionary; codes are untouched.
    #[must_use]
    pub fn scalar_op(&self, op: &ScalarOperator) -> Self {
        self.with_dictionary(self.dict.apply(op))
    }

    /// Re-points a single-column group at a shared dictionary.
    ///
    /// `lookup` maps the bit pattern of each shared value to its code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnGroup` if a value is missing from the shared dictionary.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn recode(&self, shared: &Dictionary, lookup: &FxHashMap<u64, usize>) -> Result<Self> {
        let remap: Vec<u32> = self
            .dict
            .values()
            .iter()
            .map(|&x| {
                lookup
                    .get(&value_key(x))
                    .map(|&code| code as u32)
                    .ok_or_else(|| {
                        Error::InvalidColumnGroup(format!("value {x} missing from shared dictionary"))
                    })
            })
            .collect::<Result<_>>()?;
        let codes: Vec<u32> = (0..self.rows).map(|r| remap[self.codes.get(r)]).collect();
        Ok(Self {
            columns: self.columns.clone(),
            rows: self.rows,
            dict: shared.clone(),
            codes: Codes::from_codes(&codes, shared.len()),
        })
    }

    /// Estimated in-memory size in bytes.
    #[must_use]
    pub fn size_in_memory(&self) -> usize {
        self.dict.size_in_memory() + self.codes.width() * self.rows
    }
}

/// Hash key of a dictionary value, with both zeros mapped together.
#[inline]
pub(crate) fn value_key(x: f64) -> u64 {
    if x == 0.0 {
        0
    } else {
        x.to_bits()
    }
}
