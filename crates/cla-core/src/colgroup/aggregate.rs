//! Partial aggregate state filled by column groups.

use crate::kahan::KahanSum;
use crate::operators::AggregateFn;

/// One accumulator slot per output cell of a unary aggregate.
///
/// Groups push weighted values (a tuple entry and how many rows hold it);
/// sums use Kahan correction, min/max ignore the weight.
#[derive(Debug, Clone)]
pub struct AggregateBuffer {
    function: AggregateFn,
    sums: Vec<KahanSum>,
    extremes: Vec<f64>,
}

impl AggregateBuffer {
    /// Creates `len` empty slots. Only `Sum`, `SumSq`, `Min` and `Max` are meaningful.
    #[must_use]
    pub fn new(function: AggregateFn, len: usize) -> Self {
        let init = match function {
            AggregateFn::Max => f64::NEG_INFINITY,
            _ => f64::INFINITY,
        };
        match function {
            AggregateFn::Min | AggregateFn::Max => Self {
                function,
                sums: Vec::new(),
                extremes: vec![init; len],
            },
            _ => Self {
                function,
                sums: vec![KahanSum::new(); len],
                extremes: Vec::new(),
            },
        }
    }

    /// Aggregation function.
    #[must_use]
    pub const fn function(&self) -> AggregateFn {
        self.function
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sums.len().max(self.extremes.len())
    }

    /// True if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `x` held by `count` cells to slot `i`.
    #[inline]
    pub fn add(&mut self, i: usize, x: f64, count: usize) {
        if count == 0 {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let weight = count as f64;
        match self.function {
            AggregateFn::Sum => self.sums[i].add(x * weight),
            AggregateFn::SumSq => self.sums[i].add(x * x * weight),
            AggregateFn::Min => self.extremes[i] = self.extremes[i].min(x),
            AggregateFn::Max => self.extremes[i] = self.extremes[i].max(x),
            AggregateFn::Mean | AggregateFn::Product => {}
        }
    }

    /// Adds a precomputed partial value (already squared for `SumSq`).
    #[inline]
    pub fn add_partial(&mut self, i: usize, partial: f64) {
        match self.function {
            AggregateFn::Sum | AggregateFn::SumSq => self.sums[i].add(partial),
            AggregateFn::Min => self.extremes[i] = self.extremes[i].min(partial),
            AggregateFn::Max => self.extremes[i] = self.extremes[i].max(partial),
            AggregateFn::Mean | AggregateFn::Product => {}
        }
    }

    /// Folds an implicit zero cell into slot `i` (no-op for sums).
    #[inline]
    pub fn fold_zero(&mut self, i: usize) {
        if !self.extremes.is_empty() {
            self.add_partial(i, 0.0);
        }
    }

    /// Combines another buffer of the same shape into this one.
    pub fn merge(&mut self, other: &Self) {
        for (a, b) in self.sums.iter_mut().zip(&other.sums) {
            a.merge(b);
        }
        for i in 0..other.extremes.len() {
            self.add_partial(i, other.extremes[i]);
        }
    }

    /// Final values.
    #[must_use]
    pub fn finish(self) -> Vec<f64> {
        if self.extremes.is_empty() {
            self.sums.iter().map(KahanSum::value).collect()
        } else {
            self.extremes
        }
    }

    /// Contribution of one tuple to a row aggregate.
    pub(crate) fn tuple_partial(function: AggregateFn, tuple: &[f64]) -> f64 {
        match function {
            AggregateFn::Sum => tuple.iter().sum(),
            AggregateFn::SumSq => tuple.iter().map(|x| x * x).sum(),
            AggregateFn::Min => tuple.iter().copied().fold(f64::INFINITY, f64::min),
            AggregateFn::Max => tuple.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggregateFn::Mean | AggregateFn::Product => 0.0,
        }
    }
}
