//! Operator descriptors consumed by compressed and uncompressed matrices.
//!
//! Descriptors are plain values: a function tag plus its numeric parameters.

use serde::{Deserialize, Serialize};

/// Elementwise function applied between a cell value and a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarFn {
    /// `x + c`
    Plus,
    /// `x - c`
    Minus,
    /// `x * c`
    Multiply,
    /// `x / c`
    Divide,
    /// `x ^ c`
    Power,
    /// `min(x, c)`
    Min,
    /// `max(x, c)`
    Max,
    /// `x == c` as 1/0
    Equal,
    /// `x != c` as 1/0
    NotEqual,
    /// `x < c` as 1/0
    Less,
    /// `x <= c` as 1/0
    LessEqual,
    /// `x > c` as 1/0
    Greater,
    /// `x >= c` as 1/0
    GreaterEqual,
}

/// A scalar operator: `function(cell, constant)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarOperator {
    /// Function to apply.
    pub function: ScalarFn,
    /// Right-hand constant.
    pub constant: f64,
}

impl ScalarOperator {
    /// Creates a scalar operator.
    #[must_use]
    pub const fn new(function: ScalarFn, constant: f64) -> Self {
        Self { function, constant }
    }

    /// Applies the operator to one value.
    #[inline]
    #[must_use]
    pub fn apply(&self, x: f64) -> f64 {
        let c = self.constant;
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        match self.function {
            ScalarFn::Plus => x + c,
            ScalarFn::Minus => x - c,
            ScalarFn::Multiply => x * c,
            ScalarFn::Divide => x / c,
            ScalarFn::Power => x.powf(c),
            ScalarFn::Min => x.min(c),
            ScalarFn::Max => x.max(c),
            ScalarFn::Equal => flag(x == c),
            ScalarFn::NotEqual => flag(x != c),
            ScalarFn::Less => flag(x < c),
            ScalarFn::LessEqual => flag(x <= c),
            ScalarFn::Greater => flag(x > c),
            ScalarFn::GreaterEqual => flag(x >= c),
        }
    }

    /// True if `f(0) == 0`, so zero cells stay zero.
    #[must_use]
    pub fn is_sparse_safe(&self) -> bool {
        self.apply(0.0) == 0.0
    }
}

/// Aggregation function of a unary aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    /// Sum of values.
    Sum,
    /// Sum of squared values.
    SumSq,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Arithmetic mean (uncompressed path only).
    Mean,
    /// Product of values (uncompressed path only).
    Product,
}

/// Which dimension an aggregate collapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFunction {
    /// Collapse everything into a 1x1 result.
    ReduceAll,
    /// Collapse the rows: one value per column, 1 x cols.
    ReduceRow,
    /// Collapse the columns: one value per row, rows x 1.
    ReduceCol,
}

/// A unary aggregate such as `colSums` or `rowMaxs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateUnaryOperator {
    /// Aggregation function.
    pub function: AggregateFn,
    /// Reduction direction.
    pub index: IndexFunction,
    /// Worker threads (1 = single-threaded).
    pub threads: usize,
}

impl AggregateUnaryOperator {
    /// Creates a single-threaded aggregate.
    #[must_use]
    pub const fn new(function: AggregateFn, index: IndexFunction) -> Self {
        Self {
            function,
            index,
            threads: 1,
        }
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Output shape for an input of `rows x cols`.
    #[must_use]
    pub const fn output_shape(&self, rows: usize, cols: usize) -> (usize, usize) {
        match self.index {
            IndexFunction::ReduceAll => (1, 1),
            IndexFunction::ReduceRow => (1, cols),
            IndexFunction::ReduceCol => (rows, 1),
        }
    }

    /// True for `Sum` and `SumSq`, the Kahan-corrected functions.
    #[must_use]
    pub const fn is_sum_like(&self) -> bool {
        matches!(self.function, AggregateFn::Sum | AggregateFn::SumSq)
    }
}

/// Matrix-vector chain pattern for `chain_multiply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainType {
    /// `t(X) %*% (X %*% v)`
    XtXv,
    /// `t(X) %*% (w * (X %*% v))`
    XtwXv,
}

/// Transpose-self-multiply direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TsmmType {
    /// `t(X) %*% X`
    Left,
    /// `X %*% t(X)`
    Right,
}

/// Append direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindDirection {
    /// Column bind: same rows, columns appended.
    Cbind,
    /// Row bind: same columns, rows appended.
    Rbind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_apply() {
        assert!((ScalarOperator::new(ScalarFn::Plus, 2.0).apply(3.0) - 5.0).abs() < 1e-12);
        assert!((ScalarOperator::new(ScalarFn::Power, 2.0).apply(3.0) - 9.0).abs() < 1e-12);
        assert!((ScalarOperator::new(ScalarFn::Greater, 2.0).apply(3.0) - 1.0).abs() < 1e-12);
        assert!(ScalarOperator::new(ScalarFn::Less, 2.0).apply(3.0).abs() < 1e-12);
    }

    #[test]
    fn test_sparse_safety() {
        assert!(ScalarOperator::new(ScalarFn::Multiply, 7.0).is_sparse_safe());
        assert!(ScalarOperator::new(ScalarFn::Greater, 0.5).is_sparse_safe());
        assert!(!ScalarOperator::new(ScalarFn::Plus, 1.0).is_sparse_safe());
        assert!(!ScalarOperator::new(ScalarFn::Equal, 0.0).is_sparse_safe());
        // 0 / 0 is NaN
        assert!(!ScalarOperator::new(ScalarFn::Divide, 0.0).is_sparse_safe());
    }

    #[test]
    fn test_aggregate_output_shape() {
        let op = AggregateUnaryOperator::new(AggregateFn::Sum, IndexFunction::ReduceRow);
        assert_eq!(op.output_shape(10, 3), (1, 3));
        let op = AggregateUnaryOperator::new(AggregateFn::Max, IndexFunction::ReduceCol);
        assert_eq!(op.output_shape(10, 3), (10, 1));
        let op = AggregateUnaryOperator::new(AggregateFn::Min, IndexFunction::ReduceAll);
        assert_eq!(op.output_shape(10, 3), (1, 1));
    }
}
