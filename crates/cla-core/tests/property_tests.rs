//! Property-based tests: compressed operators agree with their uncompressed
//! counterparts on random low-cardinality matrices.
#![allow(clippy::cast_precision_loss)]

use cla_core::{
    AggregateFn, AggregateUnaryOperator, ChainType, CompressedMatrix, CompressionConfig,
    IndexFunction, MatrixBlock, ScalarFn, ScalarOperator, TsmmType,
};
use proptest::prelude::*;

const TOLERANCE: f64 = 1e-6;

/// Values drawn from a tiny domain so most columns compress.
fn cell_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => Just(0.0),
        2 => Just(1.0),
        1 => Just(2.5),
        1 => Just(-3.0),
    ]
}

fn matrix_strategy() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (20usize..=80, 1usize..=5).prop_flat_map(|(rows, cols)| {
        proptest::collection::vec(proptest::collection::vec(cell_strategy(), cols), rows)
    })
}

fn compress(rows: &[Vec<f64>], parallelism: usize) -> (MatrixBlock, CompressedMatrix) {
    let block = MatrixBlock::from_rows(rows).expect("valid rows");
    let mut matrix = CompressedMatrix::new(block.clone());
    matrix
        .compress(&CompressionConfig::default().with_parallelism(parallelism))
        .expect("compress");
    (block, matrix)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: decompress(compress(X)) == X, bit for bit
    #[test]
    fn prop_compression_is_lossless(rows in matrix_strategy(), threads in 1usize..=3) {
        let (block, matrix) = compress(&rows, threads);
        let back = matrix.decompress(threads).expect("decompress");

        prop_assert_eq!(back.shape(), block.shape());
        prop_assert_eq!(back.to_row_major(), block.to_row_major());
        prop_assert_eq!(matrix.nnz(), block.nnz());
    }

    /// Property: every column belongs to exactly one group
    #[test]
    fn prop_groups_partition_columns(rows in matrix_strategy()) {
        let (block, matrix) = compress(&rows, 1);
        prop_assume!(matrix.is_compressed());

        let mut covered: Vec<usize> = matrix
            .column_groups()
            .iter()
            .flat_map(|g| g.columns().to_vec())
            .collect();
        covered.sort_unstable();
        prop_assert_eq!(covered, (0..block.cols()).collect::<Vec<_>>());
    }

    /// Property: serialized bytes decode to the same matrix
    #[test]
    fn prop_serialization_preserves_values(rows in matrix_strategy()) {
        let (block, matrix) = compress(&rows, 1);
        let bytes = matrix.to_bytes().expect("serialize");
        prop_assert_eq!(bytes.len(), matrix.exact_size_on_disk());

        let restored = CompressedMatrix::from_bytes(&bytes).expect("deserialize");
        prop_assert_eq!(restored.is_compressed(), matrix.is_compressed());
        prop_assert_eq!(restored.decompress(1).expect("decompress").to_row_major(), block.to_row_major());
    }

    /// Property: X %*% v matches on both representations
    #[test]
    fn prop_right_multiply_matches(rows in matrix_strategy(), threads in 1usize..=3) {
        let (block, matrix) = compress(&rows, 1);
        let v: Vec<f64> = (0..block.cols()).map(|i| i as f64 * 0.5 - 1.0).collect();
        let v = MatrixBlock::column_vector(&v);

        let expected = block.matrix_multiply(&v).expect("reference");
        let actual = matrix.right_multiply(&v, threads).expect("compressed");
        prop_assert!(actual.approx_eq(&expected, TOLERANCE));
    }

    /// Property: u %*% X matches on both representations
    #[test]
    fn prop_left_multiply_matches(rows in matrix_strategy(), threads in 1usize..=3) {
        let (block, matrix) = compress(&rows, 1);
        let u: Vec<f64> = (0..block.rows()).map(|i| ((i % 7) as f64) - 3.0).collect();
        let u = MatrixBlock::row_vector(&u);

        let expected = u.matrix_multiply(&block).expect("reference");
        let actual = matrix.left_multiply_by_row_vector(&u, threads).expect("compressed");
        prop_assert!(actual.approx_eq(&expected, TOLERANCE));
    }

    /// Property: t(X) %*% X matches
    #[test]
    fn prop_tsmm_left_matches(rows in matrix_strategy(), threads in 1usize..=3) {
        let (block, matrix) = compress(&rows, 1);

        let expected = block.transpose_self_multiply(TsmmType::Left);
        let actual = matrix.transpose_self_multiply(TsmmType::Left, threads).expect("compressed");
        prop_assert!(actual.approx_eq(&expected, TOLERANCE));
    }

    /// Property: sum/min/max aggregates match in every direction
    #[test]
    fn prop_aggregates_match(rows in matrix_strategy(), threads in 1usize..=3) {
        let (block, matrix) = compress(&rows, 1);
        for function in [AggregateFn::Sum, AggregateFn::SumSq, AggregateFn::Min, AggregateFn::Max] {
            for index in [IndexFunction::ReduceAll, IndexFunction::ReduceRow, IndexFunction::ReduceCol] {
                let op = AggregateUnaryOperator::new(function, index).with_threads(threads);
                let expected = block.aggregate_unary(&op).expect("reference");
                let actual = matrix.unary_aggregate(&op).expect("compressed");
                prop_assert!(
                    actual.approx_eq(&expected, TOLERANCE),
                    "{:?} {:?} differs", function, index
                );
            }
        }
    }

    /// Property: scalar operations commute with decompression
    #[test]
    fn prop_scalar_operation_matches(rows in matrix_strategy(), constant in -2.0f64..2.0) {
        let (block, matrix) = compress(&rows, 1);
        for function in [ScalarFn::Plus, ScalarFn::Multiply, ScalarFn::Max, ScalarFn::Greater] {
            let op = ScalarOperator::new(function, constant);
            let expected = block.scalar_operation(&op);
            let actual = matrix.scalar_operation(&op).decompress(1).expect("decompress");
            prop_assert!(actual.approx_eq(&expected, TOLERANCE), "{:?} differs", function);
        }
    }

    /// Property: t(X) %*% (w * (X %*% v)) matches
    #[test]
    fn prop_chain_multiply_matches(rows in matrix_strategy(), threads in 1usize..=3) {
        let (block, matrix) = compress(&rows, 1);
        let v: Vec<f64> = (0..block.cols()).map(|i| 1.0 + i as f64).collect();
        let w: Vec<f64> = (0..block.rows()).map(|i| (i % 3) as f64).collect();
        let v = MatrixBlock::column_vector(&v);
        let w = MatrixBlock::column_vector(&w);

        let expected = block.chain_multiply(&v, Some(&w), ChainType::XtwXv).expect("reference");
        let actual = matrix
            .chain_multiply(&v, Some(&w), ChainType::XtwXv, threads)
            .expect("compressed");
        prop_assert!(actual.approx_eq(&expected, TOLERANCE));
    }
}
