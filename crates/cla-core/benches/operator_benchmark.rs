//! Benchmark for compressed-domain operators against the same operators on
//! the uncompressed block.

#![allow(clippy::cast_precision_loss)]

use cla_core::{
    AggregateFn, AggregateUnaryOperator, CompressedMatrix, CompressionConfig, IndexFunction,
    MatrixBlock, TsmmType,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ROWS: usize = 100_000;
const COLS: usize = 16;

fn setup() -> (MatrixBlock, CompressedMatrix) {
    let mut rng = StdRng::seed_from_u64(29);
    let data: Vec<f64> = (0..ROWS * COLS)
        .map(|i| {
            if i % COLS < 4 && rng.gen_bool(0.9) {
                0.0
            } else {
                f64::from(rng.gen_range(1u32..=(2 + (i % COLS) as u32 * 4)))
            }
        })
        .collect();
    let block = MatrixBlock::from_dense(ROWS, COLS, data).expect("block");
    let mut matrix = CompressedMatrix::new(block.clone());
    matrix
        .compress(&CompressionConfig::default().with_parallelism(4))
        .expect("compress");
    (block, matrix)
}

fn bench_right_multiply(c: &mut Criterion) {
    let (block, matrix) = setup();
    let v = MatrixBlock::column_vector(&(0..COLS).map(|i| i as f64 * 0.1).collect::<Vec<_>>());

    let mut group = c.benchmark_group("right_multiply");
    group.sample_size(20);
    group.throughput(Throughput::Elements((ROWS * COLS) as u64));

    group.bench_function("uncompressed", |b| {
        b.iter(|| black_box(block.matrix_multiply(black_box(&v)).expect("multiply")));
    });
    for threads in [1, 4] {
        group.bench_with_input(
            BenchmarkId::new("compressed", threads),
            &threads,
            |b, &threads| {
                b.iter(|| black_box(matrix.right_multiply(black_box(&v), threads).expect("multiply")));
            },
        );
    }

    group.finish();
}

fn bench_left_multiply(c: &mut Criterion) {
    let (block, matrix) = setup();
    let u = MatrixBlock::row_vector(&(0..ROWS).map(|i| (i % 10) as f64).collect::<Vec<_>>());

    let mut group = c.benchmark_group("left_multiply");
    group.sample_size(20);
    group.throughput(Throughput::Elements((ROWS * COLS) as u64));

    group.bench_function("uncompressed", |b| {
        b.iter(|| black_box(u.matrix_multiply(black_box(&block)).expect("multiply")));
    });
    for threads in [1, 4] {
        group.bench_with_input(
            BenchmarkId::new("compressed", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    black_box(
                        matrix
                            .left_multiply_by_row_vector(black_box(&u), threads)
                            .expect("multiply"),
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_aggregates_and_tsmm(c: &mut Criterion) {
    let (block, matrix) = setup();
    let col_sums = AggregateUnaryOperator::new(AggregateFn::Sum, IndexFunction::ReduceRow);

    let mut group = c.benchmark_group("aggregate");
    group.sample_size(20);
    group.bench_function("col_sums_uncompressed", |b| {
        b.iter(|| black_box(block.aggregate_unary(black_box(&col_sums)).expect("aggregate")));
    });
    group.bench_function("col_sums_compressed", |b| {
        b.iter(|| black_box(matrix.unary_aggregate(black_box(&col_sums)).expect("aggregate")));
    });
    group.bench_function("tsmm_left_compressed", |b| {
        b.iter(|| {
            black_box(
                matrix
                    .transpose_self_multiply(TsmmType::Left, 4)
                    .expect("tsmm"),
            )
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_right_multiply,
    bench_left_multiply,
    bench_aggregates_and_tsmm
);
criterion_main!(benches);
