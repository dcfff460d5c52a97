//! Benchmark for the compression pipeline.
//!
//! Measures `compress()` at several row counts, sequential and parallel,
//! plus decompression of the result.

#![allow(clippy::cast_precision_loss)]

use cla_core::{CompressedMatrix, CompressionConfig, MatrixBlock};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn categorical_block(rows: usize, cols: usize) -> MatrixBlock {
    let mut rng = StdRng::seed_from_u64(17);
    let data: Vec<f64> = (0..rows * cols)
        .map(|i| {
            let cardinality = 4 + (i % cols) * 8;
            f64::from(rng.gen_range(0u32..cardinality as u32))
        })
        .collect();
    MatrixBlock::from_dense(rows, cols, data).expect("block")
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    group.sample_size(20);

    for rows in [10_000, 100_000] {
        let block = categorical_block(rows, 8);
        for threads in [1, 4] {
            let config = CompressionConfig::default().with_parallelism(threads);
            group.bench_with_input(
                BenchmarkId::new(format!("threads_{threads}"), rows),
                &rows,
                |b, _| {
                    b.iter(|| {
                        let mut matrix = CompressedMatrix::new(block.clone());
                        let outcome = matrix.compress(black_box(&config)).expect("compress");
                        black_box(outcome)
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");
    group.sample_size(20);

    for rows in [10_000, 100_000] {
        let mut matrix = CompressedMatrix::new(categorical_block(rows, 8));
        matrix
            .compress(&CompressionConfig::default())
            .expect("compress");

        group.bench_with_input(BenchmarkId::new("dense", rows), &rows, |b, _| {
            b.iter(|| black_box(matrix.decompress(black_box(4)).expect("decompress")));
        });
    }

    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let mut matrix = CompressedMatrix::new(categorical_block(100_000, 8));
    matrix
        .compress(&CompressionConfig::default())
        .expect("compress");
    let bytes = matrix.to_bytes().expect("serialize");

    c.bench_function("serialize_100k", |b| {
        b.iter(|| black_box(matrix.to_bytes().expect("serialize")));
    });
    c.bench_function("deserialize_100k", |b| {
        b.iter(|| black_box(CompressedMatrix::from_bytes(black_box(&bytes)).expect("deserialize")));
    });
}

criterion_group!(benches, bench_compress, bench_decompress, bench_serialize);
criterion_main!(benches);
