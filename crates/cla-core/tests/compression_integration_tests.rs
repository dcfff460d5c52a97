//! End-to-end tests of the public API: compress a realistic matrix, run an
//! iterative algorithm on it, persist it and load it back.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::uninlined_format_args
)]

use cla_core::{
    AggregateFn, AggregateUnaryOperator, BindDirection, ChainType, ClaConfig, CompressedMatrix,
    CompressionConfig, CompressionOutcome, Error, IndexFunction, MatrixBlock,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const TOLERANCE: f64 = 1e-6;

/// A census-like table: a few categorical codes, one sparse indicator,
/// and one continuous measurement that does not compress.
fn census_rows(rows: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows)
        .map(|_| {
            let region = f64::from(rng.gen_range(1u8..=8));
            let age_band = f64::from(rng.gen_range(0u8..12)) * 5.0;
            let flag = if rng.gen_bool(0.03) { 1.0 } else { 0.0 };
            let income = rng.gen_range(10_000.0..200_000.0);
            vec![region, age_band, region * 10.0, flag, income]
        })
        .collect()
}

fn compressed_census(rows: usize) -> (MatrixBlock, CompressedMatrix) {
    let block = MatrixBlock::from_rows(&census_rows(rows, 42)).expect("valid rows");
    let mut matrix = CompressedMatrix::new(block.clone());
    let outcome = matrix
        .compress(&CompressionConfig::default().with_parallelism(2))
        .expect("compress");
    assert_eq!(outcome, CompressionOutcome::Compressed);
    (block, matrix)
}

mod compression {
    use super::*;

    #[test]
    fn test_census_matrix_compresses_losslessly() {
        let (block, matrix) = compressed_census(3000);

        let back = matrix.decompress(4).expect("decompress");

        assert_eq!(back.to_row_major(), block.to_row_major());
        let stats = matrix.stats().expect("stats recorded");
        assert!(stats.ratio() > 1.0);
        assert!(stats.aborted.is_none());
    }

    #[test]
    fn test_correlated_columns_are_cocoded() {
        let (_, matrix) = compressed_census(3000);

        // region and region * 10 carry the same information
        let group = matrix
            .column_groups()
            .iter()
            .find(|g| g.columns().contains(&0))
            .expect("column 0 covered");
        assert!(group.columns().contains(&2), "columns: {:?}", group.columns());
    }

    #[test]
    fn test_continuous_column_stays_uncompressed() {
        let (_, matrix) = compressed_census(3000);

        let group = matrix
            .column_groups()
            .iter()
            .find(|g| g.columns().contains(&4))
            .expect("column 4 covered");
        assert_eq!(group.kind().to_string(), "UNCOMPRESSED");
    }

    #[test]
    fn test_sampled_estimation_stays_lossless() {
        let block = MatrixBlock::from_rows(&census_rows(5000, 9)).expect("valid rows");
        let mut matrix = CompressedMatrix::new(block.clone());
        let config = CompressionConfig::default()
            .with_min_sample_rows(100)
            .with_sampling_ratio(0.02)
            .with_seed(1234);

        matrix.compress(&config).expect("compress");

        assert_eq!(
            matrix.decompress(1).expect("decompress").to_row_major(),
            block.to_row_major()
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let block = MatrixBlock::from_rows(&census_rows(50, 1)).expect("valid rows");
        let mut matrix = CompressedMatrix::new(block);

        let err = matrix
            .compress(&CompressionConfig::default().with_parallelism(0))
            .expect_err("parallelism 0 is invalid");

        assert!(matches!(err, Error::Config(_)));
        assert!(!matrix.is_compressed());
    }
}

mod algorithms {
    use super::*;

    /// Gradient descent for least squares, the workload compressed
    /// operators are built for.
    fn fit_linear_model(
        matrix: &CompressedMatrix,
        y: &[f64],
        iterations: usize,
    ) -> Vec<f64> {
        let cols = matrix.cols();
        let mut weights = vec![0.0; cols];
        let step = 1e-14;
        for _ in 0..iterations {
            let w = MatrixBlock::column_vector(&weights);
            let prediction = matrix.right_multiply(&w, 2).expect("X %*% w");
            let residual: Vec<f64> = prediction
                .to_row_major()
                .iter()
                .zip(y)
                .map(|(p, t)| p - t)
                .collect();
            let gradient = matrix
                .left_multiply_by_row_vector(&MatrixBlock::row_vector(&residual), 2)
                .expect("r %*% X")
                .to_row_major();
            for (w, g) in weights.iter_mut().zip(gradient) {
                *w -= step * g;
            }
        }
        weights
    }

    #[test]
    fn test_gradient_descent_matches_uncompressed() {
        let (block, matrix) = compressed_census(1000);
        let y: Vec<f64> = (0..block.rows()).map(|i| (i % 5) as f64).collect();
        let plain = CompressedMatrix::new(block);

        let compressed_weights = fit_linear_model(&matrix, &y, 5);
        let plain_weights = fit_linear_model(&plain, &y, 5);

        for (a, b) in compressed_weights.iter().zip(&plain_weights) {
            assert!((a - b).abs() <= TOLERANCE * b.abs().max(1.0), "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_chain_multiply_matches_two_step_product() {
        let (block, matrix) = compressed_census(1000);
        let v = MatrixBlock::column_vector(&[1.0, 0.5, -0.25, 2.0, 1e-5]);

        let chained = matrix
            .chain_multiply(&v, None, ChainType::XtXv, 3)
            .expect("chain");
        let xv = block.matrix_multiply(&v).expect("X %*% v");
        let two_step = block.transpose().matrix_multiply(&xv).expect("t(X) %*% Xv");

        assert_eq!(chained.shape(), (5, 1));
        for (a, b) in chained.to_row_major().iter().zip(two_step.to_row_major()) {
            assert!((a - b).abs() <= TOLERANCE * b.abs().max(1.0));
        }
    }

    #[test]
    fn test_column_means_from_column_sums() {
        let (block, matrix) = compressed_census(2000);
        let op = AggregateUnaryOperator::new(AggregateFn::Sum, IndexFunction::ReduceRow);

        let sums = matrix.unary_aggregate(&op).expect("colSums").to_row_major();
        let means: Vec<f64> = sums.iter().map(|s| s / block.rows() as f64).collect();

        let region_mean = means[0];
        assert!((1.0..=8.0).contains(&region_mean));
        assert!((means[2] - 10.0 * region_mean).abs() < 1e-9);
    }

    #[test]
    fn test_cbind_then_multiply() {
        let (block, matrix) = compressed_census(500);
        let extra = CompressedMatrix::new(block.slice_columns(&[1, 3]));

        let wide = matrix.append(&extra, BindDirection::Cbind, 2).expect("cbind");
        let v = MatrixBlock::column_vector(&[1.0; 7]);

        assert_eq!(wide.shape(), (500, 7));
        assert!(wide.is_compressed());
        let expected = block
            .append(&block.slice_columns(&[1, 3]), BindDirection::Cbind)
            .expect("plain cbind")
            .matrix_multiply(&v)
            .expect("reference");
        assert!(wide.right_multiply(&v, 2).expect("multiply").approx_eq(&expected, TOLERANCE));
    }
}

mod persistence {
    use super::*;

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("census.cla");
        let (block, matrix) = compressed_census(2000);

        matrix.write_file(&path).expect("write");
        let restored = CompressedMatrix::read_file(&path).expect("read");

        assert!(restored.is_compressed());
        assert_eq!(restored.column_groups().len(), matrix.column_groups().len());
        assert_eq!(
            restored.decompress(2).expect("decompress").to_row_major(),
            block.to_row_major()
        );
        let on_disk = std::fs::metadata(&path).expect("metadata").len();
        assert_eq!(on_disk as usize, matrix.exact_size_on_disk());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");

        let err = CompressedMatrix::read_file(dir.path().join("absent.cla"))
            .expect_err("file does not exist");

        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_corrupted_file_is_rejected() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("broken.cla");
        let (_, matrix) = compressed_census(500);
        let mut bytes = matrix.to_bytes().expect("serialize");
        bytes.truncate(bytes.len() / 2);
        std::fs::write(&path, &bytes).expect("write");

        let err = CompressedMatrix::read_file(&path).expect_err("truncated");

        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn test_config_file_drives_compression() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("cla.toml");
        std::fs::write(
            &path,
            "[compression]\nparallelism = 3\nallow_shared_dictionary = false\n",
        )
        .expect("write config");

        let config = ClaConfig::load_from_path(&path).expect("load");
        config.validate().expect("valid");
        let block = MatrixBlock::from_rows(&census_rows(800, 3)).expect("valid rows");
        let mut matrix = CompressedMatrix::new(block);
        matrix.compress(&config.compression).expect("compress");

        assert_eq!(config.compression.parallelism, 3);
        assert!(!matrix.shared_dictionary_active());
    }
}
