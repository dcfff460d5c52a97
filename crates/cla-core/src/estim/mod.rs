//! Sampling-based compressed size estimation.
//!
//! One row sample is drawn per compression and reused for every estimate,
//! so classification and co-coding cost O(sample × columns). Inputs with at
//! most `min_sample_rows` rows are estimated exactly.

mod size_info;


use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::colgroup::{count_runs, ColumnBitmap, ColumnSource};
use crate::config::CompressionConfig;
use crate::error::Result;
use crate::parallel::{round_robin, TaskPool};

pub use size_info::{CompressedSizeInfo, EstimationFactors};
pub(crate) use size_info::ratio;

/// Estimates compressed sizes of column sets of one input.
#[derive(Debug)]
pub struct SizeEstimator<'a> {
    source: ColumnSource<'a>,
    sample: Option<Vec<usize>>,
    column_nnz: Vec<usize>,
    allow_ddc: bool,
}

impl<'a> SizeEstimator<'a> {
    /// Draws the row sample and counts exact per-column non-zeros.
    #[must_use]
    pub fn new(source: ColumnSource<'a>, config: &CompressionConfig) -> Self {
        let rows = source.rows();
        let sample = if rows <= config.min_sample_rows {
            None
        } else {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss
            )]
            let size = ((rows as f64 * config.sampling_ratio).ceil() as usize)
                .max(config.min_sample_rows)
                .min(rows);
            let mut rng = StdRng::seed_from_u64(config.seed);
            let mut rows_drawn = rand::seq::index::sample(&mut rng, rows, size).into_vec();
            rows_drawn.sort_unstable();
            Some(rows_drawn)
        };
        let column_nnz = (0..source.cols()).map(|c| source.column_nnz(c)).collect();
        debug!(
            rows,
            sample_rows = sample.as_ref().map_or(rows, Vec::len),
            "size estimator ready"
        );
        Self {
            source,
            sample,
            column_nnz,
            allow_ddc: config.allow_ddc,
        }
    }

    /// Logical row count of the input.
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.source.rows()
    }

    /// Logical column count of the input.
    #[must_use]
    pub const fn num_cols(&self) -> usize {
        self.source.cols()
    }

    /// True if estimates are computed over all rows.
    #[must_use]
    pub const fn is_exact(&self) -> bool {
        self.sample.is_none()
    }

    /// Rows scanned per estimate.
    #[must_use]
    pub fn sample_size(&self) -> usize {
        self.sample.as_ref().map_or(self.num_rows(), Vec::len)
    }

    /// Exact non-zero count of a column.
    #[must_use]
    pub fn column_nnz(&self, col: usize) -> usize {
        self.column_nnz[col]
    }

    /// Whether DDC candidates are considered.
    #[must_use]
    pub const fn allow_ddc(&self) -> bool {
        self.allow_ddc
    }

    /// Estimates the sizes of `columns` stored as one group.
    #[must_use]
    pub fn estimate(&self, columns: &[usize]) -> CompressedSizeInfo {
        CompressedSizeInfo::new(self.factors(columns), self.allow_ddc)
    }

    /// Estimates every column on its own, in parallel over `pool`.
    ///
    /// # Errors
    ///
    /// Propagates the first failing estimation task.
    pub fn estimate_columns(&self, pool: &TaskPool) -> Result<Vec<CompressedSizeInfo>> {
        let columns: Vec<usize> = (0..self.num_cols()).collect();
        let tasks: Vec<_> = round_robin(&columns, pool.threads())
            .into_iter()
            .map(|bucket| {
                move || -> Result<Vec<(usize, CompressedSizeInfo)>> {
                    Ok(bucket.into_iter().map(|c| (c, self.estimate(&[c]))).collect())
                }
            })
            .collect();
        let mut infos: Vec<Option<CompressedSizeInfo>> = vec![None; self.num_cols()];
        for (c, info) in pool.run(tasks)?.into_iter().flatten() {
            infos[c] = Some(info);
        }
        Ok(infos.into_iter().flatten().collect())
    }

    fn factors(&self, columns: &[usize]) -> EstimationFactors {
        let rows = self.num_rows();
        let nnz: usize = columns.iter().map(|&c| self.column_nnz[c]).sum();
        let bitmap = ColumnBitmap::extract(&self.source, columns, self.sample.as_deref());
        let Some(sample) = self.sample.as_deref() else {
            let mut exact = EstimationFactors::from_bitmap(&bitmap, rows);
            exact.nnz = nnz;
            return exact;
        };

        #[allow(clippy::cast_precision_loss)]
        let scale = rows as f64 / sample.len() as f64;
        let max_column_nnz = columns.iter().map(|&c| self.column_nnz[c]).max().unwrap_or(0);
        let offsets = if columns.len() == 1 {
            nnz
        } else {
            scaled(bitmap.num_offsets(), scale).clamp(max_column_nnz, nnz.min(rows).max(max_column_nnz))
        };

        // Runs are counted over sample positions, then scaled like offsets.
        let sample_runs: usize = bitmap
            .offset_lists()
            .iter()
            .map(|list| {
                #[allow(clippy::cast_possible_truncation)]
                let positions: Vec<u32> = list
                    .iter()
                    .filter_map(|&r| sample.binary_search(&(r as usize)).ok())
                    .map(|p| p as u32)
                    .collect();
                count_runs(&positions)
            })
            .sum();

        let frequencies = bitmap.offset_lists().iter().map(Vec::len);
        let values = if offsets == 0 {
            0
        } else {
            gee_distinct(frequencies, sample.len(), rows)
                .max(bitmap.num_values())
                .min(offsets)
        };
        let runs = scaled(sample_runs, scale).min(offsets).max(values);
        EstimationFactors {
            num_cols: columns.len(),
            num_rows: rows,
            num_values: values,
            num_offsets: offsets,
            num_runs: runs,
            nnz,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn scaled(count: usize, scale: f64) -> usize {
    (count as f64 * scale).round() as usize
}

/// Guaranteed-error estimator of the distinct count.
///
/// `sqrt(n / q) * f1 + sum_{j >= 2} f_j`, where `f_j` is the number of
/// tuples seen exactly `j` times in a sample of `q` out of `n` rows.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn gee_distinct(frequencies: impl Iterator<Item = usize>, sample_size: usize, rows: usize) -> usize {
    let (singletons, repeated) = frequencies.fold((0usize, 0usize), |(f1, rest), f| match f {
        0 => (f1, rest),
        1 => (f1 + 1, rest),
        _ => (f1, rest + 1),
    });
    if sample_size == 0 {
        return repeated + singletons;
    }
    let factor = (rows as f64 / sample_size as f64).sqrt();
    (factor * singletons as f64).round() as usize + repeated
}
