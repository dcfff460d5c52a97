//! The compression pipeline.
//!
//! transpose → classify → co-code → build → share → ratio check → cleanup.
//! Each phase is timed into [`CompressionStats`]. Aborting is a normal
//! outcome: the matrix stays uncompressed and keeps sharing its input.

use std::sync::Arc;

use tracing::{debug, info, trace};

use super::shared::share_dictionaries;
use super::{groups_size, CompressedMatrix, State};
use crate::cocode;
use crate::colgroup::{
    ColumnBitmap, ColumnGroup, ColumnSource, DdcGroup, EncodingKind, OleGroup, RleGroup,
    UncompressedGroup,
};
use crate::config::CompressionConfig;
use crate::error::{Error, Result};
use crate::estim::{ratio, CompressedSizeInfo, EstimationFactors, SizeEstimator};
use crate::matrix::MatrixBlock;
use crate::parallel::{round_robin, TaskPool};
use crate::stats::{CompressionStats, PhaseTimer};

/// Result of a `compress()` call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionOutcome {
    /// The matrix now holds column groups.
    Compressed,
    /// Compression was not worthwhile; the matrix is unchanged.
    Aborted {
        /// Why compression stopped.
        reason: String,
    },
}

enum Planned {
    Groups {
        groups: Vec<ColumnGroup>,
        shared: bool,
    },
    Abort(String),
}

impl CompressedMatrix {
    /// Compresses the wrapped matrix in place.
    ///
    /// # Errors
    ///
    /// Returns `RedundantCompression` if the matrix is already compressed,
    /// `Config` for an invalid configuration, and `TaskFailed` if a worker
    /// task fails.
    pub fn compress(&mut self, config: &CompressionConfig) -> Result<CompressionOutcome> {
        let block = match &self.state {
            State::Compressed { .. } => return Err(Error::RedundantCompression),
            State::Uncompressed(block) => Arc::clone(block),
        };
        config.validate()?;
        let pool = TaskPool::new(config.parallelism)?;
        let mut stats = CompressionStats::new(block.size_in_memory());

        let planned = if block.rows() == 0 || block.cols() == 0 {
            Planned::Abort("empty matrix".into())
        } else {
            plan_groups(&block, config, &pool, &mut stats)?
        };

        let (groups, shared) = match planned {
            Planned::Abort(reason) => {
                info!(rows = self.rows, cols = self.cols, %reason, "compression aborted");
                stats.aborted = Some(reason.clone());
                self.stats = Some(stats);
                return Ok(CompressionOutcome::Aborted { reason });
            }
            Planned::Groups { groups, shared } => (groups, shared),
        };

        let timer = PhaseTimer::start("cleanup");
        let mut groups: Vec<Arc<ColumnGroup>> = groups.into_iter().map(Arc::new).collect();
        groups.sort_by_key(|g| g.columns().first().copied());
        stats.record_groups(groups.iter().map(AsRef::as_ref));
        stats.compressed_size = groups_size(groups.iter().map(AsRef::as_ref));
        stats.shared_dictionary_active = shared;
        self.state = State::Compressed {
            groups,
            shared_dictionary_active: shared,
        };
        timer.finish(&mut stats);

        info!(
            rows = self.rows,
            cols = self.cols,
            groups = stats.num_groups(),
            ratio = stats.ratio(),
            "matrix compressed"
        );
        self.stats = Some(stats);
        Ok(CompressionOutcome::Compressed)
    }
}

/// Runs every phase up to the ratio check.
fn plan_groups(
    block: &Arc<MatrixBlock>,
    config: &CompressionConfig,
    pool: &TaskPool,
    stats: &mut CompressionStats,
) -> Result<Planned> {
    let (rows, cols) = block.shape();

    let timer = PhaseTimer::start("transpose");
    let transposed = config.transpose_input.then(|| block.transpose());
    let source = transposed
        .as_ref()
        .map_or_else(|| ColumnSource::row_major(block), ColumnSource::transposed);
    let elapsed = timer.finish(stats);
    debug!(transposed = transposed.is_some(), ms = elapsed.as_millis(), "transpose phase");

    let timer = PhaseTimer::start("classify");
    let estimator = SizeEstimator::new(source, config);
    let infos = estimator.estimate_columns(pool)?;
    let (compressible, mut uncompressed) = classify(&estimator, &infos);
    let elapsed = timer.finish(stats);
    debug!(
        compressible = compressible.len(),
        uncompressed = uncompressed.len(),
        ms = elapsed.as_millis(),
        "classify phase"
    );
    if compressible.is_empty() {
        return Ok(Planned::Abort("no compressible columns".into()));
    }

    let timer = PhaseTimer::start("cocode");
    let plan = cocode::plan(&estimator, &compressible, &infos, config.cocode_bin_size);
    let elapsed = timer.finish(stats);
    debug!(groups = plan.len(), ms = elapsed.as_millis(), "cocode phase");

    let timer = PhaseTimer::start("build");
    let mut groups = Vec::with_capacity(plan.len() + 1);
    for (group, dropped) in build_groups(pool, &source, &plan, &infos, config.allow_ddc)? {
        groups.extend(group);
        uncompressed.extend(dropped);
    }
    if !uncompressed.is_empty() {
        uncompressed.sort_unstable();
        groups.push(ColumnGroup::Uncompressed(UncompressedGroup::from_source(
            block,
            uncompressed,
        )));
    }
    let elapsed = timer.finish(stats);
    debug!(groups = groups.len(), ms = elapsed.as_millis(), "build phase");

    let timer = PhaseTimer::start("share");
    let shared = config.allow_shared_dictionary && share_dictionaries(&mut groups)?;
    let elapsed = timer.finish(stats);
    debug!(shared, ms = elapsed.as_millis(), "share phase");

    let compressed_size = groups_size(groups.iter());
    let achieved = ratio(stats.original_size, compressed_size);
    if achieved <= 1.0 {
        return Ok(Planned::Abort(format!(
            "compression ratio {achieved:.3} does not exceed 1"
        )));
    }
    debug!(rows, cols, compressed_size, ratio = achieved, "compression planned");
    Ok(Planned::Groups { groups, shared })
}

/// Splits columns by estimated ratio, then promotes incompressible columns
/// that beat dense storage when the leftover block would be dense anyway.
fn classify(estimator: &SizeEstimator<'_>, infos: &[CompressedSizeInfo]) -> (Vec<usize>, Vec<usize>) {
    let (mut compressible, mut uncompressed): (Vec<usize>, Vec<usize>) =
        (0..infos.len()).partition(|&c| infos[c].ratio() > 1.0);
    let nnz: usize = uncompressed.iter().map(|&c| estimator.column_nnz(c)).sum();
    let rows = estimator.num_rows();
    if !uncompressed.is_empty() && !MatrixBlock::evaluate_sparse(rows, uncompressed.len(), nnz) {
        let dense = 8 * rows;
        uncompressed.retain(|&c| {
            let promote = ratio(dense, infos[c].min_size()) > 1.0;
            if promote {
                compressible.push(c);
            }
            !promote
        });
        compressible.sort_unstable();
    }
    (compressible, uncompressed)
}

type Built = (Option<ColumnGroup>, Vec<usize>);

fn build_groups(
    pool: &TaskPool,
    source: &ColumnSource<'_>,
    plan: &[Vec<usize>],
    infos: &[CompressedSizeInfo],
    allow_ddc: bool,
) -> Result<Vec<Built>> {
    let indices: Vec<usize> = (0..plan.len()).collect();
    let tasks: Vec<_> = round_robin(&indices, pool.threads())
        .into_iter()
        .map(|bucket| {
            move || -> Result<Vec<(usize, Built)>> {
                bucket
                    .into_iter()
                    .map(|i| Ok((i, build_group(source, plan[i].clone(), infos, allow_ddc)?)))
                    .collect()
            }
        })
        .collect();
    let mut built: Vec<(usize, Built)> = pool.run(tasks)?.into_iter().flatten().collect();
    built.sort_by_key(|(i, _)| *i);
    Ok(built.into_iter().map(|(_, b)| b).collect())
}

/// Encodes one planned group with its cheapest encoding.
///
/// While the exact ratio is not above 1, the column with the worst
/// single-column estimate is moved to the uncompressed pool.
fn build_group(
    source: &ColumnSource<'_>,
    mut columns: Vec<usize>,
    infos: &[CompressedSizeInfo],
    allow_ddc: bool,
) -> Result<Built> {
    let rows = source.rows();
    let mut dropped = Vec::new();
    while !columns.is_empty() {
        let bitmap = ColumnBitmap::extract(source, &columns, None);
        let info = CompressedSizeInfo::new(EstimationFactors::from_bitmap(&bitmap, rows), allow_ddc);
        if info.ratio() > 1.0 {
            let (kind, size) = info.best();
            trace!(columns = ?columns, %kind, size, "encoding column group");
            let group = match kind {
                EncodingKind::Ddc8 | EncodingKind::Ddc16 => {
                    ColumnGroup::Ddc(DdcGroup::from_bitmap(columns, rows, &bitmap)?)
                }
                EncodingKind::OffsetList => {
                    ColumnGroup::OffsetList(OleGroup::from_bitmap(columns, rows, bitmap))
                }
                EncodingKind::RunLength => {
                    ColumnGroup::RunLength(RleGroup::from_bitmap(columns, rows, bitmap))
                }
                EncodingKind::Uncompressed => {
                    dropped.extend(columns);
                    return Ok((None, dropped));
                }
            };
            return Ok((Some(group), dropped));
        }
        let worst = columns
            .iter()
            .enumerate()
            .min_by(|(_, &a), (_, &b)| infos[a].ratio().total_cmp(&infos[b].ratio()))
            .map_or(0, |(i, _)| i);
        trace!(column = columns[worst], "dropping column from co-coded group");
        dropped.push(columns.remove(worst));
    }
    Ok((None, dropped))
}
