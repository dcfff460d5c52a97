//! Co-coding planner: which compressible columns share one group.
//!
//! Columns are sorted by estimated cardinality and cut into bins. Inside a
//! bin, groups start as singletons and the pair with the largest size
//! reduction is merged until no merge saves bytes. Estimates are memoized
//! by column set, so every set is estimated at most once.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::estim::{CompressedSizeInfo, SizeEstimator};

/// Partitions `columns` into co-coded groups.
///
/// `infos[c]` is the single-column estimate of column `c`. The result is
/// deterministic, covers `columns` exactly once, and each group is sorted.
#[must_use]
pub fn plan(
    estimator: &SizeEstimator<'_>,
    columns: &[usize],
    infos: &[CompressedSizeInfo],
    bin_size: usize,
) -> Vec<Vec<usize>> {
    let mut ordered = columns.to_vec();
    ordered.sort_by_key(|&c| (infos[c].cardinality(), c));

    let mut groups: Vec<Vec<usize>> = ordered
        .chunks(bin_size.max(1))
        .flat_map(|bin| merge_bin(estimator, bin, infos))
        .collect();
    groups.sort_by_key(|g| g.first().copied());
    groups
}

fn merge_bin(
    estimator: &SizeEstimator<'_>,
    bin: &[usize],
    infos: &[CompressedSizeInfo],
) -> Vec<Vec<usize>> {
    let mut memo: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
    let mut groups: Vec<(Vec<usize>, usize)> = bin
        .iter()
        .map(|&c| (vec![c], infos[c].min_size()))
        .collect();

    loop {
        let mut best: Option<(usize, usize, Vec<usize>, usize)> = None;
        let mut best_gain = 0i128;
        for i in 0..groups.len() {
            for j in i + 1..groups.len() {
                let merged: Vec<usize> = groups[i]
                    .0
                    .iter()
                    .chain(&groups[j].0)
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let size = *memo
                    .entry(merged.clone())
                    .or_insert_with(|| estimator.estimate(&merged).min_size());
                let gain = to_i128(groups[i].1) + to_i128(groups[j].1) - to_i128(size);
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((i, j, merged, size));
                }
            }
        }
        let Some((i, j, merged, size)) = best else {
            break;
        };
        trace!(columns = ?merged, gain = %best_gain, "merging co-coding candidates");
        groups.remove(j);
        groups[i] = (merged, size);
    }
    groups.into_iter().map(|(g, _)| g).collect()
}

fn to_i128(x: usize) -> i128 {
    i128::try_from(x).unwrap_or(i128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colgroup::ColumnSource;
    use crate::config::CompressionConfig;
    use crate::matrix::MatrixBlock;

    fn infos(estimator: &SizeEstimator<'_>) -> Vec<CompressedSizeInfo> {
        (0..estimator.num_cols()).map(|c| estimator.estimate(&[c])).collect()
    }

    #[test]
    fn test_constant_columns_are_merged() {
        // Arrange
        let m = MatrixBlock::from_rows(&[
            vec![1.0, 2.0, 1.0],
            vec![1.0, 2.0, 1.0],
            vec![1.0, 2.0, 2.0],
            vec![1.0, 2.0, 1.0],
        ])
        .expect("rows");
        let estimator = SizeEstimator::new(ColumnSource::row_major(&m), &CompressionConfig::default());
        let infos = infos(&estimator);

        // Act
        let groups = plan(&estimator, &[0, 1, 2], &infos, 32);

        // Assert
        assert_eq!(groups, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_duplicate_columns_are_merged() {
        let rows: Vec<Vec<f64>> = (0..8)
            .map(|i| {
                let x = f64::from(i % 3);
                vec![x + 1.0, f64::from(i) * 0.5, x + 1.0]
            })
            .collect();
        let m = MatrixBlock::from_rows(&rows).expect("rows");
        let estimator = SizeEstimator::new(ColumnSource::row_major(&m), &CompressionConfig::default());
        let infos = infos(&estimator);

        let groups = plan(&estimator, &[0, 2], &infos, 32);

        assert_eq!(groups, vec![vec![0, 2]]);
    }

    #[test]
    fn test_bins_limit_merging_and_cover_every_column() {
        let m = MatrixBlock::from_rows(&[vec![1.0; 6], vec![1.0; 6], vec![1.0; 6]]).expect("rows");
        let estimator = SizeEstimator::new(ColumnSource::row_major(&m), &CompressionConfig::default());
        let infos = infos(&estimator);

        let groups = plan(&estimator, &[0, 1, 2, 3, 4, 5], &infos, 2);

        assert_eq!(groups, vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
    }

    #[test]
    fn test_uncorrelated_columns_stay_apart() {
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![f64::from(i % 7), f64::from(i % 11)])
            .collect();
        let m = MatrixBlock::from_rows(&rows).expect("rows");
        let estimator = SizeEstimator::new(ColumnSource::row_major(&m), &CompressionConfig::default());
        let infos = infos(&estimator);

        let groups = plan(&estimator, &[0, 1], &infos, 32);

        assert_eq!(groups, vec![vec![0], vec![1]]);
    }
}
