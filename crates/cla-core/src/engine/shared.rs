//! Shared dictionary post-pass over single-column DDC8 groups.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::colgroup::{value_key, ColumnGroup, Dictionary, MAX_BYTE_VALUES};
use crate::error::Result;

/// Recodes every single-column DDC8 group against one union dictionary.
///
/// Fires only for at least two candidates whose value union fits byte codes,
/// keeping one slot for zero when no group stores it. Returns whether the
/// groups now share a dictionary.
pub(crate) fn share_dictionaries(groups: &mut [ColumnGroup]) -> Result<bool> {
    let candidates: Vec<usize> = groups
        .iter()
        .enumerate()
        .filter(|(_, g)| g.is_single_column_ddc8())
        .map(|(i, _)| i)
        .collect();
    if candidates.len() < 2 {
        return Ok(false);
    }

    let mut lookup: FxHashMap<u64, usize> = FxHashMap::default();
    let mut values = Vec::new();
    for &i in &candidates {
        let Some(dict) = groups[i].dictionary() else {
            continue;
        };
        for &x in dict.values() {
            lookup.entry(value_key(x)).or_insert_with(|| {
                values.push(if x == 0.0 { 0.0 } else { x });
                values.len() - 1
            });
        }
    }
    let has_zero = lookup.contains_key(&value_key(0.0));
    let limit = if has_zero { MAX_BYTE_VALUES } else { MAX_BYTE_VALUES - 1 };
    if values.len() > limit {
        debug!(
            distinct = values.len(),
            limit, "value union too large for a shared dictionary"
        );
        return Ok(false);
    }
    if !has_zero {
        lookup.insert(value_key(0.0), values.len());
        values.push(0.0);
    }

    let shared = Dictionary::new(values);
    for &i in &candidates {
        let recoded = match &groups[i] {
            ColumnGroup::Ddc(g) => g.recode(&shared, &lookup)?,
            _ => continue,
        };
        groups[i] = ColumnGroup::Ddc(recoded);
    }
    debug!(
        groups = candidates.len(),
        values = shared.len(),
        "single-column DDC groups share one dictionary"
    );
    Ok(true)
}
