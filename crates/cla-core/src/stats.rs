//! Diagnostics collected by one `compress()` call.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::colgroup::{ColumnGroup, EncodingKind};

/// Timing of one compression phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTiming {
    /// Phase name (`transpose`, `classify`, `cocode`, `build`, `share`, `cleanup`).
    pub phase: &'static str,
    /// Wall time in milliseconds.
    pub millis: f64,
}

/// Group and column counts of one encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncodingSummary {
    /// Number of groups.
    pub groups: usize,
    /// Columns covered by those groups.
    pub columns: usize,
    /// Estimated in-memory bytes of those groups.
    pub size: usize,
}

/// Read-only telemetry of a compression run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressionStats {
    /// Phase timings in execution order.
    pub phases: Vec<PhaseTiming>,
    /// Per-encoding summaries.
    pub encodings: BTreeMap<EncodingKind, EncodingSummary>,
    /// Estimated size of the uncompressed input.
    pub original_size: usize,
    /// Estimated size after compression (equal to the original when aborted).
    pub compressed_size: usize,
    /// Whether single-column DDC groups share one dictionary.
    pub shared_dictionary_active: bool,
    /// Reason compression was abandoned, if it was.
    pub aborted: Option<String>,
}

impl CompressionStats {
    /// Starts stats for an input of `original_size` bytes.
    #[must_use]
    pub fn new(original_size: usize) -> Self {
        Self {
            original_size,
            compressed_size: original_size,
            ..Self::default()
        }
    }

    /// Records a finished phase.
    pub fn record_phase(&mut self, phase: &'static str, elapsed: Duration) {
        self.phases.push(PhaseTiming {
            phase,
            millis: elapsed.as_secs_f64() * 1000.0,
        });
    }

    /// Tallies the final groups.
    pub fn record_groups<'a>(&mut self, groups: impl IntoIterator<Item = &'a ColumnGroup>) {
        self.encodings.clear();
        for g in groups {
            let entry = self.encodings.entry(g.kind()).or_default();
            entry.groups += 1;
            entry.columns += g.num_columns();
            entry.size += g.size_in_memory();
        }
    }

    /// Original over compressed size.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        crate::estim::ratio(self.original_size, self.compressed_size)
    }

    /// Total wall time of all phases in milliseconds.
    #[must_use]
    pub fn total_millis(&self) -> f64 {
        self.phases.iter().map(|p| p.millis).sum()
    }

    /// Number of column groups.
    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.encodings.values().map(|s| s.groups).sum()
    }
}

impl fmt::Display for CompressionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.aborted {
            return write!(f, "compression aborted: {reason}");
        }
        write!(
            f,
            "{} groups, {} -> {} bytes (ratio {:.2}) in {:.1} ms",
            self.num_groups(),
            self.original_size,
            self.compressed_size,
            self.ratio(),
            self.total_millis()
        )?;
        for (kind, s) in &self.encodings {
            write!(f, ", {kind}: {}/{}", s.groups, s.columns)?;
        }
        if self.shared_dictionary_active {
            f.write_str(", shared dictionary")?;
        }
        Ok(())
    }
}

/// Times a phase and records it when finished.
pub(crate) struct PhaseTimer {
    phase: &'static str,
    start: Instant,
}

impl PhaseTimer {
    pub(crate) fn start(phase: &'static str) -> Self {
        Self {
            phase,
            start: Instant::now(),
        }
    }

    pub(crate) fn finish(self, stats: &mut CompressionStats) -> Duration {
        let elapsed = self.start.elapsed();
        stats.record_phase(self.phase, elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_and_display() {
        let mut stats = CompressionStats::new(1000);
        stats.compressed_size = 250;
        stats.record_phase("classify", Duration::from_millis(2));
        stats.encodings.insert(
            EncodingKind::Ddc8,
            EncodingSummary {
                groups: 2,
                columns: 3,
                size: 250,
            },
        );

        assert!((stats.ratio() - 4.0).abs() < f64::EPSILON);
        assert_eq!(stats.num_groups(), 2);
        let text = stats.to_string();
        assert!(text.starts_with("2 groups, 1000 -> 250 bytes (ratio 4.00)"), "{text}");
        assert!(text.contains("DDC8: 2/3"));
    }

    #[test]
    fn test_aborted_display_and_json() {
        let mut stats = CompressionStats::new(64);
        stats.aborted = Some("no compressible columns".into());

        assert_eq!(stats.to_string(), "compression aborted: no compressible columns");
        let json = serde_json::to_value(&stats).expect("json");
        assert_eq!(json["original_size"], 64);
        assert_eq!(json["aborted"], "no compressible columns");
    }
}
