//! Summaries of a stored matrix for the `inspect` command.

use cla_core::{CompressedMatrix, MatrixBlock};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

/// One column group as shown by `inspect`.
#[derive(Debug, Serialize)]
pub struct GroupSummary {
    pub encoding: String,
    pub columns: Vec<usize>,
    pub distinct_values: usize,
    pub size_in_memory: usize,
}

/// Everything `inspect` reports about a matrix.
#[derive(Debug, Serialize)]
pub struct MatrixSummary {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
    pub compressed: bool,
    pub shared_dictionary: bool,
    pub uncompressed_size: usize,
    pub in_memory_size: usize,
    pub ratio: f64,
    pub size_on_disk: usize,
    pub groups: Vec<GroupSummary>,
}

impl MatrixSummary {
    pub fn of(matrix: &CompressedMatrix) -> Self {
        let (rows, cols) = matrix.shape();
        let uncompressed_size = MatrixBlock::estimate_size_in_memory(rows, cols, matrix.nnz());
        let in_memory_size = matrix.in_memory_size();
        let groups = matrix
            .column_groups()
            .iter()
            .map(|g| GroupSummary {
                encoding: g.kind().to_string(),
                columns: g.columns().to_vec(),
                distinct_values: g.num_values(),
                size_in_memory: g.size_in_memory(),
            })
            .collect();
        Self {
            rows,
            cols,
            nnz: matrix.nnz(),
            compressed: matrix.is_compressed(),
            shared_dictionary: matrix.shared_dictionary_active(),
            uncompressed_size,
            in_memory_size,
            ratio: ratio(uncompressed_size, in_memory_size),
            size_on_disk: matrix.exact_size_on_disk(),
            groups,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(original: usize, compressed: usize) -> f64 {
    if compressed == 0 {
        return 1.0;
    }
    original as f64 / compressed as f64
}

/// Renders the overview and the group list as two tables.
pub fn render_table(summary: &MatrixSummary) -> String {
    let mut overview = Table::new();
    overview
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Property"), Cell::new("Value")]);
    let rows: [(&str, String); 8] = [
        ("Shape", format!("{} x {}", summary.rows, summary.cols)),
        ("Non-zeros", summary.nnz.to_string()),
        ("Compressed", summary.compressed.to_string()),
        ("Shared dictionary", summary.shared_dictionary.to_string()),
        ("Uncompressed size", format!("{} B", summary.uncompressed_size)),
        ("In-memory size", format!("{} B", summary.in_memory_size)),
        ("Ratio", format!("{:.2}", summary.ratio)),
        ("Size on disk", format!("{} B", summary.size_on_disk)),
    ];
    for (name, value) in rows {
        overview.add_row(vec![Cell::new(name), Cell::new(value)]);
    }

    if summary.groups.is_empty() {
        return overview.to_string();
    }

    let mut groups = Table::new();
    groups
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Encoding", "Columns", "Distinct", "Size (B)"]);
    for (i, g) in summary.groups.iter().enumerate() {
        groups.add_row(vec![
            Cell::new(i).set_alignment(CellAlignment::Right),
            Cell::new(&g.encoding),
            Cell::new(format_columns(&g.columns)),
            Cell::new(g.distinct_values).set_alignment(CellAlignment::Right),
            Cell::new(g.size_in_memory).set_alignment(CellAlignment::Right),
        ]);
    }
    format!("{overview}\n{groups}")
}

/// Collapses consecutive column indexes into ranges: `0-3, 7, 9-10`.
pub fn format_columns(columns: &[usize]) -> String {
    let mut parts = Vec::new();
    let mut iter = columns.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cla_core::CompressionConfig;

    fn sample() -> CompressedMatrix {
        let rows: Vec<Vec<f64>> = (0..400)
            .map(|i| vec![f64::from(i % 3), f64::from(i % 3) * 2.0, f64::from(i % 5)])
            .collect();
        let mut matrix = CompressedMatrix::new(MatrixBlock::from_rows(&rows).unwrap());
        matrix.compress(&CompressionConfig::default()).unwrap();
        matrix
    }

    #[test]
    fn test_format_columns_ranges() {
        assert_eq!(format_columns(&[0, 1, 2, 3, 7, 9, 10]), "0-3, 7, 9-10");
        assert_eq!(format_columns(&[4]), "4");
        assert_eq!(format_columns(&[]), "");
    }

    #[test]
    fn test_summary_of_compressed_matrix() {
        let matrix = sample();

        let summary = MatrixSummary::of(&matrix);

        assert!(summary.compressed);
        assert_eq!((summary.rows, summary.cols), (400, 3));
        assert!(summary.ratio > 1.0);
        let covered: usize = summary.groups.iter().map(|g| g.columns.len()).sum();
        assert_eq!(covered, 3);
    }

    #[test]
    fn test_summary_of_uncompressed_matrix() {
        let matrix = CompressedMatrix::new(MatrixBlock::zeros(3, 2));

        let summary = MatrixSummary::of(&matrix);

        assert!(!summary.compressed);
        assert!(summary.groups.is_empty());
        assert!(!render_table(&summary).contains("Encoding"));
    }

    #[test]
    fn test_render_table_lists_groups() {
        let summary = MatrixSummary::of(&sample());

        let rendered = render_table(&summary);

        assert!(rendered.contains("Encoding"));
        assert!(rendered.contains("400 x 3"));
    }

    #[test]
    fn test_summary_serializes_to_json() {
        let summary = MatrixSummary::of(&sample());

        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["rows"], 400);
        assert!(json["groups"].is_array());
    }
}
