//! Numeric CSV reading and writing.
//!
//! Values are written with the shortest representation that parses back to
//! the same `f64`, so a compress/decompress cycle reproduces the input.

use anyhow::{Context, Result};
use cla_core::{CompressedMatrix, MatrixBlock, RowFormat};
use std::path::Path;

/// Reads a numeric CSV into a dense matrix block.
///
/// Every record must have the same number of fields. With `has_header` the
/// first record is skipped.
pub fn read_matrix(path: &Path, has_header: bool) -> Result<MatrixBlock> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut cols = 0;
    let mut rows = 0;
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV record {}", row + 1))?;
        if row == 0 {
            cols = record.len();
        }
        for (col, field) in record.iter().enumerate() {
            values.push(parse_value(field).with_context(|| {
                format!("Invalid value at row {}, column {}", row + 1, col + 1)
            })?);
        }
        rows += 1;
    }

    if rows == 0 || cols == 0 {
        anyhow::bail!("CSV file {} contains no values", path.display());
    }
    Ok(MatrixBlock::from_dense(rows, cols, values)?)
}

/// Writes a matrix as headerless CSV, one record per row.
///
/// Rows are streamed out of the column groups, so the matrix is never
/// decompressed as a whole.
pub fn write_matrix(path: &Path, matrix: &CompressedMatrix) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;

    let mut values = vec![0.0; matrix.cols()];
    let mut fields = Vec::with_capacity(matrix.cols());
    for (r, row) in matrix.row_iter_as(0, matrix.rows(), RowFormat::Dense)?.enumerate() {
        row.fill_dense(&mut values);
        fields.clear();
        fields.extend(values.iter().map(ToString::to_string));
        writer
            .write_record(&fields)
            .with_context(|| format!("Failed to write CSV record {}", r + 1))?;
    }
    writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Parses one field; an empty field is rejected rather than read as zero.
pub fn parse_value(field: &str) -> Result<f64> {
    if field.is_empty() {
        anyhow::bail!("empty field");
    }
    field
        .parse::<f64>()
        .with_context(|| format!("'{field}' is not a number"))
}

#[cfg(test)]
#[path = "csv_io_tests.rs"]
mod tests;
