//! Error types for the compression engine.
//!
//! Every fallible operation in the crate returns [`Result`]. Error codes follow
//! the pattern `CLA-XXX` so they can be grepped in logs and CLI output.

use thiserror::Error;

/// Result type alias for compression operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compressing, operating on, or decoding matrices.
///
/// An aborted compression (ratio too low, nothing compressible) is not an
/// error; see [`crate::CompressionOutcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// `compress()` called on an already compressed matrix (CLA-001).
    #[error("[CLA-001] Redundant compression: matrix is already compressed")]
    RedundantCompression,

    /// Operator not supported on the compressed representation (CLA-002).
    #[error("[CLA-002] Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Malformed or truncated binary payload (CLA-003).
    #[error("[CLA-003] Deserialization error: {0}")]
    Deserialization(String),

    /// Operand shapes do not match (CLA-004).
    #[error(
        "[CLA-004] Dimension mismatch in {operation}: expected {}x{}, got {}x{}",
        expected.0, expected.1, actual.0, actual.1
    )]
    DimensionMismatch {
        /// Operation that rejected the operands.
        operation: &'static str,
        /// Expected shape as (rows, cols).
        expected: (usize, usize),
        /// Actual shape as (rows, cols).
        actual: (usize, usize),
    },

    /// Cell access outside the matrix (CLA-005).
    #[error("[CLA-005] Index ({row}, {col}) out of bounds for {rows}x{cols} matrix")]
    IndexOutOfBounds {
        /// Requested row.
        row: usize,
        /// Requested column.
        col: usize,
        /// Matrix rows.
        rows: usize,
        /// Matrix columns.
        cols: usize,
    },

    /// Column group violates its structural invariants (CLA-006).
    #[error("[CLA-006] Invalid column group: {0}")]
    InvalidColumnGroup(String),

    /// Configuration error (CLA-007).
    #[error("[CLA-007] Configuration error: {0}")]
    Config(String),

    /// IO error (CLA-008).
    #[error("[CLA-008] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A parallel task failed or panicked (CLA-009).
    #[error("[CLA-009] Parallel task failed: {0}")]
    TaskFailed(String),

    /// Reversed or out-of-range row or group range (CLA-010).
    #[error("[CLA-010] Invalid {what} range {start}..{end} for length {len}")]
    InvalidRange {
        /// What the range selects (`row`, `group`).
        what: &'static str,
        /// Range start.
        start: usize,
        /// Range end (exclusive).
        end: usize,
        /// Valid length.
        len: usize,
    },
}

impl Error {
    /// Returns the error code (e.g., "CLA-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RedundantCompression => "CLA-001",
            Self::UnsupportedOperation(_) => "CLA-002",
            Self::Deserialization(_) => "CLA-003",
            Self::DimensionMismatch { .. } => "CLA-004",
            Self::IndexOutOfBounds { .. } => "CLA-005",
            Self::InvalidColumnGroup(_) => "CLA-006",
            Self::Config(_) => "CLA-007",
            Self::Io(_) => "CLA-008",
            Self::TaskFailed(_) => "CLA-009",
            Self::InvalidRange { .. } => "CLA-010",
        }
    }

    /// Returns true if retrying the operation could succeed.
    ///
    /// Only IO failures qualify; everything else is an input or programming error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedOperation(what.into())
    }

    /// Checks that `start..end` is a valid half-open range inside `0..len`.
    pub(crate) fn check_range(
        what: &'static str,
        start: usize,
        end: usize,
        len: usize,
    ) -> Result<()> {
        if start > end || end > len {
            return Err(Self::InvalidRange {
                what,
                start,
                end,
                len,
            });
        }
        Ok(())
    }

    pub(crate) fn truncated(what: &str, needed: usize, remaining: usize) -> Self {
        Self::Deserialization(format!(
            "truncated {what}: needed {needed} bytes, {remaining} remaining"
        ))
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
