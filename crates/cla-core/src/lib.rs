//! # CLA Core
//!
//! Lossless column-group compression for numeric matrices, with linear
//! algebra executed directly on the compressed representation.
//!
//! A matrix is split into disjoint groups of columns. Each group is stored
//! under the cheapest of four encodings: raw values, dense dictionary codes
//! (DDC), offset lists (OLE) or run lengths (RLE). Columns whose values
//! co-occur are co-coded into one group.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cla_core::{CompressedMatrix, CompressionConfig, CompressionOutcome, MatrixBlock};
//!
//! let block = MatrixBlock::from_rows(&rows)?;
//! let mut matrix = CompressedMatrix::new(block);
//! if let CompressionOutcome::Compressed = matrix.compress(&CompressionConfig::default())? {
//!     println!("{}", matrix.stats().unwrap());
//! }
//!
//! let v = MatrixBlock::column_vector(&weights);
//! let xv = matrix.right_multiply(&v, 4)?;
//! let back = matrix.decompress(4)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // row counts feed f64 ratios
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::float_cmp)] // exact zero tests on stored values
#![allow(clippy::many_single_char_names)]
#![allow(clippy::similar_names)]

mod codec;
pub mod cocode;
pub mod colgroup;
pub mod config;
pub mod engine;
pub mod error;
pub mod estim;
pub mod kahan;
pub mod matrix;
pub mod operators;
pub mod parallel;
pub mod stats;


pub use config::{ClaConfig, CompressionConfig, ConfigError, LoggingConfig};
pub use engine::{CompressedMatrix, CompressionOutcome, MatrixRow, RowFormat};
pub use error::{Error, Result};
pub use matrix::{MatrixBlock, SparseRow};
pub use operators::{
    AggregateFn, AggregateUnaryOperator, BindDirection, ChainType, IndexFunction, ScalarFn,
    ScalarOperator, TsmmType,
};
pub use stats::CompressionStats;
