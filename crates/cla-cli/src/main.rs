#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//! `cla` - compress numeric CSV matrices into the CLA binary format
//!
//! Usage:
//!   `cla compress ./data.csv ./data.cla --parallelism 4 --stats`
//!   `cla inspect ./data.cla --format json`
//!   `cla decompress ./data.cla ./restored.csv`

mod csv_io;
mod inspect;

use anyhow::{Context, Result};
use cla_core::{ClaConfig, CompressedMatrix, CompressionOutcome};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "cla")]
#[command(
    author,
    version,
    about = "CLA - lossless column-group compression for numeric matrices"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(long, global = true, default_value = "cla.toml", env = "CLA_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Output format of `inspect`
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a numeric CSV file
    Compress {
        /// Input CSV file
        input: PathBuf,

        /// Output matrix file
        output: PathBuf,

        /// Worker threads (overrides the configuration)
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Print compression statistics as JSON
        #[arg(long)]
        stats: bool,

        /// Skip the first CSV record
        #[arg(long)]
        header: bool,
    },

    /// Show shape, size and column groups of a matrix file
    Inspect {
        /// Matrix file
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Restore a matrix file to CSV
    Decompress {
        /// Matrix file
        file: PathBuf,

        /// Output CSV file
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ClaConfig::load_from_path(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    init_logging(&config.logging.level);

    match cli.command {
        Commands::Compress {
            input,
            output,
            parallelism,
            stats,
            header,
        } => {
            if let Some(threads) = parallelism {
                config.compression.parallelism = threads;
            }
            config.validate().context("Invalid configuration")?;
            compress(&config, &input, &output, stats, header)?;
        }
        Commands::Inspect { file, format } => {
            let matrix = CompressedMatrix::read_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let summary = inspect::MatrixSummary::of(&matrix);
            match format {
                OutputFormat::Table => println!("{}", inspect::render_table(&summary)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            }
        }
        Commands::Decompress { file, output } => {
            let start = Instant::now();
            let matrix = CompressedMatrix::read_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            csv_io::write_matrix(&output, &matrix)?;
            info!(
                rows = matrix.rows(),
                cols = matrix.cols(),
                ms = start.elapsed().as_millis(),
                "matrix decompressed"
            );
            println!(
                "Restored {} x {} matrix to {}",
                matrix.rows(),
                matrix.cols(),
                output.display()
            );
        }
    }

    Ok(())
}

fn compress(
    config: &ClaConfig,
    input: &Path,
    output: &Path,
    print_stats: bool,
    header: bool,
) -> Result<()> {
    let block = csv_io::read_matrix(input, header)?;
    let (rows, cols) = block.shape();
    info!(rows, cols, input = %input.display(), "matrix loaded");

    let mut matrix = CompressedMatrix::new(block);
    let outcome = matrix.compress(&config.compression)?;
    matrix
        .write_file(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    match &outcome {
        CompressionOutcome::Compressed => println!(
            "Compressed {} x {} matrix into {} groups -> {}",
            rows,
            cols,
            matrix.column_groups().len(),
            output.display()
        ),
        CompressionOutcome::Aborted { reason } => println!(
            "Stored {} x {} matrix uncompressed ({}) -> {}",
            rows,
            cols,
            reason,
            output.display()
        ),
    }
    if let Some(stats) = matrix.stats() {
        if print_stats {
            println!("{}", serde_json::to_string_pretty(stats)?);
        } else {
            println!("{stats}");
        }
    }
    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
