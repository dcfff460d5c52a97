//! Compression configuration.
//!
//! Replaces process-wide toggles with an explicit [`CompressionConfig`] value
//! handed to [`crate::CompressedMatrix::compress`]. The CLI loads the wider
//! [`ClaConfig`] from `cla.toml` and `CLA_*` environment variables.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (builder methods, CLI flags)
//! 2. Environment variables (`CLA_*`, `__` separates sections)
//! 3. Configuration file (`cla.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Knobs for one `compress()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Fraction of rows sampled by the size estimator.
    pub sampling_ratio: f64,
    /// Inputs with at most this many rows are estimated exactly.
    pub min_sample_rows: usize,
    /// Seed of the sampling RNG.
    pub seed: u64,
    /// Scan a transposed copy of the input (column-major) while planning.
    pub transpose_input: bool,
    /// Allow dictionary-coded (DDC) groups.
    pub allow_ddc: bool,
    /// Allow the shared dictionary post-pass over single-column DDC groups.
    pub allow_shared_dictionary: bool,
    /// Number of columns per co-coding bin.
    pub cocode_bin_size: usize,
    /// Worker threads used by compression (1 = single-threaded).
    pub parallelism: usize,
    /// Reserved for a lossy encoding mode. Must stay `false`.
    pub lossy: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            sampling_ratio: 0.05,
            min_sample_rows: 2000,
            seed: 7,
            transpose_input: true,
            allow_ddc: true,
            allow_shared_dictionary: true,
            cocode_bin_size: 32,
            parallelism: 1,
            lossy: false,
        }
    }
}

impl CompressionConfig {
    /// Sets the sampling ratio.
    #[must_use]
    pub fn with_sampling_ratio(mut self, ratio: f64) -> Self {
        self.sampling_ratio = ratio;
        self
    }

    /// Sets the exact-estimation row threshold.
    #[must_use]
    pub fn with_min_sample_rows(mut self, rows: usize) -> Self {
        self.min_sample_rows = rows;
        self
    }

    /// Sets the sampling seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = threads;
        self
    }

    /// Enables or disables DDC groups.
    #[must_use]
    pub fn with_ddc(mut self, allow: bool) -> Self {
        self.allow_ddc = allow;
        self
    }

    /// Enables or disables the shared dictionary post-pass.
    #[must_use]
    pub fn with_shared_dictionary(mut self, allow: bool) -> Self {
        self.allow_shared_dictionary = allow;
        self
    }

    /// Enables or disables scanning a transposed copy of the input.
    #[must_use]
    pub fn with_transpose_input(mut self, transpose: bool) -> Self {
        self.transpose_input = transpose;
        self
    }

    /// Sets the co-coding bin size.
    #[must_use]
    pub fn with_cocode_bin_size(mut self, size: usize) -> Self {
        self.cocode_bin_size = size;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range or requests lossy mode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sampling_ratio > 0.0 && self.sampling_ratio <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "compression.sampling_ratio".to_string(),
                message: format!("value {} is out of range (0, 1]", self.sampling_ratio),
            });
        }
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                key: "compression.parallelism".to_string(),
                message: "value must be >= 1".to_string(),
            });
        }
        if self.cocode_bin_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "compression.cocode_bin_size".to_string(),
                message: "value must be >= 1".to_string(),
            });
        }
        if self.lossy {
            return Err(ConfigError::InvalidValue {
                key: "compression.lossy".to_string(),
                message: "lossy compression is not implemented".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive: error, warn, info, debug, trace.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClaConfig {
    /// Compression knobs.
    pub compression: CompressionConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl ClaConfig {
    /// Loads configuration from `cla.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("cla.toml")
    }

    /// Loads configuration from a specific file path, then the environment.
    ///
    /// A missing file is not an error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CLA_").split("__"))
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str))
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compression.validate()?;
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {valid_levels:?}",
                    self.logging.level
                ),
            });
        }
        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
