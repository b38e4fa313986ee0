//! # Config — Fluid LSM tuning parameters
//!
//! The [`FluidOptions`] record carries the four knobs that select a shape in
//! the tiered/leveled continuum, plus the ambient sizes the rest of the
//! system derives everything from:
//!
//! | Field                   | Symbol | Meaning                                   |
//! |-------------------------|--------|-------------------------------------------|
//! | `size_ratio`            | T      | capacity ratio between consecutive levels |
//! | `lower_level_run_max`   | K      | max live runs at non-last levels          |
//! | `largest_level_run_max` | Z      | max live runs at the last level           |
//! | `buffer_size`           | B      | in-memory write buffer, bytes             |
//! | `entry_size`            | E      | key + value size, bytes                   |
//! | `bits_per_element`      | h      | default Bloom budget per key              |
//!
//! The six fields above are the persisted surface: they round-trip through a
//! JSON blob (`fluid_config.json` inside the DB directory) so that a database
//! built by one tool can be reopened by another with the same shape. The
//! bulk-load fields (`bulk_load_mode`, `num_entries`, `levels`, `file_size`)
//! are per-invocation and never serialized.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Name of the persisted configuration blob inside a DB directory.
pub const CONFIG_FILENAME: &str = "fluid_config.json";

/// Smallest supported entry size: a key must fit with room to spare.
pub const MIN_ENTRY_SIZE: usize = 32;

/// Errors surfaced while validating or persisting [`FluidOptions`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A parameter violates one of the documented invariants.
    #[error("invalid fluid configuration: {0}")]
    Invalid(String),

    /// The blob could not be read or written.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// The blob exists but is not valid JSON for this schema.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How a bulk load determines its target shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkLoadMode {
    /// Fill until roughly `num_entries` entries are placed.
    #[default]
    Entries,
    /// Fill exactly `levels` fluid levels to capacity.
    Levels,
}

/// Tuning parameters for the fluid compaction controller and its tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidOptions {
    /// Size ratio between consecutive fluid levels (T).
    pub size_ratio: f64,
    /// Maximum concurrent runs per non-last fluid level (K).
    pub lower_level_run_max: usize,
    /// Maximum concurrent runs at the last fluid level (Z).
    pub largest_level_run_max: usize,
    /// In-memory buffer size in bytes (B).
    pub buffer_size: usize,
    /// Entry size in bytes (E).
    pub entry_size: usize,
    /// Default Bloom filter budget, bits per key (h).
    pub bits_per_element: f64,

    /// Bulk-load target selection. Not persisted.
    #[serde(skip)]
    pub bulk_load_mode: BulkLoadMode,
    /// Target entry count when `bulk_load_mode == Entries`. Not persisted.
    #[serde(skip)]
    pub num_entries: usize,
    /// Target level count when `bulk_load_mode == Levels`. Not persisted.
    #[serde(skip)]
    pub levels: usize,
    /// Upper bound for generated run files in bytes. Not persisted.
    #[serde(skip, default = "unlimited_file_size")]
    pub file_size: u64,
}

fn unlimited_file_size() -> u64 {
    u64::MAX
}

impl Default for FluidOptions {
    fn default() -> Self {
        Self {
            size_ratio: 2.0,
            lower_level_run_max: 1,
            largest_level_run_max: 1,
            buffer_size: 1_048_576,
            entry_size: 8192,
            bits_per_element: 5.0,
            bulk_load_mode: BulkLoadMode::Entries,
            num_entries: 0,
            levels: 0,
            file_size: u64::MAX,
        }
    }
}

impl FluidOptions {
    /// Loads options from the JSON blob at `path`.
    ///
    /// A missing file is not an error: a warning is logged and defaults are
    /// returned, matching the behavior tools rely on when pointed at a fresh
    /// directory. A file that exists but fails to parse *is* an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using default fluid options");
            return Ok(Self::default());
        }
        let reader = BufReader::new(File::open(path)?);
        let opts: FluidOptions = serde_json::from_reader(reader)?;
        Ok(opts)
    }

    /// Writes the persisted fields to `path`, creating or truncating it.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Checks the documented invariants: `T >= 2`, `K >= 1`, `Z >= 1`,
    /// `E >= 32`, `B >= E`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size_ratio < 2.0 {
            return Err(ConfigError::Invalid(format!(
                "size_ratio must be >= 2 (got {})",
                self.size_ratio
            )));
        }
        if self.lower_level_run_max < 1 {
            return Err(ConfigError::Invalid(
                "lower_level_run_max must be >= 1".into(),
            ));
        }
        if self.largest_level_run_max < 1 {
            return Err(ConfigError::Invalid(
                "largest_level_run_max must be >= 1".into(),
            ));
        }
        if self.entry_size < MIN_ENTRY_SIZE {
            return Err(ConfigError::Invalid(format!(
                "entry_size must be >= {} bytes (got {})",
                MIN_ENTRY_SIZE, self.entry_size
            )));
        }
        if self.buffer_size < self.entry_size {
            return Err(ConfigError::Invalid(format!(
                "buffer_size ({}) must hold at least one entry ({})",
                self.buffer_size, self.entry_size
            )));
        }
        if self.bits_per_element <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "bits_per_element must be positive (got {})",
                self.bits_per_element
            )));
        }
        Ok(())
    }

    /// Entries that fit in one write buffer (`B / E`).
    #[must_use]
    pub fn entries_per_buffer(&self) -> usize {
        self.buffer_size / self.entry_size
    }
}
