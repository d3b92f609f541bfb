//! Sorter configuration.

use serde::{Deserialize, Serialize};

/// Sorter configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Records held in memory per run (default: 100 000).
    ///
    /// Each full buffer is sorted and spilled to one run file in the
    /// scratch directory.
    pub buffer_records: usize,

    /// Maximum runs merged in one pass (default: 16).
    ///
    /// More runs than this are merged over several passes, bounding the
    /// number of files open at once.
    pub max_fan_in: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            buffer_records: 100_000,
            max_fan_in: 16,
        }
    }
}

impl SortConfig {
    /// Create a sorter configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set records per run (builder pattern).
    pub fn with_buffer_records(mut self, records: usize) -> Self {
        self.buffer_records = records;
        self
    }

    /// Set merge fan-in (builder pattern).
    pub fn with_max_fan_in(mut self, fan_in: usize) -> Self {
        self.max_fan_in = fan_in;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), SortConfigError> {
        if self.buffer_records == 0 {
            return Err(SortConfigError::EmptyBuffer);
        }
        if self.max_fan_in < 2 {
            return Err(SortConfigError::FanInTooSmall(self.max_fan_in));
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (tiny runs, narrow
    /// merges) so small inputs exercise multi-pass merging.
    pub fn for_testing() -> Self {
        SortConfig {
            buffer_records: 2,
            max_fan_in: 2,
        }
    }
}

/// Sorter configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SortConfigError {
    /// A run must hold at least one record.
    #[error("buffer_records must be at least 1")]
    EmptyBuffer,

    /// A merge needs at least two inputs to make progress.
    #[error("max_fan_in must be at least 2, got {0}")]
    FanInTooSmall(usize),
}
