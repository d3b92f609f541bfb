//! Worker configuration via `strata-views.toml`
//!
//! The parent process owns the scratch directory. If it places a
//! `strata-views.toml` there, the worker reads sorter tuning and the view
//! collation from it. Without the file every setting takes its default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_views_core::Collation;
use strata_views_durability::{SortConfig, SortConfigError};

/// Config file name looked up in the scratch directory.
pub const CONFIG_FILE_NAME: &str = "strata-views.toml";

/// Worker configuration loaded from `strata-views.toml`.
///
/// # Example
///
/// ```toml
/// # "unicode" (default) or "raw"
/// collation = "unicode"
///
/// [sort]
/// buffer_records = 100000
/// max_fan_in = 16
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// String collation for view keys.
    pub collation: Collation,
    /// External sort tuning.
    pub sort: SortConfig,
}

/// Errors from loading the worker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this configuration.
    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// The settings parse but are out of range.
    #[error("Invalid sort settings: {0}")]
    Invalid(#[from] SortConfigError),
}

impl WorkerConfig {
    /// Load configuration from `scratch_dir`, falling back to defaults when
    /// no config file is present.
    pub fn load(scratch_dir: &Path) -> Result<Self, ConfigError> {
        let path = scratch_dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: WorkerConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sort.validate()?;
        Ok(())
    }

    /// Set the collation (builder pattern).
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    /// Set the sorter configuration (builder pattern).
    pub fn with_sort(mut self, sort: SortConfig) -> Self {
        self.sort = sort;
        self
    }

    /// Configuration with tiny sort runs, so small test inputs go through
    /// multi-pass merges.
    pub fn for_testing() -> Self {
        WorkerConfig {
            collation: Collation::Unicode,
            sort: SortConfig::for_testing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = WorkerConfig::load(dir.path()).unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.collation, Collation::Unicode);
    }

    #[test]
    fn test_load_full_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "collation = \"raw\"\n\n[sort]\nbuffer_records = 64\nmax_fan_in = 4\n",
        )
        .unwrap();

        let config = WorkerConfig::load(dir.path()).unwrap();
        assert_eq!(config.collation, Collation::Raw);
        assert_eq!(config.sort.buffer_records, 64);
        assert_eq!(config.sort.max_fan_in, 4);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[sort]\nmax_fan_in = 8\n",
        )
        .unwrap();

        let config = WorkerConfig::load(dir.path()).unwrap();
        assert_eq!(config.collation, Collation::Unicode);
        assert_eq!(config.sort.max_fan_in, 8);
        assert_eq!(
            config.sort.buffer_records,
            SortConfig::default().buffer_records
        );
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "collation = [").unwrap();
        let err = WorkerConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[sort]\nmax_fan_in = 1\n",
        )
        .unwrap();
        let err = WorkerConfig::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(SortConfigError::FanInTooSmall(1))
        ));
    }

    #[test]
    fn test_builder_pattern() {
        let config = WorkerConfig::default()
            .with_collation(Collation::Raw)
            .with_sort(SortConfig::for_testing());
        assert_eq!(config.collation, Collation::Raw);
        assert_eq!(config, WorkerConfig::for_testing().with_collation(Collation::Raw));
    }
}
