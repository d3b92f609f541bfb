//! External sort/merge of operation log files.
//!
//! Logs are produced out of order and must reach the index updater sorted
//! by the index's key order. The sorter works in bounded memory: it spills
//! sorted runs to the scratch directory and merges them.
//!
//! # Usage
//!
//! ```ignore
//! use strata_views_durability::sort::{FileSorter, SortConfig};
//!
//! let sorter = FileSorter::new(SortConfig::default());
//! sorter.sort_id_log(&id_log, &scratch_dir, MergeMode::IncrementalUpdate)?;
//! ```

mod config;
mod sorter;

pub use config::{SortConfig, SortConfigError};
pub use sorter::{FileSorter, SortError, SortStats};
