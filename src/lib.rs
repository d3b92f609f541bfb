//! Strata views - sort and apply view index operation logs
//!
//! A worker process receives one job from its parent: a scratch directory,
//! the operation logs of an id index and its view indexes, a batch size and
//! the current index header. It sorts every log into index order with a
//! bounded-memory external sort, hands the sorted logs to an index updater
//! and reports the new header and counts back to the parent.
//!
//! # Quick Start
//!
//! ```ignore
//! use strata_views::{run_worker, LogReplayUpdater, MergeMode};
//!
//! let input = std::io::BufReader::new(std::io::stdin());
//! let mut output = std::io::stdout();
//! let stats = run_worker(
//!     MergeMode::IncrementalUpdate,
//!     input,
//!     &mut output,
//!     &mut LogReplayUpdater::new(),
//! )?;
//! ```

// Re-export the public API from strata-views-engine
pub use strata_views_engine::*;
