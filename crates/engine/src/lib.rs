//! View index update worker
//!
//! This crate drives one update job end to end:
//! - Job protocol: reading the job from the parent and writing results
//! - Cancellation watcher: owns the input after the job is read
//! - Pipeline: sorts every operation log, then runs the index updater
//! - Worker config: optional `strata-views.toml` in the scratch directory
//!
//! The worker is the only component that knows about:
//! - The parent process protocol
//! - Exit status mapping
//! - Ordering of sort and update phases

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod job;
pub mod pipeline;
pub mod updater;
pub mod watcher;
pub mod worker;

pub use config::{ConfigError, WorkerConfig, CONFIG_FILE_NAME};
pub use job::{write_results, Job, ProtocolError, SourceFile};
pub use pipeline::Pipeline;
pub use updater::{
    IndexUpdater, LogReplayUpdater, UpdateError, UpdateRequest, UpdateResult, UpdateStats,
};
pub use watcher::{read_sentinel, CancellationWatcher, EXIT_SENTINEL};
pub use worker::{run_worker, run_worker_with, WorkerError};

pub use strata_views_core::{codes, Collation, MergeMode, MergeRecord, Operation};
pub use strata_views_durability::{FileSorter, SortConfig};
