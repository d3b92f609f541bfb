//! Worker entry point.
//!
//! One invocation handles one job:
//!
//! 1. read the job from the input stream
//! 2. load the worker configuration from the scratch directory
//! 3. move the input stream into the cancellation watcher
//! 4. sort the logs and run the updater
//! 5. write the new header and counts to the output stream
//!
//! Every failure aborts the job. Errors carry their kind until
//! [`WorkerError::exit_code`] turns them into a process exit status.

use crate::config::{ConfigError, WorkerConfig};
use crate::job::{write_results, Job, ProtocolError, SourceFile};
use crate::pipeline::Pipeline;
use crate::updater::{IndexUpdater, UpdateError, UpdateStats};
use crate::watcher::CancellationWatcher;
use std::io::{self, BufRead, Write};
use strata_views_core::codes::{self, store, THREAD_START_EXIT_BASE};
use strata_views_core::MergeMode;
use strata_views_durability::SortError;
use tracing::info;

/// Errors that end a job.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The job could not be read.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The configuration file is unreadable or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The watcher thread could not be started.
    #[error("Error starting stdin exit listener thread")]
    ThreadStart(#[source] io::Error),

    /// Sorting one of the logs failed.
    #[error("Error sorting {} file: {}", index.sort_label(), source.code())]
    Sort {
        /// Log that failed.
        index: SourceFile,
        /// Underlying sorter error.
        #[source]
        source: SortError,
    },

    /// The updater failed.
    #[error("{}", update_message(.0))]
    Update(UpdateError),

    /// The results could not be written.
    #[error("Error writing results: {0}")]
    Output(#[source] io::Error),
}

fn update_message(err: &UpdateError) -> String {
    err.diagnostic()
        .unwrap_or_else(|| format!("Error updating index: {}", err.code))
}

impl WorkerError {
    /// Failure-kind code for this error.
    pub fn code(&self) -> i32 {
        match self {
            WorkerError::Protocol(e) => e.code(),
            WorkerError::Config(ConfigError::Read { .. }) => store::READ,
            WorkerError::Config(_) => store::INVALID_ARGUMENTS,
            WorkerError::ThreadStart(e) => -e.raw_os_error().unwrap_or(1).abs(),
            WorkerError::Sort { source, .. } => source.code(),
            WorkerError::Update(e) => e.code,
            WorkerError::Output(_) => store::WRITE,
        }
    }

    /// Process exit status for this error.
    ///
    /// Thread-start failures land at 101 and above; every other error is
    /// mapped below 100.
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerError::ThreadStart(_) => THREAD_START_EXIT_BASE - self.code(),
            _ => codes::exit_status(self.code()),
        }
    }
}

/// Run one job, exiting the process if the parent cancels it.
pub fn run_worker<R, W, U>(
    mode: MergeMode,
    input: R,
    output: &mut W,
    updater: &mut U,
) -> Result<UpdateStats, WorkerError>
where
    R: BufRead + Send + 'static,
    W: Write,
    U: IndexUpdater + ?Sized,
{
    run_job(mode, input, output, updater, CancellationWatcher::spawn)
}

/// Run one job, calling `on_cancel` if the parent cancels it.
pub fn run_worker_with<R, W, U, F>(
    mode: MergeMode,
    input: R,
    output: &mut W,
    updater: &mut U,
    on_cancel: F,
) -> Result<UpdateStats, WorkerError>
where
    R: BufRead + Send + 'static,
    W: Write,
    U: IndexUpdater + ?Sized,
    F: FnOnce() + Send + 'static,
{
    run_job(mode, input, output, updater, |input| {
        CancellationWatcher::spawn_with(input, on_cancel)
    })
}

fn run_job<R, W, U, S>(
    mode: MergeMode,
    mut input: R,
    output: &mut W,
    updater: &mut U,
    start_watcher: S,
) -> Result<UpdateStats, WorkerError>
where
    R: BufRead + Send + 'static,
    W: Write,
    U: IndexUpdater + ?Sized,
    S: FnOnce(R) -> io::Result<CancellationWatcher>,
{
    let job = Job::read_from(&mut input)?;
    info!(
        ?mode,
        views = job.num_views(),
        batch_size = job.batch_size,
        "Read job"
    );

    let config = WorkerConfig::load(&job.scratch_dir)?;

    // The watcher owns the input from here on.
    let _watcher = start_watcher(input).map_err(WorkerError::ThreadStart)?;

    let result = Pipeline::new(mode, &config).run(&job, updater)?;
    write_results(output, &result).map_err(WorkerError::Output)?;
    Ok(result.stats)
}
