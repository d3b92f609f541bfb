//! Sort-then-update pipeline for one job.
//!
//! Logs are sorted one at a time, id log first and then each view log in
//! view order. The first failing sort aborts the job; later logs are left
//! untouched and the updater never runs.

use crate::config::WorkerConfig;
use crate::job::{Job, SourceFile};
use crate::updater::{IndexUpdater, UpdateError, UpdateRequest, UpdateResult};
use crate::worker::WorkerError;
use std::time::Instant;
use strata_views_core::MergeMode;
use strata_views_durability::FileSorter;
use tracing::{debug, info};

/// Runs the sort and update phases of a job on the calling thread.
#[derive(Debug, Clone)]
pub struct Pipeline {
    mode: MergeMode,
    config: WorkerConfig,
    sorter: FileSorter,
}

impl Pipeline {
    /// Create a pipeline for jobs in `mode`.
    pub fn new(mode: MergeMode, config: &WorkerConfig) -> Self {
        Pipeline {
            mode,
            config: config.clone(),
            sorter: FileSorter::new(config.sort.clone()),
        }
    }

    /// Sort every log of `job` in place.
    pub fn sort_logs(&self, job: &Job) -> Result<(), WorkerError> {
        let started = Instant::now();

        let stats = self
            .sorter
            .sort_id_log(&job.id_log, &job.scratch_dir, self.mode)
            .map_err(|source| WorkerError::Sort {
                index: SourceFile::IdBtree,
                source,
            })?;
        debug!(records = stats.records, runs = stats.runs, "Sorted id log");

        for (n, path) in job.view_logs.iter().enumerate() {
            let stats = self
                .sorter
                .sort_view_log(path, &job.scratch_dir, self.mode, self.config.collation)
                .map_err(|source| WorkerError::Sort {
                    index: SourceFile::ViewBtree(n),
                    source,
                })?;
            debug!(view = n, records = stats.records, runs = stats.runs, "Sorted view log");
        }

        info!(
            logs = job.num_views() + 1,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sorted operation logs"
        );
        Ok(())
    }

    /// Hand the sorted logs of `job` to `updater`.
    pub fn update<U>(&self, job: &Job, updater: &mut U) -> Result<UpdateResult, UpdateError>
    where
        U: IndexUpdater + ?Sized,
    {
        let request = UpdateRequest {
            mode: self.mode,
            collation: self.config.collation,
            view_names: &job.view_names,
            id_log: &job.id_log,
            view_logs: &job.view_logs,
            batch_size: job.batch_size,
            header: &job.header,
        };
        let result = updater.update(&request)?;
        info!(
            ids_inserted = result.stats.ids_inserted,
            ids_removed = result.stats.ids_removed,
            kvs_inserted = result.stats.kvs_inserted,
            kvs_removed = result.stats.kvs_removed,
            "Updated indexes"
        );
        Ok(result)
    }

    /// Sort all logs, then update.
    pub fn run<U>(&self, job: &Job, updater: &mut U) -> Result<UpdateResult, WorkerError>
    where
        U: IndexUpdater + ?Sized,
    {
        self.sort_logs(job)?;
        self.update(job, updater).map_err(WorkerError::Update)
    }
}
