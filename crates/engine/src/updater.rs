//! Index updater seam.
//!
//! The updater consumes the sorted logs and applies them to the on-disk
//! index, producing a new header. Anything that mutates index pages plugs in
//! here through [`IndexUpdater`].
//!
//! [`LogReplayUpdater`] is the built-in implementation. It replays every
//! sorted log batch by batch, checks that each log really is in index order,
//! and tallies the inserts and removals it would apply. It writes no pages,
//! so the header it returns is the previous header unchanged.

use std::path::{Path, PathBuf};
use strata_views_core::codes::store;
use strata_views_core::{Collation, MergeContext, MergeMode, MergeRecord, Operation};
use strata_views_durability::{CodecError, RecordReader};
use tracing::debug;

/// Everything an updater needs for one job.
#[derive(Debug, Clone, Copy)]
pub struct UpdateRequest<'a> {
    /// Mode the logs were written in.
    pub mode: MergeMode,
    /// Collation the view logs are sorted with.
    pub collation: Collation,
    /// View index names, in view order.
    pub view_names: &'a [String],
    /// Sorted id index log.
    pub id_log: &'a Path,
    /// Sorted view index logs, in view order.
    pub view_logs: &'a [PathBuf],
    /// Records applied per batch.
    pub batch_size: usize,
    /// Index header before the update.
    pub header: &'a [u8],
}

/// Counts reported back to the parent process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Entries added to the id index.
    pub ids_inserted: u64,
    /// Entries removed from the id index.
    pub ids_removed: u64,
    /// Entries added to view indexes.
    pub kvs_inserted: u64,
    /// Entries removed from view indexes.
    pub kvs_removed: u64,
    /// Entries purged because their documents are gone.
    pub purged: u64,
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    /// Index header after the update.
    pub header: Vec<u8>,
    /// What the update did.
    pub stats: UpdateStats,
}

/// A failed update, with optional index-specific diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Index update failed with code {code}")]
pub struct UpdateError {
    /// Store failure-kind code.
    pub code: i32,
    /// Index the failure happened in, if known.
    pub index_name: Option<String>,
    /// Reason for the failure, if known.
    pub message: Option<String>,
}

impl UpdateError {
    /// Create an error with a code only.
    pub fn new(code: i32) -> Self {
        UpdateError {
            code,
            index_name: None,
            message: None,
        }
    }

    /// Attach the index name.
    pub fn in_index(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    /// Attach a reason.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The diagnostic line for the error output, when both the index name
    /// and the reason are known.
    pub fn diagnostic(&self) -> Option<String> {
        match (&self.index_name, &self.message) {
            (Some(name), Some(message)) => Some(format!(
                "Error updating index for view `{}`, reason: {}",
                name, message
            )),
            _ => None,
        }
    }
}

/// Applies sorted operation logs to an index group.
pub trait IndexUpdater {
    /// Apply the logs named in `request`.
    fn update(&mut self, request: &UpdateRequest<'_>) -> Result<UpdateResult, UpdateError>;
}

/// Replays sorted logs without touching index pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReplayUpdater;

impl LogReplayUpdater {
    /// Create the updater.
    pub fn new() -> Self {
        LogReplayUpdater
    }
}

/// Per-log insert/remove counts.
#[derive(Debug, Default, Clone, Copy)]
struct LogCounts {
    inserted: u64,
    removed: u64,
}

/// Name used for the id index in diagnostics.
const ID_INDEX_NAME: &str = "id_btree";

impl IndexUpdater for LogReplayUpdater {
    fn update(&mut self, request: &UpdateRequest<'_>) -> Result<UpdateResult, UpdateError> {
        let mut stats = UpdateStats::default();

        let ids = replay_log(
            request.id_log,
            &MergeContext::primary(request.mode),
            request.batch_size,
        )
        .map_err(|e| e.in_index(ID_INDEX_NAME))?;
        stats.ids_inserted = ids.inserted;
        stats.ids_removed = ids.removed;

        let ctx = MergeContext::secondary(request.mode, request.collation);
        for (n, path) in request.view_logs.iter().enumerate() {
            let name = request
                .view_names
                .get(n)
                .cloned()
                .unwrap_or_else(|| format!("view_{}", n));
            let kvs = replay_log(path, &ctx, request.batch_size).map_err(|e| e.in_index(name))?;
            stats.kvs_inserted += kvs.inserted;
            stats.kvs_removed += kvs.removed;
        }

        Ok(UpdateResult {
            header: request.header.to_vec(),
            stats,
        })
    }
}

fn codec_failure(err: CodecError) -> UpdateError {
    let code = if err.is_alloc() {
        store::ALLOC_FAIL
    } else {
        store::READ
    };
    UpdateError::new(code).with_message(err.to_string())
}

fn replay_log(
    path: &Path,
    ctx: &MergeContext,
    batch_size: usize,
) -> Result<LogCounts, UpdateError> {
    let mut reader = RecordReader::open(path, ctx.mode()).map_err(|e| {
        UpdateError::new(store::OPEN_FILE)
            .with_message(format!("cannot open {}: {}", path.display(), e))
    })?;

    let mut counts = LogCounts::default();
    let mut previous: Option<MergeRecord> = None;
    let mut position = 0u64;
    let mut batch = Vec::with_capacity(batch_size.min(4096));

    loop {
        batch.clear();
        while batch.len() < batch_size {
            match reader.next_record().map_err(codec_failure)? {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        for record in batch.drain(..) {
            if let Some(prev) = &previous {
                if ctx.compare_records(prev, &record).is_gt() {
                    return Err(UpdateError::new(store::CORRUPT).with_message(format!(
                        "operation log {} is not sorted at record {}",
                        path.display(),
                        position
                    )));
                }
            }
            apply(&mut counts, ctx.mode(), &record)?;
            previous = Some(record);
            position += 1;
        }
        debug!(path = %path.display(), applied = position, "Applied batch");
    }

    Ok(counts)
}

fn apply(counts: &mut LogCounts, mode: MergeMode, record: &MergeRecord) -> Result<(), UpdateError> {
    match (mode, record.operation()) {
        (MergeMode::InitialBuild, _) | (MergeMode::IncrementalUpdate, Some(Operation::Put)) => {
            counts.inserted += 1
        }
        (MergeMode::IncrementalUpdate, Some(Operation::Delete)) => counts.removed += 1,
        (MergeMode::IncrementalUpdate, Some(Operation::Other(tag))) => {
            return Err(UpdateError::new(store::INVALID_ARGUMENTS)
                .with_message(format!("unknown operation tag {}", tag)))
        }
        (MergeMode::IncrementalUpdate, None) => {
            return Err(UpdateError::new(store::INVALID_ARGUMENTS)
                .with_message("record without operation in incremental log"))
        }
    }
    Ok(())
}
