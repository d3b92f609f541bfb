//! External sort of a record file.
//!
//! The input is read in batches of `buffer_records`. Each batch is sorted in
//! memory and spilled to a run file in the scratch directory. Runs are then
//! merged with a min-heap, at most `max_fan_in` at a time, until one run is
//! left; that run replaces the input file.
//!
//! The sort is stable: records comparing equal leave in the order they were
//! read. Batches are stable-sorted, and heap ties go to the earlier run.
//!
//! Run files are `NamedTempFile`s, so they are removed on every exit path,
//! including errors.

use super::config::{SortConfig, SortConfigError};
use crate::format::merge_record::{CodecError, RecordReader, RecordWriter};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use strata_views_core::codes::sorter;
use strata_views_core::{Collation, MergeContext, MergeMode, MergeRecord};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info};

/// Prefix of run files created in the scratch directory.
const RUN_FILE_PREFIX: &str = "strata-views-run-";

/// Errors from sorting a file.
#[derive(Debug, thiserror::Error)]
pub enum SortError {
    /// Sorter configuration is invalid.
    #[error("Invalid sorter configuration: {0}")]
    BadArg(#[from] SortConfigError),

    /// Could not open the input or a run file.
    #[error("Cannot open {}: {source}", path.display())]
    OpenFile {
        /// File that failed to open
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Could not create a run file.
    #[error("Cannot create run file in {}: {source}", dir.display())]
    TmpFile {
        /// Scratch directory
        dir: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Could not move the sorted output over the input.
    #[error("Cannot replace {} with sorted output: {source}", path.display())]
    RenameFile {
        /// Input file being replaced
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A record could not be read or written.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl SortError {
    /// Sorter failure-kind code for this error.
    pub fn code(&self) -> i32 {
        match self {
            SortError::BadArg(_) => sorter::BAD_ARG,
            SortError::OpenFile { .. } => sorter::OPEN_FILE,
            SortError::TmpFile { .. } => sorter::TMP_FILE,
            SortError::RenameFile { .. } => sorter::RENAME_FILE,
            SortError::Codec(e) => e.code(),
        }
    }
}

/// Outcome of sorting one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Records in the file.
    pub records: u64,
    /// Runs spilled to the scratch directory.
    pub runs: usize,
    /// Merge passes over those runs.
    pub merge_passes: usize,
}

/// Sorts record files in place.
#[derive(Debug, Clone, Default)]
pub struct FileSorter {
    config: SortConfig,
}

impl FileSorter {
    /// Create a sorter.
    pub fn new(config: SortConfig) -> Self {
        FileSorter { config }
    }

    /// Sort the id index log at `path`.
    pub fn sort_id_log(
        &self,
        path: &Path,
        scratch_dir: &Path,
        mode: MergeMode,
    ) -> Result<SortStats, SortError> {
        self.sort_file(path, scratch_dir, &MergeContext::primary(mode))
    }

    /// Sort a view index log at `path`.
    pub fn sort_view_log(
        &self,
        path: &Path,
        scratch_dir: &Path,
        mode: MergeMode,
        collation: Collation,
    ) -> Result<SortStats, SortError> {
        self.sort_file(path, scratch_dir, &MergeContext::secondary(mode, collation))
    }

    /// Sort the record file at `path` in place, spilling runs to `scratch_dir`.
    pub fn sort_file(
        &self,
        path: &Path,
        scratch_dir: &Path,
        ctx: &MergeContext,
    ) -> Result<SortStats, SortError> {
        self.config.validate()?;

        let mut reader =
            RecordReader::open(path, ctx.mode()).map_err(|source| SortError::OpenFile {
                path: path.to_path_buf(),
                source,
            })?;

        let mut stats = SortStats::default();
        let mut runs = Vec::new();
        loop {
            let mut batch = Vec::with_capacity(self.config.buffer_records.min(4096));
            while batch.len() < self.config.buffer_records {
                match reader.next_record()? {
                    Some(record) => batch.push(record),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            stats.records += batch.len() as u64;
            let exhausted = batch.len() < self.config.buffer_records;

            ctx.sort_records(&mut batch);
            runs.push(self.write_run(scratch_dir, ctx.mode(), &batch)?);
            debug!(run = runs.len(), records = batch.len(), "Spilled sorted run");

            if exhausted {
                break;
            }
        }
        drop(reader);
        stats.runs = runs.len();

        if runs.is_empty() {
            // Nothing to reorder; an empty file is already sorted.
            return Ok(stats);
        }

        while runs.len() > 1 {
            runs = self.merge_pass(runs, scratch_dir, ctx)?;
            stats.merge_passes += 1;
        }

        if let Some(sorted) = runs.pop() {
            replace_file(sorted, path)?;
        }

        info!(
            path = %path.display(),
            records = stats.records,
            runs = stats.runs,
            merge_passes = stats.merge_passes,
            "Sorted record file"
        );
        Ok(stats)
    }

    fn create_run(&self, scratch_dir: &Path) -> Result<NamedTempFile, SortError> {
        Builder::new()
            .prefix(RUN_FILE_PREFIX)
            .tempfile_in(scratch_dir)
            .map_err(|source| SortError::TmpFile {
                dir: scratch_dir.to_path_buf(),
                source,
            })
    }

    fn write_run(
        &self,
        scratch_dir: &Path,
        mode: MergeMode,
        records: &[MergeRecord],
    ) -> Result<NamedTempFile, SortError> {
        let mut run = self.create_run(scratch_dir)?;
        let mut writer = RecordWriter::new(BufWriter::new(run.as_file_mut()), mode);
        for record in records {
            writer.write(record)?;
        }
        writer.finish()?;
        Ok(run)
    }

    fn merge_pass(
        &self,
        runs: Vec<NamedTempFile>,
        scratch_dir: &Path,
        ctx: &MergeContext,
    ) -> Result<Vec<NamedTempFile>, SortError> {
        let mut merged = Vec::with_capacity(runs.len() / self.config.max_fan_in + 1);
        let mut pending = runs.into_iter();
        loop {
            let group: Vec<NamedTempFile> =
                pending.by_ref().take(self.config.max_fan_in).collect();
            match group.len() {
                0 => break,
                // Odd run out; it joins a merge on the next pass.
                1 => {
                    merged.extend(group);
                    continue;
                }
                _ => {}
            }

            let mut run = self.create_run(scratch_dir)?;
            let written = {
                let mut writer = RecordWriter::new(BufWriter::new(run.as_file_mut()), ctx.mode());
                merge_runs(&group, &mut writer, ctx)?;
                let written = writer.records_written();
                writer.finish()?;
                written
            };
            debug!(inputs = group.len(), records = written, "Merged runs");
            merged.push(run);
        }
        Ok(merged)
    }
}

/// A record waiting in the merge heap.
struct HeapEntry {
    record: MergeRecord,
    /// Index of the run the record came from.
    source: usize,
    ctx: MergeContext,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse so the smallest record, and on
        // ties the earliest run, comes out first.
        self.ctx
            .compare_records(&other.record, &self.record)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// K-way merge of sorted runs into `out`.
fn merge_runs<W: Write>(
    runs: &[NamedTempFile],
    out: &mut RecordWriter<W>,
    ctx: &MergeContext,
) -> Result<(), SortError> {
    let mut readers = Vec::with_capacity(runs.len());
    for run in runs {
        let file = run.reopen().map_err(|source| SortError::OpenFile {
            path: run.path().to_path_buf(),
            source,
        })?;
        readers.push(RecordReader::new(BufReader::new(file), ctx.mode()));
    }

    let mut heap = BinaryHeap::with_capacity(readers.len());
    for (source, reader) in readers.iter_mut().enumerate() {
        if let Some(record) = reader.next_record()? {
            heap.push(HeapEntry {
                record,
                source,
                ctx: *ctx,
            });
        }
    }

    while let Some(top) = heap.pop() {
        out.write(&top.record)?;
        if let Some(record) = readers[top.source].next_record()? {
            heap.push(HeapEntry {
                record,
                source: top.source,
                ctx: *ctx,
            });
        }
    }
    Ok(())
}

/// Move the sorted run over the input file.
///
/// Renaming fails when the scratch directory is on another filesystem; the
/// contents are copied instead.
fn replace_file(sorted: NamedTempFile, path: &Path) -> Result<(), SortError> {
    let rename_error = |source: io::Error| SortError::RenameFile {
        path: path.to_path_buf(),
        source,
    };

    match sorted.persist(path) {
        Ok(_) => Ok(()),
        Err(err) => {
            debug!(error = %err.error, "Rename failed, copying sorted output");
            let mut input = BufReader::new(err.file.reopen().map_err(rename_error)?);
            let mut output = BufWriter::new(File::create(path).map_err(rename_error)?);
            io::copy(&mut input, &mut output).map_err(rename_error)?;
            output.flush().map_err(rename_error)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_views_core::Operation;
    use tempfile::TempDir;

    fn write_log(path: &Path, mode: MergeMode, records: &[MergeRecord]) {
        let mut writer = RecordWriter::create(path, mode).unwrap();
        for r in records {
            writer.write(r).unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_log(path: &Path, mode: MergeMode) -> Vec<MergeRecord> {
        RecordReader::open(path, mode)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn keys(records: &[MergeRecord]) -> Vec<Vec<u8>> {
        records.iter().map(|r| r.key().to_vec()).collect()
    }

    #[test]
    fn test_sort_single_run() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("id.log");
        let mode = MergeMode::InitialBuild;
        write_log(
            &log,
            mode,
            &[
                MergeRecord::new(None, b"b", b"2"),
                MergeRecord::new(None, b"a", b"1"),
            ],
        );

        let stats = FileSorter::default()
            .sort_id_log(&log, dir.path(), mode)
            .unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.merge_passes, 0);

        let sorted = read_log(&log, mode);
        assert_eq!(keys(&sorted), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(sorted[0].value(), b"1");
    }

    #[test]
    fn test_sort_multi_pass_merge() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("id.log");
        let mode = MergeMode::InitialBuild;
        let ids: Vec<String> = (0..23).rev().map(|i| format!("doc{:03}", i)).collect();
        let records: Vec<MergeRecord> = ids
            .iter()
            .map(|id| MergeRecord::new(None, id.as_bytes(), b"v"))
            .collect();
        write_log(&log, mode, &records);

        let file_sorter = FileSorter::new(SortConfig::for_testing());
        let stats = file_sorter.sort_id_log(&log, dir.path(), mode).unwrap();
        assert_eq!(stats.records, 23);
        assert_eq!(stats.runs, 12);
        // 12 -> 6 -> 3 -> 2 -> 1
        assert_eq!(stats.merge_passes, 4);

        let sorted = keys(&read_log(&log, mode));
        let mut expected: Vec<Vec<u8>> = ids.iter().map(|s| s.as_bytes().to_vec()).collect();
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_sort_leaves_no_run_files() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        let log = dir.path().join("id.log");
        let mode = MergeMode::InitialBuild;
        let records: Vec<MergeRecord> = (0..9u8)
            .rev()
            .map(|i| MergeRecord::new(None, &[i], b""))
            .collect();
        write_log(&log, mode, &records);

        FileSorter::new(SortConfig::for_testing())
            .sort_id_log(&log, &scratch, mode)
            .unwrap();
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_incremental_sort_orders_ops_for_same_key() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("id.log");
        let mode = MergeMode::IncrementalUpdate;
        write_log(
            &log,
            mode,
            &[
                MergeRecord::new(Some(Operation::Delete), b"k", b""),
                MergeRecord::new(Some(Operation::Put), b"z", b""),
                MergeRecord::new(Some(Operation::Put), b"k", b"new"),
            ],
        );

        FileSorter::new(SortConfig::for_testing())
            .sort_id_log(&log, dir.path(), mode)
            .unwrap();
        let sorted = read_log(&log, mode);
        let ops: Vec<_> = sorted.iter().map(|r| r.operation()).collect();
        assert_eq!(keys(&sorted), vec![b"k".to_vec(), b"k".to_vec(), b"z".to_vec()]);
        assert_eq!(
            ops,
            vec![Some(Operation::Put), Some(Operation::Delete), Some(Operation::Put)]
        );
    }

    #[test]
    fn test_initial_sort_is_stable_for_equal_keys() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("id.log");
        let mode = MergeMode::InitialBuild;
        let values: Vec<Vec<u8>> = (0..7u8).map(|i| vec![i]).collect();
        let records: Vec<MergeRecord> = values
            .iter()
            .map(|v| MergeRecord::new(None, b"same", v))
            .collect();
        write_log(&log, mode, &records);

        FileSorter::new(SortConfig::for_testing())
            .sort_id_log(&log, dir.path(), mode)
            .unwrap();
        let sorted: Vec<Vec<u8>> = read_log(&log, mode)
            .iter()
            .map(|r| r.value().to_vec())
            .collect();
        assert_eq!(sorted, values);
    }

    #[test]
    fn test_empty_file_stays_empty() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("empty.log");
        File::create(&log).unwrap();

        let stats = FileSorter::default()
            .sort_id_log(&log, dir.path(), MergeMode::InitialBuild)
            .unwrap();
        assert_eq!(stats, SortStats::default());
        assert_eq!(std::fs::metadata(&log).unwrap().len(), 0);
    }

    #[test]
    fn test_missing_input_is_open_error() {
        let dir = TempDir::new().unwrap();
        let err = FileSorter::default()
            .sort_id_log(&dir.path().join("nope.log"), dir.path(), MergeMode::InitialBuild)
            .unwrap_err();
        assert!(matches!(err, SortError::OpenFile { .. }));
        assert_eq!(err.code(), sorter::OPEN_FILE);
    }

    #[test]
    fn test_truncated_input_is_read_error() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("bad.log");
        std::fs::write(&log, [0u8, 0, 0, 9, 0, 1, b'a']).unwrap();

        let err = FileSorter::default()
            .sort_id_log(&log, dir.path(), MergeMode::InitialBuild)
            .unwrap_err();
        assert_eq!(err.code(), sorter::FILE_READ);
    }

    #[test]
    fn test_missing_scratch_dir_is_tmp_file_error() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("id.log");
        write_log(&log, MergeMode::InitialBuild, &[MergeRecord::new(None, b"a", b"")]);

        let err = FileSorter::default()
            .sort_id_log(&log, &dir.path().join("missing"), MergeMode::InitialBuild)
            .unwrap_err();
        assert_eq!(err.code(), sorter::TMP_FILE);
    }

    #[test]
    fn test_invalid_config_is_bad_arg() {
        let dir = TempDir::new().unwrap();
        let file_sorter = FileSorter::new(SortConfig::new().with_max_fan_in(1));
        let err = file_sorter
            .sort_id_log(&dir.path().join("x.log"), dir.path(), MergeMode::InitialBuild)
            .unwrap_err();
        assert_eq!(err.code(), sorter::BAD_ARG);
    }
}
