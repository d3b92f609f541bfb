//! Job protocol.
//!
//! The parent process describes one update job on the worker's input, in
//! this order:
//!
//! ```text
//! <scratch dir>\n
//! <N>\n                      number of view indexes
//! <view name>\n   × N
//! <id log path>\n
//! <view log path>\n × N
//! <batch size>\n
//! <header length>\n
//! <header bytes>             exactly <header length> raw bytes
//! ```
//!
//! Nothing else is read from the input by the job reader. Whatever follows
//! belongs to the cancellation watcher.
//!
//! On success the worker answers on its output with:
//!
//! ```text
//! Header Len : <n>\n
//! <n raw header bytes>\n
//! Results = id_inserts : <u64>, id_deletes : <u64>, kv_inserts : <u64>, kv_deletes : <u64>, cleanups : <u64>\n
//! ```

use crate::updater::UpdateResult;
use std::collections::TryReserveError;
use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use strata_views_core::codes::store;

/// One of the logs a job sorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFile {
    /// The id index log (index 0).
    IdBtree,
    /// The log of view index `n`, counting from 0.
    ViewBtree(usize),
}

impl SourceFile {
    /// Label used in sort diagnostics: `id` or `view <n>`.
    pub fn sort_label(&self) -> String {
        match self {
            SourceFile::IdBtree => "id".to_string(),
            SourceFile::ViewBtree(n) => format!("view {}", n),
        }
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFile::IdBtree => write!(f, "id btree"),
            SourceFile::ViewBtree(n) => write!(f, "btree {}", n),
        }
    }
}

/// Errors from reading a job.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The scratch directory line is missing.
    #[error("Error reading temporary directory path")]
    ScratchDir,

    /// The view group description is malformed.
    #[error("Error reading view group info: {0}")]
    GroupInfo(String),

    /// Input ended before the path of a log file.
    #[error("Error reading source file for {0}")]
    MissingSourceFile(SourceFile),

    /// The batch size line is missing or not a positive integer.
    #[error("Error reading batch size")]
    BatchSize,

    /// The header length line is missing or not an integer.
    #[error("Error reading viewgroup header size")]
    HeaderSize,

    /// The header bytes came up short.
    #[error("Error reading viewgroup header from stdin")]
    Header(#[source] io::Error),

    /// A buffer sized by the input could not be allocated.
    #[error("Memory allocation failure")]
    Alloc(#[source] TryReserveError),

    /// The input stream failed.
    #[error("Error reading job from input: {0}")]
    Io(#[source] io::Error),
}

impl ProtocolError {
    /// Store failure-kind code for this error.
    pub fn code(&self) -> i32 {
        match self {
            ProtocolError::ScratchDir | ProtocolError::Header(_) | ProtocolError::Io(_) => {
                store::READ
            }
            ProtocolError::GroupInfo(_)
            | ProtocolError::MissingSourceFile(_)
            | ProtocolError::BatchSize
            | ProtocolError::HeaderSize => store::INVALID_ARGUMENTS,
            ProtocolError::Alloc(_) => store::ALLOC_FAIL,
        }
    }
}

/// A fully read update job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Directory for temporary sort files.
    pub scratch_dir: PathBuf,
    /// View index names, used in diagnostics.
    pub view_names: Vec<String>,
    /// Operation log of the id index.
    pub id_log: PathBuf,
    /// Operation logs of the view indexes, in view order.
    pub view_logs: Vec<PathBuf>,
    /// Records applied per updater batch.
    pub batch_size: usize,
    /// Index header before this update.
    pub header: Vec<u8>,
}

impl Job {
    /// Number of view indexes in the group.
    pub fn num_views(&self) -> usize {
        self.view_logs.len()
    }

    /// Read a job from the protocol stream.
    ///
    /// Reads exactly the job and nothing past the header bytes.
    pub fn read_from<R: BufRead>(input: &mut R) -> Result<Job, ProtocolError> {
        let scratch_dir = read_line(input)?.ok_or(ProtocolError::ScratchDir)?;

        // A stream ending anywhere before the last path means the parent
        // never sent the sources.
        let missing_id = || ProtocolError::MissingSourceFile(SourceFile::IdBtree);

        let count_line = read_line(input)?.ok_or_else(missing_id)?;
        let num_views: usize = count_line.trim().parse().map_err(|_| {
            ProtocolError::GroupInfo(format!("invalid view count '{}'", count_line))
        })?;

        let mut view_names = Vec::new();
        view_names
            .try_reserve_exact(num_views)
            .map_err(ProtocolError::Alloc)?;
        for _ in 0..num_views {
            view_names.push(read_line(input)?.ok_or_else(missing_id)?);
        }

        let id_log = read_line(input)?.ok_or_else(missing_id)?;

        let mut view_logs = Vec::new();
        view_logs
            .try_reserve_exact(num_views)
            .map_err(ProtocolError::Alloc)?;
        for n in 0..num_views {
            let path = read_line(input)?
                .ok_or(ProtocolError::MissingSourceFile(SourceFile::ViewBtree(n)))?;
            view_logs.push(PathBuf::from(path));
        }

        let batch_size = read_line(input)?
            .and_then(|line| line.trim().parse::<usize>().ok())
            .filter(|size| *size > 0)
            .ok_or(ProtocolError::BatchSize)?;

        let header_len = read_line(input)?
            .and_then(|line| line.trim().parse::<usize>().ok())
            .ok_or(ProtocolError::HeaderSize)?;

        let mut header = Vec::new();
        header
            .try_reserve_exact(header_len)
            .map_err(ProtocolError::Alloc)?;
        header.resize(header_len, 0);
        input.read_exact(&mut header).map_err(ProtocolError::Header)?;

        Ok(Job {
            scratch_dir: PathBuf::from(scratch_dir),
            view_names,
            id_log: PathBuf::from(id_log),
            view_logs,
            batch_size,
            header,
        })
    }

    /// Write this job in protocol form, as the parent process sends it.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.scratch_dir.display())?;
        writeln!(out, "{}", self.view_names.len())?;
        for name in &self.view_names {
            writeln!(out, "{}", name)?;
        }
        writeln!(out, "{}", self.id_log.display())?;
        for path in &self.view_logs {
            writeln!(out, "{}", path.display())?;
        }
        writeln!(out, "{}", self.batch_size)?;
        writeln!(out, "{}", self.header.len())?;
        out.write_all(&self.header)
    }
}

/// Read one line without its trailing newline, or `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>, ProtocolError> {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => Ok(None),
        Ok(_) => {
            if line.ends_with('\n') {
                line.pop();
            }
            Ok(Some(line))
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(ProtocolError::GroupInfo(
            "line is not valid UTF-8".to_string(),
        )),
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

/// Write a successful result to the output stream.
pub fn write_results<W: Write>(out: &mut W, result: &UpdateResult) -> io::Result<()> {
    let stats = &result.stats;
    writeln!(out, "Header Len : {}", result.header.len())?;
    out.write_all(&result.header)?;
    writeln!(out)?;
    writeln!(
        out,
        "Results = id_inserts : {}, id_deletes : {}, kv_inserts : {}, kv_deletes : {}, cleanups : {}",
        stats.ids_inserted, stats.ids_removed, stats.kvs_inserted, stats.kvs_removed, stats.purged
    )?;
    out.flush()
}
