//! Durability layer for Strata views
//!
//! This crate handles everything that touches disk:
//!
//! - Merge record format: length-prefixed records of the operation logs
//! - Record readers and writers over buffered files
//! - External sort: bounded-memory run generation and k-way merge, replacing
//!   each log with its sorted form

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format; // Merge record codec
pub mod sort; // External sort/merge engine

// === Re-exports ===
pub use format::{read_record, write_record, CodecError, RecordReader, RecordWriter};
pub use sort::{FileSorter, SortConfig, SortConfigError, SortError, SortStats};
