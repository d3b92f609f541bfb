//! On-disk byte formats.
//!
//! This module centralizes the serialization of operation log records.
//!
//! # Module Structure
//!
//! - `merge_record`: length-prefixed merge record format, readers and writers

pub mod merge_record;

pub use merge_record::{read_record, write_record, CodecError, RecordReader, RecordWriter};
