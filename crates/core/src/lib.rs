//! Core types for the Strata view index updater
//!
//! This crate defines the pieces that give merge records their meaning,
//! independent of any file or process:
//! - MergeMode / Operation: initial build vs incremental update, op tags
//! - MergeRecord: one log entry, key and value backed by a single buffer
//! - Collation: JSON value ordering used for secondary index keys
//! - KeyOrder / MergeContext: the comparator family defining sort order
//! - codes: the shared failure-kind code table

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codes;
pub mod collate;
pub mod order;
pub mod record;

pub use collate::{collate_json, Collation, ParsedJson};
pub use order::{
    compare_primary_keys, compare_secondary_keys, encode_secondary_key, split_secondary_key,
    KeyOrder, MergeContext,
};
pub use record::{MergeMode, MergeRecord, Operation, MAX_KEY_LEN};
