//! Merge records and merge modes.
//!
//! A merge record is one entry of a per-index operation log. The key and the
//! value are two views into a single owned buffer: `buf[..key_len]` is the
//! key and `buf[key_len..]` is the value. Neither view can be released on its
//! own, and dropping the record frees both.

/// Largest key the on-disk format can describe (the key length is a u16).
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// How a log is being merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeMode {
    /// Fresh bulk load. Records carry no operation tag and are all inserts.
    InitialBuild,
    /// Change log applied to an existing index. Every record carries an
    /// operation tag, and the same key may appear once per operation.
    IncrementalUpdate,
}

impl MergeMode {
    /// Whether records in this mode carry an operation byte.
    pub fn has_operation(self) -> bool {
        matches!(self, MergeMode::IncrementalUpdate)
    }
}

/// Operation tag of an incremental-update record.
///
/// Tag values are opaque to the sort: they are only compared numerically.
/// Unknown tags are preserved so a record always re-encodes byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Insert or replace the entry.
    Put,
    /// Remove the entry.
    Delete,
    /// A tag this crate does not interpret.
    Other(u8),
}

impl Operation {
    /// Tag byte for `Put`.
    pub const PUT_TAG: u8 = 0;
    /// Tag byte for `Delete`.
    pub const DELETE_TAG: u8 = 1;

    /// Decode a tag byte.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            Self::PUT_TAG => Operation::Put,
            Self::DELETE_TAG => Operation::Delete,
            other => Operation::Other(other),
        }
    }

    /// The on-disk tag byte.
    pub fn tag(self) -> u8 {
        match self {
            Operation::Put => Self::PUT_TAG,
            Operation::Delete => Self::DELETE_TAG,
            Operation::Other(tag) => tag,
        }
    }
}

/// One decoded log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRecord {
    operation: Option<Operation>,
    buf: Vec<u8>,
    key_len: usize,
}

impl MergeRecord {
    /// Build a record by copying `key` and `value` into one buffer.
    pub fn new(operation: Option<Operation>, key: &[u8], value: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(key.len() + value.len());
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
        MergeRecord {
            operation,
            buf,
            key_len: key.len(),
        }
    }

    /// Build a record from a buffer holding `key ++ value`.
    ///
    /// Returns `None` if `key_len` is past the end of the buffer.
    pub fn from_buffer(operation: Option<Operation>, buf: Vec<u8>, key_len: usize) -> Option<Self> {
        if key_len > buf.len() {
            return None;
        }
        Some(MergeRecord {
            operation,
            buf,
            key_len,
        })
    }

    /// Operation tag, present only for incremental-update records.
    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    /// Key bytes.
    pub fn key(&self) -> &[u8] {
        &self.buf[..self.key_len]
    }

    /// Value bytes.
    pub fn value(&self) -> &[u8] {
        &self.buf[self.key_len..]
    }

    /// The backing buffer, `key ++ value`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes held by this record.
    pub fn payload_len(&self) -> usize {
        self.buf.len()
    }
}
