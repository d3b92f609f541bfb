//! Merge record file format.
//!
//! Operation logs are a plain concatenation of records, with no file header.
//!
//! # Record Layout
//!
//! ```text
//! ┌────────────────┬────────────┬────────────────┬─────────────┬─────────────┐
//! │ Length (4, BE) │ Op (1)*    │ Key len (2, BE)│ Key         │ Value       │
//! └────────────────┴────────────┴────────────────┴─────────────┴─────────────┘
//!
//! * present only in incremental-update logs
//!
//! Length = 2 + key len + value len (+ 1 with an op byte)
//! ```
//!
//! The value has no length of its own; it is whatever the record length
//! leaves after the key.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::TryReserveError;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use strata_views_core::codes::sorter;
use strata_views_core::{MergeMode, MergeRecord, Operation, MAX_KEY_LEN};

/// Bytes taken by the key length field.
const KEY_LEN_SIZE: usize = 2;

/// Bytes taken by the operation field.
const OP_SIZE: usize = 1;

/// Errors from reading or writing merge records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Underlying read failed.
    #[error("Read failed: {0}")]
    Read(#[source] io::Error),

    /// The stream ended inside a record.
    #[error("Truncated record: stream ended while reading {field}")]
    Truncated {
        /// Field being read when the stream ended
        field: &'static str,
    },

    /// The record header is inconsistent.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Could not allocate the record buffer.
    ///
    /// Kept apart from read failures: the file may be fine, and the caller
    /// can retry after releasing memory.
    #[error("Allocation of {size} bytes for record failed")]
    Alloc {
        /// Requested buffer size
        size: usize,
        /// Allocator error
        #[source]
        source: TryReserveError,
    },

    /// Underlying write failed.
    #[error("Write failed: {0}")]
    Write(#[source] io::Error),

    /// Key longer than the format can describe.
    #[error("Key of {0} bytes exceeds the {max} byte limit", max = MAX_KEY_LEN)]
    KeyTooLarge(usize),

    /// Record longer than the format can describe.
    #[error("Record of {0} bytes exceeds the u32 length field")]
    RecordTooLarge(usize),

    /// Incremental-update logs require every record to carry an operation.
    #[error("Record has no operation but the log is in incremental-update mode")]
    MissingOperation,
}

impl CodecError {
    /// Sorter failure-kind code for this error.
    pub fn code(&self) -> i32 {
        match self {
            CodecError::Read(_) | CodecError::Truncated { .. } | CodecError::Corrupt(_) => {
                sorter::FILE_READ
            }
            CodecError::Alloc { .. } => sorter::ALLOC,
            CodecError::Write(_) => sorter::FILE_WRITE,
            CodecError::KeyTooLarge(_)
            | CodecError::RecordTooLarge(_)
            | CodecError::MissingOperation => sorter::BAD_ARG,
        }
    }

    /// Whether the failure was an allocation failure rather than bad data.
    pub fn is_alloc(&self) -> bool {
        matches!(self, CodecError::Alloc { .. })
    }
}

fn read_error(field: &'static str) -> impl FnOnce(io::Error) -> CodecError {
    move |e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            CodecError::Truncated { field }
        } else {
            CodecError::Read(e)
        }
    }
}

/// Read the 4-byte length, telling a clean end of stream apart from a
/// record cut short.
fn read_length<R: Read>(input: &mut R) -> Result<Option<u32>, CodecError> {
    let mut bytes = [0u8; 4];
    let mut filled = 0;
    while filled < bytes.len() {
        match input.read(&mut bytes[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(CodecError::Truncated { field: "length" }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CodecError::Read(e)),
        }
    }
    Ok(Some(u32::from_be_bytes(bytes)))
}

/// Decode the next record, or `None` at a clean end of stream.
pub fn read_record<R: Read>(
    input: &mut R,
    mode: MergeMode,
) -> Result<Option<MergeRecord>, CodecError> {
    let total = match read_length(input)? {
        Some(len) => len as usize,
        None => return Ok(None),
    };

    let operation = if mode.has_operation() {
        let tag = input.read_u8().map_err(read_error("operation"))?;
        Some(Operation::from_tag(tag))
    } else {
        None
    };

    let key_len = input
        .read_u16::<BigEndian>()
        .map_err(read_error("key length"))? as usize;

    let header = KEY_LEN_SIZE + if operation.is_some() { OP_SIZE } else { 0 };
    let value_len = total
        .checked_sub(header + key_len)
        .ok_or_else(|| {
            CodecError::Corrupt(format!(
                "record length {} too small for {} byte key",
                total, key_len
            ))
        })?;

    let size = key_len + value_len;
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|source| CodecError::Alloc { size, source })?;
    let read = input
        .by_ref()
        .take(size as u64)
        .read_to_end(&mut buf)
        .map_err(CodecError::Read)?;
    if read < size {
        return Err(CodecError::Truncated {
            field: "key and value",
        });
    }

    MergeRecord::from_buffer(operation, buf, key_len)
        .map(Some)
        .ok_or_else(|| CodecError::Corrupt("key length exceeds record".to_string()))
}

/// Encode a record.
///
/// In initial-build mode any operation on the record is not written.
pub fn write_record<W: Write>(
    out: &mut W,
    record: &MergeRecord,
    mode: MergeMode,
) -> Result<(), CodecError> {
    let key_len = record.key().len();
    if key_len > MAX_KEY_LEN {
        return Err(CodecError::KeyTooLarge(key_len));
    }

    let operation = if mode.has_operation() {
        Some(record.operation().ok_or(CodecError::MissingOperation)?)
    } else {
        None
    };

    let total = KEY_LEN_SIZE + record.payload_len() + if operation.is_some() { OP_SIZE } else { 0 };
    let total = u32::try_from(total).map_err(|_| CodecError::RecordTooLarge(total))?;

    out.write_u32::<BigEndian>(total)
        .map_err(CodecError::Write)?;
    if let Some(op) = operation {
        out.write_u8(op.tag()).map_err(CodecError::Write)?;
    }
    out.write_u16::<BigEndian>(key_len as u16)
        .map_err(CodecError::Write)?;
    out.write_all(record.as_bytes()).map_err(CodecError::Write)?;
    Ok(())
}

/// Buffered sequential reader over a record file.
pub struct RecordReader<R: Read> {
    input: R,
    mode: MergeMode,
}

impl RecordReader<BufReader<File>> {
    /// Open a record file for reading.
    pub fn open(path: &Path, mode: MergeMode) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?), mode))
    }
}

impl<R: Read> RecordReader<R> {
    /// Wrap an existing stream.
    pub fn new(input: R, mode: MergeMode) -> Self {
        RecordReader { input, mode }
    }

    /// Read the next record, or `None` at end of file.
    pub fn next_record(&mut self) -> Result<Option<MergeRecord>, CodecError> {
        read_record(&mut self.input, self.mode)
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<MergeRecord, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Buffered sequential writer of a record file.
pub struct RecordWriter<W: Write> {
    out: W,
    mode: MergeMode,
    written: u64,
}

impl RecordWriter<BufWriter<File>> {
    /// Create (or truncate) a record file.
    pub fn create(path: &Path, mode: MergeMode) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?), mode))
    }
}

impl<W: Write> RecordWriter<W> {
    /// Wrap an existing stream.
    pub fn new(out: W, mode: MergeMode) -> Self {
        RecordWriter {
            out,
            mode,
            written: 0,
        }
    }

    /// Append one record.
    pub fn write(&mut self, record: &MergeRecord) -> Result<(), CodecError> {
        write_record(&mut self.out, record, self.mode)?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Flush buffered bytes and return the inner stream.
    pub fn finish(mut self) -> Result<W, CodecError> {
        self.out.flush().map_err(CodecError::Write)?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn encode(record: &MergeRecord, mode: MergeMode) -> Vec<u8> {
        let mut out = Vec::new();
        write_record(&mut out, record, mode).unwrap();
        out
    }

    #[test]
    fn test_initial_build_layout() {
        let rec = MergeRecord::new(None, b"ab", b"xyz");
        let bytes = encode(&rec, MergeMode::InitialBuild);
        assert_eq!(
            bytes,
            vec![0, 0, 0, 7, 0, 2, b'a', b'b', b'x', b'y', b'z']
        );
    }

    #[test]
    fn test_incremental_layout_has_op_byte() {
        let rec = MergeRecord::new(Some(Operation::Delete), b"k", b"");
        let bytes = encode(&rec, MergeMode::IncrementalUpdate);
        assert_eq!(bytes, vec![0, 0, 0, 4, 1, 0, 1, b'k']);
    }

    #[test]
    fn test_clean_eof_returns_none() {
        let mut input = Cursor::new(Vec::<u8>::new());
        assert!(read_record(&mut input, MergeMode::InitialBuild)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_partial_length_is_truncation() {
        let mut input = Cursor::new(vec![0, 0]);
        let err = read_record(&mut input, MergeMode::InitialBuild).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { field: "length" }));
        assert_eq!(err.code(), sorter::FILE_READ);
    }

    #[test]
    fn test_truncated_payload() {
        let rec = MergeRecord::new(None, b"key", b"value");
        let mut bytes = encode(&rec, MergeMode::InitialBuild);
        bytes.truncate(bytes.len() - 2);
        let err = read_record(&mut Cursor::new(bytes), MergeMode::InitialBuild).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { field: "key and value" }));
    }

    #[test]
    fn test_oversized_length_with_short_payload() {
        // declares 16 MiB, delivers a 3-byte key
        let mut bytes = (16u32 << 20).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0, 3]);
        bytes.extend_from_slice(b"abc");
        let err = read_record(&mut Cursor::new(bytes), MergeMode::InitialBuild).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { field: "key and value" }));
        assert_eq!(err.code(), sorter::FILE_READ);
    }

    #[test]
    fn test_missing_op_byte_is_truncation() {
        let mut input = Cursor::new(vec![0, 0, 0, 3]);
        let err = read_record(&mut input, MergeMode::IncrementalUpdate).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { field: "operation" }));
    }

    #[test]
    fn test_length_smaller_than_key_is_corrupt() {
        // length 3, key length 5
        let mut input = Cursor::new(vec![0, 0, 0, 3, 0, 5, b'a', b'b', b'c']);
        let err = read_record(&mut input, MergeMode::InitialBuild).unwrap_err();
        assert!(matches!(err, CodecError::Corrupt(_)));
        assert!(!err.is_alloc());
    }

    #[test]
    fn test_incremental_write_requires_operation() {
        let rec = MergeRecord::new(None, b"k", b"v");
        let err = write_record(&mut Vec::new(), &rec, MergeMode::IncrementalUpdate).unwrap_err();
        assert!(matches!(err, CodecError::MissingOperation));
        assert_eq!(err.code(), sorter::BAD_ARG);
    }

    #[test]
    fn test_initial_write_drops_operation() {
        let rec = MergeRecord::new(Some(Operation::Put), b"k", b"v");
        let bytes = encode(&rec, MergeMode::InitialBuild);
        let decoded = read_record(&mut Cursor::new(bytes), MergeMode::InitialBuild)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.operation(), None);
        assert_eq!(decoded.key(), b"k");
    }

    #[test]
    fn test_oversized_key_rejected() {
        let key = vec![0u8; MAX_KEY_LEN + 1];
        let rec = MergeRecord::new(None, &key, b"");
        let err = write_record(&mut Vec::new(), &rec, MergeMode::InitialBuild).unwrap_err();
        assert!(matches!(err, CodecError::KeyTooLarge(_)));
    }

    #[test]
    fn test_reader_iterates_until_eof() {
        let mut writer = RecordWriter::new(Vec::new(), MergeMode::IncrementalUpdate);
        writer
            .write(&MergeRecord::new(Some(Operation::Put), b"a", b"1"))
            .unwrap();
        writer
            .write(&MergeRecord::new(Some(Operation::Delete), b"b", b""))
            .unwrap();
        assert_eq!(writer.records_written(), 2);
        let bytes = writer.finish().unwrap();

        let reader = RecordReader::new(Cursor::new(bytes), MergeMode::IncrementalUpdate);
        let records: Vec<MergeRecord> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].operation(), Some(Operation::Put));
        assert_eq!(records[1].key(), b"b");
    }

    fn arb_record(mode: MergeMode) -> impl Strategy<Value = MergeRecord> {
        (
            any::<u8>(),
            proptest::collection::vec(any::<u8>(), 0..32),
            proptest::collection::vec(any::<u8>(), 0..64),
        )
            .prop_map(move |(tag, key, value)| {
                let op = mode.has_operation().then(|| Operation::from_tag(tag));
                MergeRecord::new(op, &key, &value)
            })
    }

    proptest! {
        #[test]
        fn prop_incremental_records_survive_encoding(rec in arb_record(MergeMode::IncrementalUpdate)) {
            let bytes = encode(&rec, MergeMode::IncrementalUpdate);
            let mut input = Cursor::new(bytes);
            let decoded = read_record(&mut input, MergeMode::IncrementalUpdate).unwrap().unwrap();
            prop_assert_eq!(&decoded, &rec);
            prop_assert!(read_record(&mut input, MergeMode::IncrementalUpdate).unwrap().is_none());
        }

        #[test]
        fn prop_initial_records_survive_encoding(rec in arb_record(MergeMode::InitialBuild)) {
            let bytes = encode(&rec, MergeMode::InitialBuild);
            let decoded = read_record(&mut Cursor::new(bytes), MergeMode::InitialBuild).unwrap().unwrap();
            prop_assert_eq!(decoded, rec);
        }
    }
}
