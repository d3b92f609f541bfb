//! Key and record ordering.
//!
//! Two key orders exist:
//!
//! - **Primary** (id index): the whole key is a document id, compared as an
//!   unsigned byte string.
//! - **Secondary** (view index): the key is
//!   `[json_len: u16 BE][json key][document id]`. JSON keys compare by
//!   collation; equal JSON keys fall back to the primary order on the ids.
//!
//! [`MergeContext`] pairs a key order with a [`MergeMode`]. In incremental
//! mode records with equal keys are further ordered by operation tag, so a
//! delete and a re-insert of the same key always reach the updater in the
//! same sequence.

use crate::collate::{collate_json, Collation, ParsedJson};
use crate::record::{MergeMode, MergeRecord};
use byteorder::{BigEndian, ByteOrder};
use std::cmp::Ordering;

/// Size of the JSON length prefix of a secondary key.
const JSON_LEN_PREFIX: usize = 2;

/// Compare two primary (document id) keys.
pub fn compare_primary_keys(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Split a secondary key into its JSON key and document id.
///
/// A declared JSON length running past the end of the key is clamped to
/// the bytes available, and a key shorter than the prefix is treated as an
/// empty JSON key with the remaining bytes as the id. Well-formed keys
/// never hit either case.
pub fn split_secondary_key(key: &[u8]) -> (&[u8], &[u8]) {
    if key.len() < JSON_LEN_PREFIX {
        return (&[], key);
    }
    let body = &key[JSON_LEN_PREFIX..];
    let json_len = (BigEndian::read_u16(key) as usize).min(body.len());
    body.split_at(json_len)
}

/// Build a secondary key from a JSON key and a document id.
///
/// Returns `None` if the JSON key does not fit the u16 length prefix.
pub fn encode_secondary_key(json_key: &[u8], doc_id: &[u8]) -> Option<Vec<u8>> {
    let json_len = u16::try_from(json_key.len()).ok()?;
    let mut key = Vec::with_capacity(JSON_LEN_PREFIX + json_key.len() + doc_id.len());
    key.extend_from_slice(&json_len.to_be_bytes());
    key.extend_from_slice(json_key);
    key.extend_from_slice(doc_id);
    Some(key)
}

/// Compare two secondary (view) keys.
pub fn compare_secondary_keys(a: &[u8], b: &[u8], collation: Collation) -> Ordering {
    let (json_a, id_a) = split_secondary_key(a);
    let (json_b, id_b) = split_secondary_key(b);

    collate_json(json_a, json_b, collation).then_with(|| compare_primary_keys(id_a, id_b))
}

/// Which key comparator a log is sorted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOrder {
    /// Document id order, used for the id index (index 0).
    Primary,
    /// JSON collation with id tie-break, used for view indexes.
    Secondary {
        /// String collation applied to the JSON keys.
        collation: Collation,
    },
}

impl KeyOrder {
    /// Compare two encoded keys.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            KeyOrder::Primary => compare_primary_keys(a, b),
            KeyOrder::Secondary { collation } => compare_secondary_keys(a, b, *collation),
        }
    }
}

/// Selects codec layout and record ordering for one log file.
///
/// Holds no per-record state; one context is built per file and shared by
/// every comparison made while sorting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeContext {
    mode: MergeMode,
    key_order: KeyOrder,
}

impl MergeContext {
    /// Create a context from a mode and a key order.
    pub fn new(mode: MergeMode, key_order: KeyOrder) -> Self {
        MergeContext { mode, key_order }
    }

    /// Context for the id index log.
    pub fn primary(mode: MergeMode) -> Self {
        Self::new(mode, KeyOrder::Primary)
    }

    /// Context for a view index log.
    pub fn secondary(mode: MergeMode, collation: Collation) -> Self {
        Self::new(mode, KeyOrder::Secondary { collation })
    }

    /// Merge mode.
    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Compare two encoded keys.
    pub fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.key_order.compare(a, b)
    }

    /// Compare two records: by key, then by operation tag in incremental mode.
    pub fn compare_records(&self, a: &MergeRecord, b: &MergeRecord) -> Ordering {
        let ord = self.compare_keys(a.key(), b.key());
        if ord != Ordering::Equal || self.mode != MergeMode::IncrementalUpdate {
            return ord;
        }
        self.compare_operations(a, b)
    }

    /// Stable-sort `records` into [`compare_records`](Self::compare_records)
    /// order.
    ///
    /// Each key is decoded once up front, so JSON keys are not parsed again
    /// on every comparison.
    pub fn sort_records(&self, records: &mut Vec<MergeRecord>) {
        let order: Vec<usize> = {
            let keys: Vec<DecodedKey<'_>> = records
                .iter()
                .map(|r| DecodedKey::decode(self.key_order, r.key()))
                .collect();
            let mut order: Vec<usize> = (0..records.len()).collect();
            order.sort_by(|&i, &j| {
                let ord = keys[i].compare(&keys[j], self.key_order);
                if ord != Ordering::Equal || self.mode != MergeMode::IncrementalUpdate {
                    return ord;
                }
                self.compare_operations(&records[i], &records[j])
            });
            order
        };

        let mut slots: Vec<Option<MergeRecord>> = records.drain(..).map(Some).collect();
        records.extend(order.into_iter().filter_map(|i| slots[i].take()));
    }

    fn compare_operations(&self, a: &MergeRecord, b: &MergeRecord) -> Ordering {
        let tag_a = a.operation().map(|op| op.tag());
        let tag_b = b.operation().map(|op| op.tag());
        tag_a.cmp(&tag_b)
    }
}

/// A key split and parsed for repeated comparison.
enum DecodedKey<'a> {
    Primary(&'a [u8]),
    Secondary { json: ParsedJson<'a>, id: &'a [u8] },
}

impl<'a> DecodedKey<'a> {
    fn decode(order: KeyOrder, key: &'a [u8]) -> Self {
        match order {
            KeyOrder::Primary => DecodedKey::Primary(key),
            KeyOrder::Secondary { .. } => {
                let (json, id) = split_secondary_key(key);
                DecodedKey::Secondary {
                    json: ParsedJson::parse(json),
                    id,
                }
            }
        }
    }

    fn compare(&self, other: &DecodedKey<'_>, order: KeyOrder) -> Ordering {
        match (self, other, order) {
            (
                DecodedKey::Secondary { json: ja, id: ia },
                DecodedKey::Secondary { json: jb, id: ib },
                KeyOrder::Secondary { collation },
            ) => ja
                .compare(jb, collation)
                .then_with(|| compare_primary_keys(ia, ib)),
            (DecodedKey::Primary(a), DecodedKey::Primary(b), _) => compare_primary_keys(a, b),
            // both sides are decoded with the same order
            _ => Ordering::Equal,
        }
    }
}
