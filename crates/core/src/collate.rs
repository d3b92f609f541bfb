//! JSON collation.
//!
//! Orders encoded JSON values the way view keys are ordered:
//!
//! ```text
//! null < false < true < numbers < strings < arrays < objects
//! ```
//!
//! Arrays and objects compare element by element, shorter first on a common
//! prefix. Object members compare in document order, key then value.
//!
//! Strings in [`Collation::Unicode`] mode compare case-insensitively first,
//! then with lowercase before uppercase, so `"a" < "A" < "b"`. In
//! [`Collation::Raw`] mode they compare by code point.
//!
//! Numbers compare as `f64` under `total_cmp`, whatever their spelling, so
//! `1`, `1.0` and `1e0` are equal. Integers past 2^53 that round to the same
//! `f64` are equal too; on view keys the document id then decides.
//!
//! Input that is not valid JSON sorts after every valid value and compares
//! by raw bytes against other invalid input, which keeps the order total.
//!
//! [`collate_json`] parses both sides on every call. Sorts that compare one
//! key many times parse it once into a [`ParsedJson`] instead.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// String comparison mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collation {
    /// Case-insensitive first, lowercase before uppercase on ties.
    #[default]
    Unicode,
    /// Plain code point order.
    Raw,
}

/// Compare two encoded JSON values.
pub fn collate_json(a: &[u8], b: &[u8], collation: Collation) -> Ordering {
    ParsedJson::parse(a).compare(&ParsedJson::parse(b), collation)
}

/// An encoded JSON value parsed once for repeated comparison.
#[derive(Debug, Clone)]
pub struct ParsedJson<'a> {
    raw: &'a [u8],
    value: Option<Value>,
}

impl<'a> ParsedJson<'a> {
    /// Parse `raw`. Invalid JSON is kept as raw bytes.
    pub fn parse(raw: &'a [u8]) -> Self {
        ParsedJson {
            raw,
            value: serde_json::from_slice(raw).ok(),
        }
    }

    /// Compare with another parsed value; same result as [`collate_json`]
    /// on the raw bytes.
    pub fn compare(&self, other: &ParsedJson<'_>, collation: Collation) -> Ordering {
        match (&self.value, &other.value) {
            (Some(a), Some(b)) => compare_values(a, b, collation),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.raw.cmp(other.raw),
        }
    }
}

/// Compare two parsed JSON values.
pub fn compare_values(a: &Value, b: &Value, collation: Collation) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => compare_strings(x, y, collation),
        (Value::Array(xs), Value::Array(ys)) => {
            for (x, y) in xs.iter().zip(ys.iter()) {
                let ord = compare_values(x, y, collation);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        (Value::Object(xs), Value::Object(ys)) => {
            for ((kx, vx), (ky, vy)) in xs.iter().zip(ys.iter()) {
                let ord = compare_strings(kx, ky, collation)
                    .then_with(|| compare_values(vx, vy, collation));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        // null and booleans are fully described by their rank
        _ => Ordering::Equal,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

// Every number goes through f64. Mixing exact integer and float comparisons
// is not transitive once integers exceed 2^53.
fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    let x = a.as_f64().unwrap_or_default();
    let y = b.as_f64().unwrap_or_default();
    x.total_cmp(&y)
}

fn compare_strings(a: &str, b: &str, collation: Collation) -> Ordering {
    match collation {
        Collation::Raw => a.cmp(b),
        Collation::Unicode => {
            let folded_a = a.chars().flat_map(char::to_lowercase);
            let folded_b = b.chars().flat_map(char::to_lowercase);
            folded_a
                .cmp(folded_b)
                .then_with(|| a.chars().map(case_key).cmp(b.chars().map(case_key)))
        }
    }
}

// Lowercase sorts ahead of everything else; the char itself breaks ties.
fn case_key(c: char) -> (bool, char) {
    (!c.is_lowercase(), c)
}
