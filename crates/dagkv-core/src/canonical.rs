//! Canonical CBOR encoding for deterministic block bytes.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! Links between blocks are encoded as CBOR tag 42 wrapping the 32 raw
//! digest bytes. The same [`Value`] always produces identical bytes, and
//! therefore an identical [`Cid`], on every platform.

use std::collections::BTreeMap;

use ciborium::value::Value as CborValue;

use crate::error::{CoreError, Result};
use crate::types::Cid;

/// CBOR tag marking a link to another block.
pub const LINK_TAG: u64 = 42;

/// A decoded block value.
///
/// Links are never followed implicitly: a [`Value::Link`] stays an
/// unresolved reference until the caller dereferences it through a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Link(Cid),
}

impl Value {
    /// Build a map value from `(key, value)` pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<Cid> {
        match self {
            Value::Link(cid) => Some(*cid),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a field of a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Every link contained in this value, in encounter order.
    pub fn links(&self) -> Vec<Cid> {
        let mut out = Vec::new();
        collect_links(self, &mut out);
        out
    }
}

fn collect_links(value: &Value, out: &mut Vec<Cid>) {
    match value {
        Value::Link(cid) => out.push(*cid),
        Value::Array(items) => items.iter().for_each(|v| collect_links(v, out)),
        Value::Map(entries) => entries.values().for_each(|v| collect_links(v, out)),
        _ => {}
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Cid> for Value {
    fn from(cid: Cid) -> Self {
        Value::Link(cid)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// Encode a value to canonical CBOR bytes.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Decode canonical CBOR bytes into a value.
///
/// Rejects trailing bytes and non-canonical encodings: the decoded value
/// must re-encode to exactly the input.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let raw: CborValue =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    let value = from_cbor(raw)?;

    if encode(&value) != bytes {
        return Err(CoreError::DecodingError(
            "input is not canonically encoded".into(),
        ));
    }
    Ok(value)
}

/// Recursively encode a value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(n) => encode_integer(buf, *n),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Link(cid) => {
            encode_uint(buf, 6, LINK_TAG);
            encode_bytes(buf, cid.as_bytes());
        }
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, n: i64) {
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison, which for text keys
/// means shorter keys first, then bytewise.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &BTreeMap<String, Value>) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_text(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Convert a generic CBOR value into the restricted block data model.
fn from_cbor(raw: CborValue) -> Result<Value> {
    Ok(match raw {
        CborValue::Null => Value::Null,
        CborValue::Bool(b) => Value::Bool(b),
        CborValue::Integer(i) => {
            let n: i128 = i.into();
            let n = i64::try_from(n)
                .map_err(|_| CoreError::DecodingError(format!("integer out of range: {}", n)))?;
            Value::Integer(n)
        }
        CborValue::Bytes(b) => Value::Bytes(b),
        CborValue::Text(s) => Value::Text(s),
        CborValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor)
                .collect::<Result<Vec<_>>>()?,
        ),
        CborValue::Map(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                let key = match k {
                    CborValue::Text(s) => s,
                    _ => return Err(CoreError::DecodingError("map keys must be text".into())),
                };
                if map.insert(key, from_cbor(v)?).is_some() {
                    return Err(CoreError::DecodingError("duplicate map key".into()));
                }
            }
            Value::Map(map)
        }
        CborValue::Tag(LINK_TAG, inner) => match *inner {
            CborValue::Bytes(b) => Value::Link(
                Cid::try_from(b.as_slice())
                    .map_err(|_| CoreError::DecodingError("link must be 32 bytes".into()))?,
            ),
            _ => return Err(CoreError::DecodingError("link must wrap bytes".into())),
        },
        CborValue::Tag(tag, _) => {
            return Err(CoreError::DecodingError(format!("unsupported tag: {}", tag)))
        }
        CborValue::Float(_) => {
            return Err(CoreError::DecodingError(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => return Err(CoreError::DecodingError("unsupported CBOR value type".into())),
    })
}
