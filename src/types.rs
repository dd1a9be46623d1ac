//! The closed set of column kinds the store understands.
//!
//! Every kind carries three encodings:
//! - *ordered*: memcomparable bytes used inside row keys; comparing two
//!   encodings byte-wise gives the same answer as [`Value::compare`].
//! - *plain*: compact bytes stored inside value fragments.
//! - the in-memory [`Value`] itself.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const SIGN_32: u32 = 1 << 31;
const SIGN_64: u64 = 1 << 63;

/// Escape byte inside variable-length ordered encodings.
const ESCAPE: u8 = 0x00;
/// Follows [`ESCAPE`] to encode a literal `0x00`.
const ESCAPED_ZERO: u8 = 0xFF;
/// Follows [`ESCAPE`] to terminate the value.
const TERMINATOR: u8 = 0x01;

/// Declared type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Int32,
    Int64,
    Float64,
    /// Milliseconds since the Unix epoch.
    Timestamp,
    Text,
    Blob,
}

impl ColumnType {
    /// Width of the ordered encoding, `None` for variable-length kinds.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ColumnType::Boolean => Some(1),
            ColumnType::Int32 => Some(4),
            ColumnType::Int64 | ColumnType::Float64 | ColumnType::Timestamp => Some(8),
            ColumnType::Text | ColumnType::Blob => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Int32 => "int",
            ColumnType::Int64 => "bigint",
            ColumnType::Float64 => "double",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
            ColumnType::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// Clustering order of one clustering column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    }
}

/// A typed column value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Timestamp(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Int32(_) => ColumnType::Int32,
            Value::Int64(_) => ColumnType::Int64,
            Value::Float64(_) => ColumnType::Float64,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Text(_) => ColumnType::Text,
            Value::Blob(_) => ColumnType::Blob,
        }
    }

    /// Ascending comparison of two values of the same kind.
    ///
    /// Values of different kinds order by their kind so the function stays
    /// total; the codecs never compare mixed kinds.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (a, b) => kind_rank(a.column_type()).cmp(&kind_rank(b.column_type())),
        }
    }

    /// Check the runtime kind against the declared type.
    pub(crate) fn expect_type(&self, expected: ColumnType, column: &str) -> Result<()> {
        let found = self.column_type();
        if found != expected {
            return Err(Error::schema_mismatch(format!(
                "column `{column}` declared {expected}, got {found}"
            )));
        }
        Ok(())
    }

    /// Append the memcomparable encoding of `self`, inverted for descending order.
    pub fn encode_ordered(&self, order: SortOrder, out: &mut Vec<u8>) {
        let start = out.len();
        match self {
            Value::Boolean(v) => out.push(u8::from(*v)),
            Value::Int32(v) => out.extend_from_slice(&((*v as u32) ^ SIGN_32).to_be_bytes()),
            Value::Int64(v) | Value::Timestamp(v) => {
                out.extend_from_slice(&((*v as u64) ^ SIGN_64).to_be_bytes())
            }
            Value::Float64(v) => out.extend_from_slice(&ordered_f64_bits(*v).to_be_bytes()),
            Value::Text(v) => escape_into(v.as_bytes(), out),
            Value::Blob(v) => escape_into(v, out),
        }
        if order == SortOrder::Descending {
            for byte in &mut out[start..] {
                *byte = !*byte;
            }
        }
    }

    /// Decode one ordered value from the front of `input`, advancing it.
    pub fn decode_ordered(ty: ColumnType, order: SortOrder, input: &mut &[u8]) -> Result<Value> {
        let flip = |b: u8| match order {
            SortOrder::Ascending => b,
            SortOrder::Descending => !b,
        };
        if let Some(width) = ty.fixed_width() {
            if input.len() < width {
                return Err(Error::corrupt(format!("truncated {ty} key component")));
            }
            let (head, rest) = input.split_at(width);
            *input = rest;
            let mut buf = [0u8; 8];
            for (dst, src) in buf.iter_mut().zip(head) {
                *dst = flip(*src);
            }
            return Ok(match ty {
                ColumnType::Boolean => match buf[0] {
                    0 => Value::Boolean(false),
                    1 => Value::Boolean(true),
                    other => {
                        return Err(Error::corrupt(format!("invalid boolean byte {other:#04x}")))
                    }
                },
                ColumnType::Int32 => {
                    let raw = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
                    Value::Int32((raw ^ SIGN_32) as i32)
                }
                ColumnType::Int64 => Value::Int64((u64::from_be_bytes(buf) ^ SIGN_64) as i64),
                ColumnType::Timestamp => {
                    Value::Timestamp((u64::from_be_bytes(buf) ^ SIGN_64) as i64)
                }
                ColumnType::Float64 => Value::Float64(f64_from_ordered_bits(u64::from_be_bytes(buf))),
                ColumnType::Text | ColumnType::Blob => unreachable!("variable width"),
            });
        }

        let bytes = unescape_from(input, flip)?;
        match ty {
            ColumnType::Text => String::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|_| Error::corrupt("text key component is not utf-8")),
            _ => Ok(Value::Blob(bytes)),
        }
    }

    /// Append the plain (fragment) encoding of `self`.
    pub fn encode_plain(&self, out: &mut Vec<u8>) {
        match self {
            Value::Boolean(v) => out.push(u8::from(*v)),
            Value::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::Int64(v) | Value::Timestamp(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::Float64(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            Value::Text(v) => out.extend_from_slice(v.as_bytes()),
            Value::Blob(v) => out.extend_from_slice(v),
        }
    }

    pub fn to_plain(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_plain(&mut out);
        out
    }

    /// Decode a complete plain encoding of kind `ty`.
    pub fn decode_plain(ty: ColumnType, bytes: &[u8]) -> Result<Value> {
        let exact = |width: usize| -> Result<&[u8]> {
            if bytes.len() != width {
                return Err(Error::corrupt(format!(
                    "{ty} cell holds {} bytes, expected {width}",
                    bytes.len()
                )));
            }
            Ok(bytes)
        };
        Ok(match ty {
            ColumnType::Boolean => match exact(1)?[0] {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => return Err(Error::corrupt(format!("invalid boolean byte {other:#04x}"))),
            },
            ColumnType::Int32 => Value::Int32(i32::from_be_bytes(array(exact(4)?))),
            ColumnType::Int64 => Value::Int64(i64::from_be_bytes(array(exact(8)?))),
            ColumnType::Timestamp => Value::Timestamp(i64::from_be_bytes(array(exact(8)?))),
            ColumnType::Float64 => {
                Value::Float64(f64::from_bits(u64::from_be_bytes(array(exact(8)?))))
            }
            ColumnType::Text => Value::Text(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| Error::corrupt("text cell is not utf-8"))?,
            ),
            ColumnType::Blob => Value::Blob(bytes.to_vec()),
        })
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

fn kind_rank(ty: ColumnType) -> u8 {
    match ty {
        ColumnType::Boolean => 0,
        ColumnType::Int32 => 1,
        ColumnType::Int64 => 2,
        ColumnType::Float64 => 3,
        ColumnType::Timestamp => 4,
        ColumnType::Text => 5,
        ColumnType::Blob => 6,
    }
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

// Same order as f64::total_cmp.
fn ordered_f64_bits(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & SIGN_64 != 0 {
        !bits
    } else {
        bits ^ SIGN_64
    }
}

fn f64_from_ordered_bits(bits: u64) -> f64 {
    if bits & SIGN_64 != 0 {
        f64::from_bits(bits ^ SIGN_64)
    } else {
        f64::from_bits(!bits)
    }
}

/// Order-preserving, prefix-free encoding of a byte string.
pub(crate) fn escape_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == ESCAPE {
            out.push(ESCAPED_ZERO);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
}

/// Inverse of [`escape_into`]; `flip` undoes a descending inversion.
pub(crate) fn unescape_from(input: &mut &[u8], flip: impl Fn(u8) -> u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < input.len() {
        let b = flip(input[pos]);
        pos += 1;
        if b != ESCAPE {
            out.push(b);
            continue;
        }
        let Some(&next) = input.get(pos) else {
            break;
        };
        pos += 1;
        match flip(next) {
            ESCAPED_ZERO => out.push(ESCAPE),
            TERMINATOR => {
                *input = &input[pos..];
                return Ok(out);
            }
            other => {
                return Err(Error::corrupt(format!(
                    "invalid escape sequence 0x00 {other:#04x}"
                )))
            }
        }
    }
    Err(Error::corrupt("unterminated variable-length key component"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordered(v: &Value, order: SortOrder) -> Vec<u8> {
        let mut out = Vec::new();
        v.encode_ordered(order, &mut out);
        out
    }

    #[test]
    fn signed_integers_sort_across_zero() {
        let values = [i64::MIN, -7, -1, 0, 1, 42, i64::MAX];
        let encoded: Vec<_> = values
            .iter()
            .map(|v| ordered(&Value::Int64(*v), SortOrder::Ascending))
            .collect();
        assert!(encoded.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn floats_follow_total_order() {
        let values = [f64::NEG_INFINITY, -2.5, -0.0, 0.0, 1e-300, 3.0, f64::INFINITY];
        let encoded: Vec<_> = values
            .iter()
            .map(|v| ordered(&Value::Float64(*v), SortOrder::Ascending))
            .collect();
        assert!(encoded.windows(2).all(|w| w[0] < w[1]));

        let mut input = encoded[1].as_slice();
        let back = Value::decode_ordered(ColumnType::Float64, SortOrder::Ascending, &mut input)
            .unwrap();
        assert_eq!(back, Value::Float64(-2.5));
        assert!(input.is_empty());
    }

    #[test]
    fn escaped_strings_keep_prefix_order() {
        let a = ordered(&Value::Blob(b"ab".to_vec()), SortOrder::Ascending);
        let b = ordered(&Value::Blob(b"ab\0".to_vec()), SortOrder::Ascending);
        let c = ordered(&Value::Blob(b"ab\x01".to_vec()), SortOrder::Ascending);
        let d = ordered(&Value::Blob(b"b".to_vec()), SortOrder::Ascending);
        assert!(a < b && b < c && c < d);
    }

    #[test]
    fn descending_inverts_order_and_decodes() {
        let small = ordered(&Value::Text("apple".into()), SortOrder::Descending);
        let large = ordered(&Value::Text("banana".into()), SortOrder::Descending);
        assert!(large < small);

        let mut input = small.as_slice();
        let back =
            Value::decode_ordered(ColumnType::Text, SortOrder::Descending, &mut input).unwrap();
        assert_eq!(back, Value::Text("apple".into()));
        assert!(input.is_empty());
    }

    #[test]
    fn plain_encoding_rejects_wrong_width() {
        let err = Value::decode_plain(ColumnType::Int32, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::CorruptFragment(_)));
        assert_eq!(
            Value::decode_plain(ColumnType::Int32, &Value::Int32(-9).to_plain()).unwrap(),
            Value::Int32(-9)
        );
    }

    #[test]
    fn unterminated_component_is_corrupt() {
        let mut input: &[u8] = b"abc";
        let err =
            Value::decode_ordered(ColumnType::Blob, SortOrder::Ascending, &mut input).unwrap_err();
        assert!(matches!(err, Error::CorruptFragment(_)));
    }

    #[test]
    fn expect_type_reports_mismatch() {
        let err = Value::Int32(1).expect_type(ColumnType::Text, "c").unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
    }
}
