//! Row key codec.
//!
//! ```text
//! row key   = 0x01 | token | escaped(partition key) | kind | component*
//! token     = 8 bytes big-endian, sign bit flipped
//! kind      = 0x00 partition header | 0x01 static row | 0x02 clustered row
//! component = 0x01 | ordered value (bytes inverted for descending columns)
//! ```
//!
//! Byte order of encoded keys equals (token, partition key, clustering) order,
//! which makes every token range a contiguous span of the engine's key space.

use std::ops::Bound;

use crate::{
    error::{Error, Result},
    row::{Clustering, Slice},
    schema::TableSchema,
    token::{DecoratedKey, PartitionKey, Token, TokenRange},
    types::{escape_into, unescape_from, Value},
};

/// Leading byte of every row key.
pub const ROW_KEY_TAG: u8 = 0x01;
/// Sorts after every row key; the bound past [`Token::MAX`].
pub const END_OF_RING: u8 = 0x02;

const KIND_PARTITION: u8 = 0x00;
const KIND_STATIC: u8 = 0x01;
const KIND_ROW: u8 = 0x02;
const PARTITION_END: u8 = 0x03;

const COMPONENT: u8 = 0x01;
const AFTER_PREFIX: u8 = 0x02;

const TOKEN_SIGN: u64 = 1 << 63;
const TOKEN_LEN: usize = 8;

/// Logical identity recovered from a stored key.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedKey {
    pub partition: DecoratedKey,
    /// `None` for the partition header entry.
    pub clustering: Option<Clustering>,
}

fn encode_token(token: Token, out: &mut Vec<u8>) {
    out.extend_from_slice(&((token.value() as u64) ^ TOKEN_SIGN).to_be_bytes());
}

/// Infimum of all keys whose token is strictly greater than `token`.
///
/// `[encode_token_bound(l), encode_token_bound(r))` therefore holds exactly
/// the keys with a token in `(l, r]`.
pub fn encode_token_bound(token: Token) -> Vec<u8> {
    match token.successor() {
        Some(next) => {
            let mut out = Vec::with_capacity(1 + TOKEN_LEN);
            out.push(ROW_KEY_TAG);
            encode_token(next, &mut out);
            out
        }
        None => vec![END_OF_RING],
    }
}

/// Half-open key spans `[start, end)` covering `range`; two spans when the
/// range wraps.
pub fn token_range_bounds(range: &TokenRange) -> Vec<(Vec<u8>, Vec<u8>)> {
    range
        .split_wrap()
        .into_iter()
        .map(|r| (encode_token_bound(r.left()), encode_token_bound(r.right())))
        .collect()
}

/// Bytes shared by every key of one partition.
pub fn partition_prefix(key: &DecoratedKey) -> Vec<u8> {
    let pk = key.key.as_bytes();
    let mut out = Vec::with_capacity(1 + TOKEN_LEN + pk.len() + 4);
    out.push(ROW_KEY_TAG);
    encode_token(key.token, &mut out);
    escape_into(pk, &mut out);
    out
}

/// Key of the entry holding the partition tombstone.
pub fn encode_partition_header(key: &DecoratedKey) -> Vec<u8> {
    let mut out = partition_prefix(key);
    out.push(KIND_PARTITION);
    out
}

pub fn encode_row_key(
    key: &DecoratedKey,
    clustering: &Clustering,
    schema: &TableSchema,
) -> Result<Vec<u8>> {
    let mut out = partition_prefix(key);
    match clustering {
        Clustering::Static => out.push(KIND_STATIC),
        Clustering::Row(values) => {
            schema.check_clustering(values, false)?;
            out.push(KIND_ROW);
            push_components(values, schema, &mut out);
        }
    }
    Ok(out)
}

/// `[start, end)` spanning every entry of the partition.
pub fn partition_bounds(key: &DecoratedKey) -> (Vec<u8>, Vec<u8>) {
    let start = partition_prefix(key);
    let mut end = start.clone();
    end.push(PARTITION_END);
    (start, end)
}

/// `[start, end)` spanning the clustered rows selected by `slice`.
pub fn slice_bounds(
    key: &DecoratedKey,
    slice: &Slice,
    schema: &TableSchema,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut rows = partition_prefix(key);
    rows.push(KIND_ROW);

    let with_prefix = |prefix: &[Value], after: bool| -> Result<Vec<u8>> {
        schema.check_clustering(prefix, true)?;
        let mut out = rows.clone();
        push_components(prefix, schema, &mut out);
        if after {
            out.push(AFTER_PREFIX);
        }
        Ok(out)
    };

    let start = match &slice.start {
        Bound::Unbounded => rows.clone(),
        Bound::Included(prefix) => with_prefix(prefix, false)?,
        Bound::Excluded(prefix) => with_prefix(prefix, true)?,
    };
    let end = match &slice.end {
        Bound::Unbounded => {
            let mut out = partition_prefix(key);
            out.push(PARTITION_END);
            out
        }
        Bound::Included(prefix) => with_prefix(prefix, true)?,
        Bound::Excluded(prefix) => with_prefix(prefix, false)?,
    };
    Ok((start, end))
}

fn push_components(values: &[Value], schema: &TableSchema, out: &mut Vec<u8>) {
    for (value, column) in values.iter().zip(schema.clustering()) {
        out.push(COMPONENT);
        value.encode_ordered(column.order, out);
    }
}

/// Token of a stored key, without decoding the rest.
pub fn decode_token(bytes: &[u8]) -> Result<Token> {
    match bytes {
        [ROW_KEY_TAG, rest @ ..] if rest.len() >= TOKEN_LEN => {
            let mut raw = [0u8; TOKEN_LEN];
            raw.copy_from_slice(&rest[..TOKEN_LEN]);
            Ok(Token::new((u64::from_be_bytes(raw) ^ TOKEN_SIGN) as i64))
        }
        _ => Err(Error::corrupt("row key is missing its token")),
    }
}

pub fn decode_row_key(bytes: &[u8], schema: &TableSchema) -> Result<DecodedKey> {
    let token = decode_token(bytes)?;
    let mut input = &bytes[1 + TOKEN_LEN..];
    let pk = unescape_from(&mut input, |b| b)?;

    let (&kind, rest) = input
        .split_first()
        .ok_or_else(|| Error::corrupt("row key is missing its kind"))?;
    input = rest;

    let clustering = match kind {
        KIND_PARTITION => None,
        KIND_STATIC => Some(Clustering::Static),
        KIND_ROW => {
            let mut values = Vec::with_capacity(schema.clustering().len());
            for column in schema.clustering() {
                match input.split_first() {
                    Some((&COMPONENT, rest)) => input = rest,
                    _ => {
                        return Err(Error::corrupt(format!(
                            "row key is missing clustering component `{}`",
                            column.name
                        )))
                    }
                }
                values.push(Value::decode_ordered(column.ty, column.order, &mut input)?);
            }
            Some(Clustering::Row(values))
        }
        other => return Err(Error::corrupt(format!("unknown row key kind {other:#04x}"))),
    };

    if !input.is_empty() {
        return Err(Error::corrupt(format!(
            "{} trailing bytes after row key",
            input.len()
        )));
    }

    Ok(DecodedKey {
        partition: DecoratedKey {
            token,
            key: PartitionKey::new(pk),
        },
        clustering,
    })
}
