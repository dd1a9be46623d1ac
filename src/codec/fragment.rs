//! Value fragments and the merge function the engine applies to them.
//!
//! A fragment holds only what one mutation wrote:
//!
//! ```text
//! fragment = version u8 | flags u8 | [deletion i64] | [liveness i64]
//!          | cell count u16 | cell* | crc32 u32
//! cell     = column id u16 | timestamp i64 | kind u8 | [len u32 | plain value]
//! ```
//!
//! Fragments are kept canonical (cells sorted by id, shadowed data purged), so
//! merging any set of fragments in any order or grouping yields identical
//! bytes.

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{
    error::{Error, Result},
    row::{Cell, Clustering, Row, Timestamp},
    schema::{ColumnId, ColumnKind, TableSchema},
    types::Value,
};

pub const FRAGMENT_VERSION: u8 = 1;

const FLAG_DELETION: u8 = 0b01;
const FLAG_LIVENESS: u8 = 0b10;

const CELL_LIVE: u8 = 0;
const CELL_TOMBSTONE: u8 = 1;

const CRC_LEN: usize = 4;

/// Largest plain value a cell can carry; lengths are stored as u32.
pub const MAX_VALUE_LEN: usize = u32::MAX as usize;

/// A stored cell with its value still in plain bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredCell {
    pub timestamp: Timestamp,
    /// `None` for a cell tombstone.
    pub value: Option<Vec<u8>>,
}

impl StoredCell {
    /// Pick the surviving version of a cell.
    ///
    /// Later timestamp wins; on a tie a tombstone beats a value, and between
    /// two values the larger plain encoding wins. This is a max over a total
    /// order, which keeps reconciliation commutative and associative.
    pub fn reconcile(self, other: StoredCell) -> StoredCell {
        match self.timestamp.cmp(&other.timestamp) {
            Ordering::Greater => self,
            Ordering::Less => other,
            Ordering::Equal => match (&self.value, &other.value) {
                (None, _) => self,
                (_, None) => other,
                (Some(a), Some(b)) => {
                    if a >= b {
                        self
                    } else {
                        other
                    }
                }
            },
        }
    }
}

fn check_value_len(len: usize, column: &str) -> Result<()> {
    if len > MAX_VALUE_LEN {
        return Err(Error::schema_mismatch(format!(
            "value of {len} bytes for column `{column}` exceeds {MAX_VALUE_LEN} bytes"
        )));
    }
    Ok(())
}

/// Decoded, schema-free form of a value fragment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    pub deletion: Option<Timestamp>,
    pub liveness: Option<Timestamp>,
    pub cells: BTreeMap<ColumnId, StoredCell>,
}

impl Fragment {
    /// Fragment carrying only a tombstone; used for partition headers.
    pub fn tombstone(timestamp: Timestamp) -> Self {
        Fragment {
            deletion: Some(timestamp),
            ..Fragment::default()
        }
    }

    /// Build from a logical row, checking every cell against the schema.
    pub fn from_row(row: &Row, schema: &TableSchema) -> Result<Self> {
        let expected_kind = match row.clustering {
            Clustering::Static => ColumnKind::Static,
            Clustering::Row(_) => ColumnKind::Regular,
        };

        let mut fragment = Fragment {
            deletion: row.deletion,
            liveness: row.liveness,
            cells: BTreeMap::new(),
        };
        for cell in &row.cells {
            let column = schema.column(cell.column).ok_or_else(|| {
                Error::schema_mismatch(format!(
                    "column {} is not defined in {}",
                    cell.column,
                    schema.qualified_name()
                ))
            })?;
            if column.kind != expected_kind {
                return Err(Error::schema_mismatch(format!(
                    "column `{}` is {:?} but was written to a {:?} row",
                    column.name, column.kind, expected_kind
                )));
            }
            let value = match &cell.value {
                Some(value) => {
                    value.expect_type(column.ty, &column.name)?;
                    let plain = value.to_plain();
                    check_value_len(plain.len(), &column.name)?;
                    Some(plain)
                }
                None => None,
            };
            fragment.insert(
                cell.column,
                StoredCell {
                    timestamp: cell.timestamp,
                    value,
                },
            );
        }
        fragment.purge();
        Ok(fragment)
    }

    /// Type the cells against `schema`.
    pub fn into_row(self, clustering: Clustering, schema: &TableSchema) -> Result<Row> {
        let mut cells = Vec::with_capacity(self.cells.len());
        for (id, cell) in self.cells {
            let column = schema.column(id).ok_or_else(|| {
                Error::corrupt(format!(
                    "fragment references column {id} unknown to {}",
                    schema.qualified_name()
                ))
            })?;
            let value = match cell.value {
                Some(bytes) => Some(Value::decode_plain(column.ty, &bytes)?),
                None => None,
            };
            cells.push(Cell {
                column: id,
                timestamp: cell.timestamp,
                value,
            });
        }
        Ok(Row {
            clustering,
            liveness: self.liveness,
            deletion: self.deletion,
            cells,
        })
    }

    fn insert(&mut self, id: ColumnId, cell: StoredCell) {
        let merged = match self.cells.remove(&id) {
            Some(existing) => existing.reconcile(cell),
            None => cell,
        };
        self.cells.insert(id, merged);
    }

    /// Reconcile two fragments of the same key.
    pub fn merge(mut self, other: Fragment) -> Fragment {
        self.deletion = self.deletion.max(other.deletion);
        self.liveness = self.liveness.max(other.liveness);
        for (id, cell) in other.cells {
            self.insert(id, cell);
        }
        self.purge();
        self
    }

    // Drop whatever the row tombstone shadows.
    fn purge(&mut self) {
        if let Some(deletion) = self.deletion {
            self.cells.retain(|_, cell| cell.timestamp > deletion);
            if self.liveness.is_some_and(|ts| ts <= deletion) {
                self.liveness = None;
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.cells.len() * 16);
        let mut flags = 0;
        if self.deletion.is_some() {
            flags |= FLAG_DELETION;
        }
        if self.liveness.is_some() {
            flags |= FLAG_LIVENESS;
        }
        out.push(FRAGMENT_VERSION);
        out.push(flags);
        if let Some(ts) = self.deletion {
            out.extend_from_slice(&ts.to_be_bytes());
        }
        if let Some(ts) = self.liveness {
            out.extend_from_slice(&ts.to_be_bytes());
        }
        out.extend_from_slice(&(self.cells.len() as u16).to_be_bytes());
        for (id, cell) in &self.cells {
            out.extend_from_slice(&id.0.to_be_bytes());
            out.extend_from_slice(&cell.timestamp.to_be_bytes());
            match &cell.value {
                Some(value) => {
                    out.push(CELL_LIVE);
                    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                    out.extend_from_slice(value);
                }
                None => out.push(CELL_TOMBSTONE),
            }
        }
        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 + 2 + CRC_LEN {
            return Err(Error::corrupt(format!("fragment of {} bytes is truncated", bytes.len())));
        }
        let (body, crc) = bytes.split_at(bytes.len() - CRC_LEN);
        let expected = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);
        if crc32fast::hash(body) != expected {
            return Err(Error::corrupt("fragment checksum mismatch"));
        }

        let mut reader = Reader { buf: body };
        let version = reader.u8()?;
        if version != FRAGMENT_VERSION {
            return Err(Error::corrupt(format!("unsupported fragment version {version}")));
        }
        let flags = reader.u8()?;
        if flags & !(FLAG_DELETION | FLAG_LIVENESS) != 0 {
            return Err(Error::corrupt(format!("unknown fragment flags {flags:#04x}")));
        }
        let deletion = (flags & FLAG_DELETION != 0).then(|| reader.i64()).transpose()?;
        let liveness = (flags & FLAG_LIVENESS != 0).then(|| reader.i64()).transpose()?;

        let count = reader.u16()?;
        let mut cells = BTreeMap::new();
        let mut previous: Option<ColumnId> = None;
        for _ in 0..count {
            let id = ColumnId(reader.u16()?);
            if previous.is_some_and(|p| p >= id) {
                return Err(Error::corrupt("fragment cells are not strictly ordered"));
            }
            previous = Some(id);
            let timestamp = reader.i64()?;
            let value = match reader.u8()? {
                CELL_LIVE => {
                    let len = reader.u32()? as usize;
                    Some(reader.bytes(len)?.to_vec())
                }
                CELL_TOMBSTONE => None,
                other => return Err(Error::corrupt(format!("unknown cell kind {other}"))),
            };
            cells.insert(id, StoredCell { timestamp, value });
        }
        if !reader.buf.is_empty() {
            return Err(Error::corrupt(format!(
                "{} trailing bytes in fragment",
                reader.buf.len()
            )));
        }

        Ok(Fragment {
            deletion,
            liveness,
            cells,
        })
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.buf.len() < len {
            return Err(Error::corrupt("fragment ends mid-field"));
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.bytes(8)?);
        Ok(i64::from_be_bytes(raw))
    }
}

/// Encode the part of `row` that one mutation wrote.
pub fn encode_row_fragment(row: &Row, schema: &TableSchema) -> Result<Vec<u8>> {
    Ok(Fragment::from_row(row, schema)?.encode())
}

/// Decode a stored fragment into a row positioned at `clustering`.
pub fn decode_row(clustering: Clustering, bytes: &[u8], schema: &TableSchema) -> Result<Row> {
    Fragment::decode(bytes)?.into_row(clustering, schema)
}

/// Combine two encoded fragments of the same key.
///
/// Pure function of its inputs; no schema is needed because fragments are
/// self-describing.
pub fn merge(existing: &[u8], incoming: &[u8]) -> Result<Vec<u8>> {
    Ok(Fragment::decode(existing)?
        .merge(Fragment::decode(incoming)?)
        .encode())
}

/// Fold `operands` onto an optional base value, as the engine's merge
/// callback does.
pub fn merge_all<'a>(
    existing: Option<&[u8]>,
    operands: impl IntoIterator<Item = &'a [u8]>,
) -> Result<Vec<u8>> {
    let mut acc = match existing {
        Some(bytes) => Fragment::decode(bytes)?,
        None => Fragment::default(),
    };
    for operand in operands {
        acc = acc.merge(Fragment::decode(operand)?);
    }
    Ok(acc.encode())
}
