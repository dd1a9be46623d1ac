//! Logical rows and the filters the read path accepts.

use std::{collections::BTreeSet, ops::Bound};

use crate::{
    schema::{ColumnId, ColumnKind, TableSchema},
    token::PartitionKey,
    types::Value,
};

/// Write timestamp in microseconds; larger wins.
pub type Timestamp = i64;

/// Position of a row inside its partition.
#[derive(Clone, Debug, PartialEq)]
pub enum Clustering {
    /// The partition's static row, ordered before every clustered row.
    Static,
    /// A clustered row, one value per clustering column.
    Row(Vec<Value>),
}

impl Clustering {
    pub fn row(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Clustering::Row(values.into_iter().map(Into::into).collect())
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Clustering::Static)
    }

    pub fn values(&self) -> &[Value] {
        match self {
            Clustering::Static => &[],
            Clustering::Row(values) => values,
        }
    }
}

/// One cell; `value == None` is a cell tombstone.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub column: ColumnId,
    pub timestamp: Timestamp,
    pub value: Option<Value>,
}

impl Cell {
    pub fn live(column: ColumnId, timestamp: Timestamp, value: impl Into<Value>) -> Self {
        Cell {
            column,
            timestamp,
            value: Some(value.into()),
        }
    }

    pub fn tombstone(column: ColumnId, timestamp: Timestamp) -> Self {
        Cell {
            column,
            timestamp,
            value: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// A logical row or a partial row mutation.
///
/// `liveness` is the primary-key liveness timestamp (a row written with no
/// value columns still exists); `deletion` is a row tombstone that shadows
/// everything in the row written at or before it.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub clustering: Clustering,
    pub liveness: Option<Timestamp>,
    pub deletion: Option<Timestamp>,
    /// Sorted by column id, at most one cell per column.
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(clustering: Clustering) -> Self {
        Row {
            clustering,
            liveness: None,
            deletion: None,
            cells: Vec::new(),
        }
    }

    pub fn with_liveness(mut self, timestamp: Timestamp) -> Self {
        self.liveness = Some(timestamp);
        self
    }

    pub fn deleted_at(mut self, timestamp: Timestamp) -> Self {
        self.deletion = Some(timestamp);
        self
    }

    /// Add or replace the cell for `cell.column`, keeping cells sorted.
    pub fn with_cell(mut self, cell: Cell) -> Self {
        match self.cells.binary_search_by_key(&cell.column, |c| c.column) {
            Ok(idx) => self.cells[idx] = cell,
            Err(idx) => self.cells.insert(idx, cell),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.liveness.is_none() && self.deletion.is_none() && self.cells.is_empty()
    }

    pub fn cell(&self, column: ColumnId) -> Option<&Cell> {
        self.cells
            .binary_search_by_key(&column, |c| c.column)
            .ok()
            .map(|idx| &self.cells[idx])
    }

    /// Live value of `column`, if any.
    pub fn value(&self, column: ColumnId) -> Option<&Value> {
        self.cell(column).and_then(|c| c.value.as_ref())
    }

    /// The visible part of this row once `partition_deletion` is applied:
    /// shadowed data and tombstones are dropped. `None` when nothing is live.
    pub fn live_view(mut self, partition_deletion: Option<Timestamp>) -> Option<Row> {
        let shadow = self.deletion.max(partition_deletion);
        let visible = |ts: Timestamp| shadow.map_or(true, |s| ts > s);

        self.cells.retain(|c| !c.is_tombstone() && visible(c.timestamp));
        self.liveness = self.liveness.filter(|ts| visible(*ts));
        self.deletion = None;

        if self.liveness.is_none() && self.cells.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    pub(crate) fn project(mut self, columns: &ColumnFilter) -> Row {
        if let ColumnFilter::Columns(wanted) = columns {
            self.cells.retain(|c| wanted.contains(&c.column));
        }
        self
    }
}

/// All writes to one partition carried by a single mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionUpdate {
    pub key: PartitionKey,
    /// Partition tombstone.
    pub deletion: Option<Timestamp>,
    pub static_row: Option<Row>,
    pub rows: Vec<Row>,
}

impl PartitionUpdate {
    pub fn new(key: impl Into<PartitionKey>) -> Self {
        PartitionUpdate {
            key: key.into(),
            deletion: None,
            static_row: None,
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    pub fn static_row(mut self, row: Row) -> Self {
        self.static_row = Some(row);
        self
    }

    pub fn delete_partition(mut self, timestamp: Timestamp) -> Self {
        self.deletion = Some(timestamp);
        self
    }
}

/// Contiguous run of clustered rows, bounded by clustering prefixes.
///
/// Bounds are positions in clustering order, so on a descending column
/// `start` holds the larger value.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
    pub start: Bound<Vec<Value>>,
    pub end: Bound<Vec<Value>>,
}

impl Slice {
    pub fn all() -> Self {
        Slice {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    pub fn new(start: Bound<Vec<Value>>, end: Bound<Vec<Value>>) -> Self {
        Slice { start, end }
    }

    /// Every row whose clustering starts with `prefix`.
    pub fn prefix(prefix: Vec<Value>) -> Self {
        Slice {
            start: Bound::Included(prefix.clone()),
            end: Bound::Included(prefix),
        }
    }
}

/// Which clustered rows a query returns.
#[derive(Clone, Debug, PartialEq)]
pub enum ClusteringFilter {
    /// Exact clustering keys, served by point lookups.
    Names(Vec<Vec<Value>>),
    /// Clustering slices, served by ordered scans.
    Slices(Vec<Slice>),
}

impl ClusteringFilter {
    pub fn all() -> Self {
        ClusteringFilter::Slices(vec![Slice::all()])
    }

    pub fn names(names: Vec<Vec<Value>>) -> Self {
        ClusteringFilter::Names(names)
    }
}

/// Which value columns are materialized.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ColumnFilter {
    #[default]
    All,
    Columns(BTreeSet<ColumnId>),
}

impl ColumnFilter {
    pub fn columns(ids: impl IntoIterator<Item = ColumnId>) -> Self {
        ColumnFilter::Columns(ids.into_iter().collect())
    }

    pub fn selects(&self, column: ColumnId) -> bool {
        match self {
            ColumnFilter::All => true,
            ColumnFilter::Columns(ids) => ids.contains(&column),
        }
    }

    /// Whether the static row is worth reading for this filter.
    pub(crate) fn selects_static(&self, schema: &TableSchema) -> bool {
        schema
            .columns()
            .iter()
            .any(|c| c.kind == ColumnKind::Static && self.selects(c.id))
    }
}
