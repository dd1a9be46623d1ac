//! Token-ordered row storage on top of an embedded LSM engine.
//!
//! Each table of a partitioned, wide-row database is stored in its own
//! RocksDB instance. Row keys are encoded so that byte order equals
//! (token, partition key, clustering) order, which turns every token range
//! into one contiguous key span: ranges can be dropped with a single range
//! tombstone and shipped between nodes as engine files. Values are partial
//! row fragments reconciled by an engine merge operator, so writes never read
//! before writing.
//!
//! The entry point is [`EngineRegistry`], which opens one [`TableHandle`] per
//! table on first use. Handles expose the write path ([`TableHandle::apply`]),
//! the read path ([`TableHandle::query`]) and token-range maintenance;
//! [`Reconciler`] and the [`transfer`] module build on them.

mod logging;

pub mod codec;
mod engine;
pub mod error;
pub mod metrics;
pub mod option;
pub mod range_set;
pub mod registry;
pub mod ring;
pub mod row;
pub mod schema;
pub mod table;
pub mod token;
pub mod transfer;
pub mod types;

#[cfg(test)]
mod test_util;

pub use crate::{
    engine::MERGE_OPERATOR_NAME,
    error::{Error, Result},
    metrics::TableMetricsSnapshot,
    option::StoreOptions,
    registry::EngineRegistry,
    ring::{complement_ranges, FixedRing, ReconcileReport, Reconciler, RingService},
    row::{Cell, Clustering, ClusteringFilter, ColumnFilter, PartitionUpdate, Row, Slice, Timestamp},
    schema::{ColumnId, ColumnKind, SchemaCatalog, SchemaService, TableId, TableSchema},
    table::{RowIter, TableHandle, TokenRangeIter},
    token::{DecoratedKey, PartitionKey, Partitioner, Token, TokenRange, Xxh3Partitioner},
    transfer::{TransferFile, TransferManifest},
    types::{ColumnType, SortOrder, Value},
};
