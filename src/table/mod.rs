//! Per-table handle: the write path, the read path and range maintenance.

mod read;
mod write;

use std::{fmt, sync::Arc};

use log::Level;

pub use self::read::{RowIter, TokenRangeIter};
use crate::{
    codec::key::token_range_bounds,
    engine::TableEngine,
    error::{Error, Result},
    logging::store_log,
    metrics::{TableMetrics, TableMetricsSnapshot},
    schema::{TableId, TableSchema},
    token::{DecoratedKey, PartitionKey, Partitioner, TokenRange},
};

/// An open table. Shared across threads; every operation takes `&self`.
pub struct TableHandle {
    schema: Arc<TableSchema>,
    engine: TableEngine,
    partitioner: Arc<dyn Partitioner>,
    metrics: TableMetrics,
}

impl TableHandle {
    pub(crate) fn new(
        schema: Arc<TableSchema>,
        engine: TableEngine,
        partitioner: Arc<dyn Partitioner>,
    ) -> Self {
        TableHandle {
            schema,
            engine,
            partitioner,
            metrics: TableMetrics::default(),
        }
    }

    pub fn id(&self) -> TableId {
        self.schema.id()
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn partitioner(&self) -> &dyn Partitioner {
        self.partitioner.as_ref()
    }

    /// Pair `key` with its token under this table's partitioner.
    pub fn decorate(&self, key: impl Into<PartitionKey>) -> DecoratedKey {
        self.partitioner.decorate(key.into())
    }

    pub fn metrics(&self) -> TableMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Persist memtables to disk.
    pub fn flush(&self) -> Result<()> {
        self.engine.flush()
    }

    /// Remove every key whose token falls in `range` with range tombstones.
    ///
    /// Spans that hold no keys are left alone; returns how many spans were
    /// deleted.
    pub fn delete_token_range(&self, range: &TokenRange) -> Result<usize> {
        let mut deleted = 0;
        for (lo, hi) in token_range_bounds(range) {
            if !self.engine.has_entries(&lo, &hi)? {
                continue;
            }
            self.engine.delete_range(&lo, &hi)?;
            self.metrics.record_range_deleted();
            deleted += 1;
        }
        Ok(deleted)
    }

    pub(crate) fn engine(&self) -> &TableEngine {
        &self.engine
    }

    pub(crate) fn metrics_ref(&self) -> &TableMetrics {
        &self.metrics
    }

    /// Account for a failed read before handing the error back.
    pub(crate) fn read_failed(&self, err: Error) -> Error {
        if let Error::CorruptFragment(reason) = &err {
            self.metrics.record_corrupt_read();
            store_log!(
                Level::Error,
                table: self.schema.qualified_name(),
                "corrupt_fragment",
                "reason={}",
                reason
            );
        }
        err
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("table", &self.schema.qualified_name())
            .field("id", &self.schema.id())
            .field("path", &self.engine.path())
            .finish()
    }
}
