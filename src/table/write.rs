use crate::{
    codec::{
        fragment::{encode_row_fragment, Fragment},
        key::{encode_partition_header, encode_row_key},
    },
    error::{Error, Result},
    row::{Clustering, PartitionUpdate, Row, Timestamp},
    table::TableHandle,
    token::{DecoratedKey, PartitionKey},
    types::Value,
};

impl TableHandle {
    /// Write one partition update, one merge per touched key.
    ///
    /// The whole update is encoded and validated before anything reaches the
    /// engine, so a [`Error::SchemaMismatch`] leaves no partial write behind.
    pub fn apply(&self, update: &PartitionUpdate) -> Result<()> {
        let key = self.partitioner.decorate(update.key.clone());
        let mut fragments = Vec::with_capacity(update.rows.len() + 2);
        let mut rows = 0;

        if let Some(timestamp) = update.deletion {
            fragments.push((
                encode_partition_header(&key),
                Fragment::tombstone(timestamp).encode(),
            ));
        }

        if let Some(row) = update.static_row.as_ref().filter(|row| !row.is_empty()) {
            if !row.clustering.is_static() {
                return Err(Error::schema_mismatch(
                    "static row update carries clustering values",
                ));
            }
            fragments.push(self.encode_row(&key, row)?);
            rows += 1;
        }

        for row in &update.rows {
            if row.clustering.is_static() {
                return Err(Error::schema_mismatch(
                    "static row passed among clustered rows",
                ));
            }
            if row.is_empty() {
                continue;
            }
            fragments.push(self.encode_row(&key, row)?);
            rows += 1;
        }

        for (key, fragment) in &fragments {
            self.engine.merge(key, fragment)?;
            self.metrics.record_fragment_merged();
        }
        self.metrics.record_rows_written(rows);
        Ok(())
    }

    fn encode_row(&self, key: &DecoratedKey, row: &Row) -> Result<(Vec<u8>, Vec<u8>)> {
        Ok((
            encode_row_key(key, &row.clustering, &self.schema)?,
            encode_row_fragment(row, &self.schema)?,
        ))
    }

    /// Write a row tombstone at `timestamp`.
    pub fn delete_row(
        &self,
        key: impl Into<PartitionKey>,
        clustering: Vec<Value>,
        timestamp: Timestamp,
    ) -> Result<()> {
        let row = Row::new(Clustering::Row(clustering)).deleted_at(timestamp);
        self.apply(&PartitionUpdate::new(key).row(row))
    }

    /// Write a partition tombstone at `timestamp`.
    pub fn delete_partition(&self, key: impl Into<PartitionKey>, timestamp: Timestamp) -> Result<()> {
        self.apply(&PartitionUpdate::new(key).delete_partition(timestamp))
    }
}
