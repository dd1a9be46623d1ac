use std::{ops::Bound, vec};

use crate::{
    codec::{
        fragment::{decode_row, Fragment},
        key::{
            decode_row_key, encode_partition_header, encode_row_key, slice_bounds,
            token_range_bounds,
        },
    },
    engine::EntryIter,
    error::{Error, Result},
    range_set::{Span, SpanSet},
    row::{Clustering, ClusteringFilter, ColumnFilter, Row, Timestamp},
    table::TableHandle,
    token::{DecoratedKey, PartitionKey, TokenRange},
    types::Value,
};

impl TableHandle {
    /// Read one partition.
    ///
    /// The partition tombstone is resolved up front; rows are then fetched
    /// lazily, either by point lookups ([`ClusteringFilter::Names`]) or by one
    /// ordered scan per normalized slice. Every row comes back purged of
    /// shadowed data and projected to `columns`; fully deleted rows are skipped.
    pub fn query(
        &self,
        key: impl Into<PartitionKey>,
        clustering: &ClusteringFilter,
        columns: &ColumnFilter,
    ) -> Result<RowIter<'_>> {
        let key = self.partitioner.decorate(key.into());
        let partition_deletion = self
            .partition_deletion(&key)
            .map_err(|err| self.read_failed(err))?;

        let static_key = if columns.selects_static(&self.schema) {
            Some(encode_row_key(&key, &Clustering::Static, &self.schema)?)
        } else {
            None
        };

        let source = match clustering {
            ClusteringFilter::Names(names) => {
                let mut points = names
                    .iter()
                    .map(|values| {
                        let clustering = Clustering::Row(values.clone());
                        encode_row_key(&key, &clustering, &self.schema)
                            .map(|encoded| (encoded, clustering))
                    })
                    .collect::<Result<Vec<_>>>()?;
                points.sort_by(|a, b| a.0.cmp(&b.0));
                points.dedup_by(|a, b| a.0 == b.0);
                Source::Points(points.into_iter())
            }
            ClusteringFilter::Slices(slices) => {
                let mut spans = Vec::with_capacity(slices.len());
                for slice in slices {
                    let (lo, hi) = slice_bounds(&key, slice, &self.schema)?;
                    spans.push(Span::new(Bound::Included(lo), Bound::Excluded(hi)));
                }
                Source::Spans {
                    pending: half_open(SpanSet::from_spans(spans)).into_iter(),
                    current: None,
                }
            }
        };

        Ok(RowIter {
            table: self,
            partition_deletion,
            columns: columns.clone(),
            static_key,
            source,
            done: false,
        })
    }

    /// Point lookup of one clustered row.
    pub fn get_row(
        &self,
        key: impl Into<PartitionKey>,
        clustering: Vec<Value>,
        columns: &ColumnFilter,
    ) -> Result<Option<Row>> {
        let mut rows = self
            .query(key, &ClusteringFilter::Names(vec![clustering]), columns)?
            .filter(|row| !matches!(row, Ok(row) if row.clustering.is_static()));
        rows.next().transpose()
    }

    /// Every live row whose partition token falls in `range`, in key order.
    pub fn scan_token_range(&self, range: &TokenRange) -> TokenRangeIter<'_> {
        TokenRangeIter {
            table: self,
            pending: token_range_bounds(range).into_iter(),
            current: None,
            partition: None,
            done: false,
        }
    }

    fn partition_deletion(&self, key: &DecoratedKey) -> Result<Option<Timestamp>> {
        match self.engine.get(&encode_partition_header(key))? {
            Some(bytes) => Ok(Fragment::decode(&bytes)?.deletion),
            None => Ok(None),
        }
    }
}

// Spans built from `[lo, hi)` pairs keep that shape through normalization.
fn half_open(set: SpanSet<Vec<u8>>) -> Vec<(Vec<u8>, Vec<u8>)> {
    set.into_spans()
        .into_iter()
        .filter_map(|span| match (span.start, span.end) {
            (Bound::Included(lo), Bound::Excluded(hi)) => Some((lo, hi)),
            _ => None,
        })
        .collect()
}

enum Source<'a> {
    Points(vec::IntoIter<(Vec<u8>, Clustering)>),
    Spans {
        pending: vec::IntoIter<(Vec<u8>, Vec<u8>)>,
        current: Option<EntryIter<'a>>,
    },
}

/// Lazy, forward-only rows of one partition. Ends after the first error.
pub struct RowIter<'a> {
    table: &'a TableHandle,
    partition_deletion: Option<Timestamp>,
    columns: ColumnFilter,
    static_key: Option<Vec<u8>>,
    source: Source<'a>,
    done: bool,
}

impl RowIter<'_> {
    /// Partition tombstone observed when the query started.
    pub fn partition_deletion(&self) -> Option<Timestamp> {
        self.partition_deletion
    }

    fn next_stored(&mut self) -> Option<Result<(Clustering, Vec<u8>)>> {
        let table = self.table;
        if let Some(key) = self.static_key.take() {
            match table.engine.get(&key) {
                Ok(Some(bytes)) => return Some(Ok((Clustering::Static, bytes))),
                Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }
        }

        match &mut self.source {
            Source::Points(points) => {
                for (key, clustering) in points.by_ref() {
                    match table.engine.get(&key) {
                        Ok(Some(bytes)) => return Some(Ok((clustering, bytes))),
                        Ok(None) => continue,
                        Err(err) => return Some(Err(err)),
                    }
                }
                None
            }
            Source::Spans { pending, current } => loop {
                if let Some(scan) = current {
                    match scan.next() {
                        Some(Ok((key, value))) => {
                            return Some(decode_row_key(&key, &table.schema).and_then(|decoded| {
                                let clustering = decoded.clustering.ok_or_else(|| {
                                    Error::corrupt("partition header inside a row span")
                                })?;
                                Ok((clustering, value.into_vec()))
                            }))
                        }
                        Some(Err(err)) => return Some(Err(err)),
                        None => *current = None,
                    }
                }
                let (lo, hi) = pending.next()?;
                *current = Some(table.engine.scan(&lo, &hi));
            },
        }
    }
}

impl Iterator for RowIter<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let decoded = match self.next_stored()? {
                Ok((clustering, bytes)) => decode_row(clustering, &bytes, &self.table.schema),
                Err(err) => Err(err),
            };
            let row = match decoded {
                Ok(row) => row,
                Err(err) => {
                    self.done = true;
                    return Some(Err(self.table.read_failed(err)));
                }
            };
            let Some(row) = row.live_view(self.partition_deletion) else {
                continue;
            };
            let row = row.project(&self.columns);
            if row.clustering.is_static() && row.cells.is_empty() {
                continue;
            }
            self.table.metrics.record_row_read();
            return Some(Ok(row));
        }
        None
    }
}

/// Live rows across a token range, tagged with their partition.
pub struct TokenRangeIter<'a> {
    table: &'a TableHandle,
    pending: vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    current: Option<EntryIter<'a>>,
    partition: Option<(DecoratedKey, Option<Timestamp>)>,
    done: bool,
}

impl TokenRangeIter<'_> {
    fn next_entry(&mut self) -> Option<Result<(Box<[u8]>, Box<[u8]>)>> {
        loop {
            if let Some(scan) = &mut self.current {
                match scan.next() {
                    Some(entry) => return Some(entry),
                    None => self.current = None,
                }
            }
            let (lo, hi) = self.pending.next()?;
            self.current = Some(self.table.engine.scan(&lo, &hi));
        }
    }

    fn next_row(&mut self) -> Option<Result<(DecoratedKey, Row)>> {
        let schema = &self.table.schema;
        loop {
            let (key, value) = match self.next_entry()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err)),
            };
            let decoded = match decode_row_key(&key, schema) {
                Ok(decoded) => decoded,
                Err(err) => return Some(Err(err)),
            };

            let Some(clustering) = decoded.clustering else {
                // The header sorts before every row of its partition.
                match Fragment::decode(&value) {
                    Ok(header) => self.partition = Some((decoded.partition, header.deletion)),
                    Err(err) => return Some(Err(err)),
                }
                continue;
            };

            let deletion = match &self.partition {
                Some((partition, deletion)) if *partition == decoded.partition => *deletion,
                _ => {
                    self.partition = Some((decoded.partition.clone(), None));
                    None
                }
            };
            match decode_row(clustering, &value, schema) {
                Ok(row) => {
                    if let Some(row) = row.live_view(deletion) {
                        return Some(Ok((decoded.partition, row)));
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl Iterator for TokenRangeIter<'_> {
    type Item = Result<(DecoratedKey, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_row()? {
            Ok(item) => {
                self.table.metrics.record_row_read();
                Some(Ok(item))
            }
            Err(err) => {
                self.done = true;
                Some(Err(self.table.read_failed(err)))
            }
        }
    }
}
