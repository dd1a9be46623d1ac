//! Ring ownership and the range reconciler.
//!
//! After ownership changes a node may still hold rows for token ranges it no
//! longer serves. The reconciler asks the host ring for the locally owned
//! ranges, takes their complement over the whole ring and drops each
//! complementary range with engine range tombstones.

use std::{
    collections::HashMap,
    ops::Bound,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::Level;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    logging::store_log,
    range_set::{Span, SpanSet},
    table::TableHandle,
    token::{Token, TokenRange},
};

/// Host ring/topology service.
pub trait RingService: Send + Sync {
    /// Ranges this node currently owns for `keyspace`.
    fn local_owned_ranges(&self, keyspace: &str) -> Vec<TokenRange>;

    /// Whether ring bootstrap has completed.
    fn is_joined(&self) -> bool;
}

/// A [`RingService`] with ownership set by hand, for embedding and tests.
#[derive(Debug, Default)]
pub struct FixedRing {
    joined: AtomicBool,
    owned: RwLock<HashMap<String, Vec<TokenRange>>>,
}

impl FixedRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_joined(&self, joined: bool) {
        self.joined.store(joined, Ordering::Release);
    }

    pub fn set_owned(&self, keyspace: impl Into<String>, ranges: Vec<TokenRange>) {
        self.owned.write().insert(keyspace.into(), ranges);
    }
}

impl RingService for FixedRing {
    fn local_owned_ranges(&self, keyspace: &str) -> Vec<TokenRange> {
        self.owned.read().get(keyspace).cloned().unwrap_or_default()
    }

    fn is_joined(&self) -> bool {
        self.joined.load(Ordering::Acquire)
    }
}

/// Token ranges not covered by `owned`, as sorted non-wrapping ranges.
///
/// [`Token::MIN`] is never assigned, so it is never reported as unowned.
pub fn complement_ranges(owned: &[TokenRange]) -> Vec<TokenRange> {
    let owned = SpanSet::from_spans(
        owned
            .iter()
            .flat_map(TokenRange::split_wrap)
            .map(|r| {
                Span::new(
                    Bound::Excluded(r.left().value()),
                    Bound::Included(r.right().value()),
                )
            })
            .collect(),
    );

    owned
        .complement()
        .into_spans()
        .into_iter()
        .filter_map(|gap| {
            let left = match gap.start {
                Bound::Unbounded => i64::MIN,
                Bound::Included(t) => t.saturating_sub(1),
                Bound::Excluded(t) => t,
            };
            let right = match gap.end {
                Bound::Unbounded => i64::MAX,
                Bound::Included(t) => t,
                Bound::Excluded(t) => t.checked_sub(1)?,
            };
            (left < right).then(|| TokenRange::new(Token::new(left), Token::new(right)))
        })
        .collect()
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Unowned ranges visited.
    pub ranges_examined: usize,
    /// Unowned ranges that held data and were deleted.
    pub ranges_deleted: usize,
}

/// Drops data for token ranges the local node does not own.
#[derive(Clone)]
pub struct Reconciler {
    ring: Arc<dyn RingService>,
}

impl Reconciler {
    pub fn new(ring: Arc<dyn RingService>) -> Self {
        Reconciler { ring }
    }

    /// Delete every row of `table` outside the locally owned ranges.
    ///
    /// Fails with [`Error::NotReady`] before the node has joined the ring and
    /// deletes nothing. `cancel` is observed between ranges, never inside one.
    /// Ranges that hold no keys are skipped, so a repeated pass with the same
    /// ownership deletes nothing.
    ///
    /// A failed range ends the pass with [`Error::RangeFailed`].
    pub fn reconcile(
        &self,
        table: &TableHandle,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport> {
        let name = table.schema().qualified_name();
        if !self.ring.is_joined() {
            store_log!(
                Level::Info,
                table: name,
                "reconcile_deferred",
                "node has not joined the ring"
            );
            return Err(Error::NotReady);
        }

        let owned = self.ring.local_owned_ranges(table.schema().keyspace());
        let unowned = complement_ranges(&owned);
        store_log!(
            Level::Info,
            table: name,
            "reconcile_start",
            "owned={} unowned={}",
            owned.len(),
            unowned.len()
        );

        Self::run(&name, &unowned, cancel, |range| table.delete_token_range(range))
    }

    /// Walk `unowned` in order, handing each range to `delete`.
    fn run(
        name: &str,
        unowned: &[TokenRange],
        cancel: &CancellationToken,
        mut delete: impl FnMut(&TokenRange) -> Result<usize>,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for range in unowned {
            if cancel.is_cancelled() {
                store_log!(
                    Level::Info,
                    table: name,
                    "reconcile_cancelled",
                    "examined={} deleted={}",
                    report.ranges_examined,
                    report.ranges_deleted
                );
                return Err(Error::Cancelled);
            }
            report.ranges_examined += 1;
            match delete(range) {
                Ok(0) => {}
                Ok(_) => {
                    report.ranges_deleted += 1;
                    store_log!(Level::Info, table: name, "range_deleted", "range={}", range);
                }
                Err(err) => {
                    store_log!(
                        Level::Error,
                        table: name,
                        "reconcile_failed",
                        "range={} deleted_before={} error={}",
                        range,
                        report.ranges_deleted,
                        err
                    );
                    return Err(Error::RangeFailed {
                        range: *range,
                        report,
                        source: Box::new(err),
                    });
                }
            }
        }

        store_log!(
            Level::Info,
            table: name,
            "reconcile_done",
            "examined={} deleted={}",
            report.ranges_examined,
            report.ranges_deleted
        );
        Ok(report)
    }

    /// Run [`Reconciler::reconcile`] on tokio's blocking pool.
    pub fn spawn(
        &self,
        table: Arc<TableHandle>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<ReconcileReport>> {
        let reconciler = self.clone();
        tokio::task::spawn_blocking(move || reconciler.reconcile(&table, &cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::key::encode_row_key,
        row::{Cell, Clustering, PartitionUpdate, Row},
        schema::ColumnId,
        test_util::{key_at, open_test_table},
        types::Value,
    };

    fn range(l: i64, r: i64) -> TokenRange {
        TokenRange::new(l, r)
    }

    #[test]
    fn complement_of_single_range() {
        assert_eq!(
            complement_ranges(&[range(0, 100)]),
            vec![range(i64::MIN, 0), range(100, i64::MAX)]
        );
    }

    #[test]
    fn complement_handles_wrapping_and_adjacent_ranges() {
        let owned = [range(100, -100), range(-100, 0)];
        assert_eq!(complement_ranges(&owned), vec![range(0, 100)]);
    }

    #[test]
    fn complement_of_nothing_and_everything() {
        assert_eq!(complement_ranges(&[]), vec![range(i64::MIN, i64::MAX)]);
        assert!(complement_ranges(&[TokenRange::full_ring()]).is_empty());
        assert!(complement_ranges(&[range(i64::MIN, i64::MAX)]).is_empty());
    }

    fn write_at(table: &TableHandle, token: i64) {
        let row = Row::new(Clustering::Row(vec![Value::Int32(1), Value::Text("a".into())]))
            .with_cell(Cell::live(ColumnId(0), 1, "v"));
        table
            .apply(&PartitionUpdate::new(key_at(token, "")).row(row))
            .unwrap();
    }

    fn tokens(table: &TableHandle) -> Vec<i64> {
        table
            .scan_token_range(&TokenRange::full_ring())
            .map(|item| item.unwrap().0.token.value())
            .collect()
    }

    fn joined_ring(owned: Vec<TokenRange>) -> Arc<FixedRing> {
        let ring = Arc::new(FixedRing::new());
        ring.set_owned("ks", owned);
        ring.set_joined(true);
        ring
    }

    #[test]
    fn not_ready_before_join() {
        let (_dir, _registry, table) = open_test_table();
        write_at(&table, 150);
        let ring = joined_ring(vec![range(0, 100)]);
        ring.set_joined(false);

        let reconciler = Reconciler::new(ring);
        let err = reconciler
            .reconcile(&table, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::NotReady));
        assert!(err.is_retryable());
        assert_eq!(tokens(&table), vec![150]);
    }

    #[test]
    fn cancellation_is_observed_before_the_first_range() {
        let (_dir, _registry, table) = open_test_table();
        write_at(&table, 150);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let reconciler = Reconciler::new(joined_ring(vec![range(0, 100)]));
        assert!(matches!(
            reconciler.reconcile(&table, &cancel),
            Err(Error::Cancelled)
        ));
        assert_eq!(tokens(&table), vec![150]);
    }

    #[test]
    fn cancellation_after_a_range_keeps_the_rest() {
        let (_dir, _registry, table) = open_test_table();
        write_at(&table, -5);
        write_at(&table, 150);
        let cancel = CancellationToken::new();

        let unowned = complement_ranges(&[range(0, 100)]);
        let result = Reconciler::run("ks.t", &unowned, &cancel, |range| {
            let deleted = table.delete_token_range(range);
            cancel.cancel();
            deleted
        });
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(tokens(&table), vec![150]);
    }

    #[test]
    fn failure_names_the_range_and_the_work_done() {
        let unowned = [range(i64::MIN, 0), range(100, 200), range(300, i64::MAX)];
        let err = Reconciler::run("ks.t", &unowned, &CancellationToken::new(), |range| {
            if range.left().value() == 100 {
                Err(Error::corrupt("bad block"))
            } else {
                Ok(1)
            }
        })
        .unwrap_err();

        match &err {
            Error::RangeFailed {
                range: failed,
                report,
                source,
            } => {
                assert_eq!(*failed, range(100, 200));
                assert_eq!(report.ranges_examined, 2);
                assert_eq!(report.ranges_deleted, 1);
                assert!(matches!(**source, Error::CorruptFragment(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn corrupt_rows_in_unowned_ranges_are_still_dropped() {
        let (_dir, _registry, table) = open_test_table();
        write_at(&table, 50);
        let key = encode_row_key(
            &table.decorate(key_at(150, "")),
            &Clustering::Row(vec![Value::Int32(1), Value::Text("a".into())]),
            table.schema(),
        )
        .unwrap();
        table.engine().merge(&key, b"garbage").unwrap();

        let reconciler = Reconciler::new(joined_ring(vec![range(0, 100)]));
        let report = reconciler
            .reconcile(&table, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.ranges_deleted, 1);
        assert!(table.engine().get(&key).unwrap().is_none());
        assert_eq!(tokens(&table), vec![50]);
    }

    #[tokio::test]
    async fn spawned_reconcile_drops_unowned_rows() {
        let (_dir, _registry, table) = open_test_table();
        write_at(&table, -5);
        write_at(&table, 50);
        write_at(&table, 150);

        let reconciler = Reconciler::new(joined_ring(vec![range(0, 100)]));
        let report = reconciler
            .spawn(table.clone(), CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.ranges_examined, 2);
        assert_eq!(report.ranges_deleted, 2);
        assert_eq!(tokens(&table), vec![50]);
    }
}
