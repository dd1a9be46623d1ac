//! Per-table counters.
//!
//! Counters are updated with relaxed atomics on the hot path and read through
//! a point-in-time [`TableMetricsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of one table's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct TableMetricsSnapshot {
    /// Rows (static rows included) accepted by the write path.
    pub rows_written: u64,
    /// Merge operands handed to the engine, one per written key.
    pub fragments_merged: u64,
    /// Live rows returned by the read path.
    pub rows_read: u64,
    /// Reads that failed on undecodable stored bytes.
    pub corrupt_reads: u64,
    /// Token ranges physically deleted by the reconciler.
    pub ranges_deleted: u64,
    /// Files produced by exports.
    pub files_exported: u64,
    /// Files ingested by imports.
    pub files_imported: u64,
}

#[derive(Debug, Default)]
pub(crate) struct TableMetrics {
    rows_written: AtomicU64,
    fragments_merged: AtomicU64,
    rows_read: AtomicU64,
    corrupt_reads: AtomicU64,
    ranges_deleted: AtomicU64,
    files_exported: AtomicU64,
    files_imported: AtomicU64,
}

impl TableMetrics {
    pub(crate) fn record_rows_written(&self, rows: u64) {
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
    }

    pub(crate) fn record_fragment_merged(&self) {
        self.fragments_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_row_read(&self) {
        self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_corrupt_read(&self) {
        self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_range_deleted(&self) {
        self.ranges_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_files_exported(&self, files: u64) {
        self.files_exported.fetch_add(files, Ordering::Relaxed);
    }

    pub(crate) fn record_files_imported(&self, files: u64) {
        self.files_imported.fetch_add(files, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TableMetricsSnapshot {
        TableMetricsSnapshot {
            rows_written: self.rows_written.load(Ordering::Relaxed),
            fragments_merged: self.fragments_merged.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            corrupt_reads: self.corrupt_reads.load(Ordering::Relaxed),
            ranges_deleted: self.ranges_deleted.load(Ordering::Relaxed),
            files_exported: self.files_exported.load(Ordering::Relaxed),
            files_imported: self.files_imported.load(Ordering::Relaxed),
        }
    }
}
