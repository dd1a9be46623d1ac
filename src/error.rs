use crate::{ring::ReconcileReport, schema::TableId, token::TokenRange};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A write or key bound did not match the declared table schema.
    ///
    /// A correct mutation path never produces this, so it aborts the single
    /// write instead of being retried.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Stored bytes failed to decode. Fails the read that observed them.
    #[error("corrupt fragment: {0}")]
    CorruptFragment(String),
    /// The engine backing one table could not be opened.
    #[error("failed to open engine for table {table}: {source}")]
    EngineOpenFailure {
        /// `keyspace.table` of the table that failed.
        table: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    /// The node has not joined the ring yet; retry once it has.
    #[error("node has not joined the ring")]
    NotReady,
    /// A transferred file was missing, truncated or failed verification.
    #[error("incomplete transfer of {file}: {reason}")]
    IncompleteTransfer {
        /// File name as listed in the transfer manifest.
        file: String,
        /// What failed.
        reason: String,
    },
    /// The schema service does not know the table.
    #[error("unknown table {0}")]
    UnknownTable(TableId),
    /// Reconciliation stopped at `range`; `report` counts the ranges handled
    /// before it.
    #[error("reconcile failed at range {range} after {} deleted ranges: {source}", .report.ranges_deleted)]
    RangeFailed {
        range: TokenRange,
        report: ReconcileReport,
        #[source]
        source: Box<Error>,
    },
    /// The operation observed its cancellation token between two units of work.
    #[error("operation cancelled")]
    Cancelled,
    /// Engine error outside of open.
    #[error("engine error: {0}")]
    Engine(#[from] rocksdb::Error),
    /// Local filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Transfer manifest (de)serialization failed.
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn schema_mismatch(msg: impl Into<String>) -> Self {
        Error::SchemaMismatch(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptFragment(msg.into())
    }

    /// Whether the caller may schedule a retry of the same operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NotReady | Error::IncompleteTransfer { .. } => true,
            Error::RangeFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
