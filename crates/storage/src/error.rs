use std::fmt;

use chrono::{DateTime, Utc};
use primitives::{PartitionError, RetentionParseError};
use rusqlite::ErrorCode;
use thiserror::Error;

/// Step of the insert-and-advance transaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// Opening the transaction
    Begin,
    /// Looking up the chain the votes belong to
    ResolvePartition,
    /// Bulk inserting the vote rows
    InsertVotes,
    /// Advancing the index pointer
    UpdatePointer,
    /// Committing the transaction
    Commit,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::Begin => "begin transaction",
            Self::ResolvePartition => "resolve chain partition",
            Self::InsertVotes => "insert validator vote list",
            Self::UpdatePointer => "update new index pointer",
            Self::Commit => "commit transaction",
        };
        f.write_str(step)
    }
}

/// Coarse classification of a [`VoteIndexerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before touching storage
    Validation,
    /// The atomic insert-and-advance unit failed and was rolled back
    Transaction,
    /// The per-call time budget elapsed
    Timeout,
    /// A read or delete query failed
    Query,
    /// No index pointer row is provisioned for the target
    MissingPointer,
    /// The chain info id is not registered
    MissingChain,
    /// No database connection could be obtained
    Connection,
    /// The blocking storage task panicked or was cancelled
    Internal,
}

/// Errors returned by the vote indexer storage layer.
#[derive(Debug, Error)]
pub enum VoteIndexerError {
    /// Retention period could not be parsed
    #[error("invalid retention period: {0}")]
    InvalidRetentionPeriod(#[from] RetentionParseError),

    /// Chain id or index name cannot be mapped to a partition
    #[error("invalid partition: {0}")]
    InvalidPartition(#[from] PartitionError),

    /// Vote timestamp cannot be stored with nanosecond precision
    #[error("vote timestamp {0} is out of the storable range")]
    TimestampOutOfRange(DateTime<Utc>),

    /// A statement inside the insert-and-advance transaction failed
    #[error("failed to {step} in a transaction: {source}")]
    Transaction {
        /// Failing step
        step: WriteStep,
        /// Underlying database error
        #[source]
        source: rusqlite::Error,
    },

    /// The operation ran past its deadline
    #[error("{operation} exceeded its time budget")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
    },

    /// A read, delete or metadata query failed
    #[error("failed to {operation}: {source}")]
    Query {
        /// Operation that failed
        operation: &'static str,
        /// Underlying database error
        #[source]
        source: rusqlite::Error,
    },

    /// Pointer update matched no row
    #[error("no index pointer for chain_info_id={chain_info_id} index_name={index_name}")]
    PointerNotFound {
        /// Chain info id used as filter
        chain_info_id: i64,
        /// Index name used as filter
        index_name: String,
    },

    /// Chain info id is not registered
    #[error("no chain info with id {0}")]
    ChainNotFound(i64),

    /// Connection pool error
    #[error("failed to acquire a database connection: {0}")]
    Pool(#[from] r2d2::Error),

    /// Blocking task failure
    #[error("storage task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl VoteIndexerError {
    /// Classify the error so callers can decide between retry and escalation.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRetentionPeriod(_) |
            Self::InvalidPartition(_) |
            Self::TimestampOutOfRange(_) => ErrorKind::Validation,
            Self::Transaction { .. } => ErrorKind::Transaction,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Query { .. } => ErrorKind::Query,
            Self::PointerNotFound { .. } => ErrorKind::MissingPointer,
            Self::ChainNotFound(_) => ErrorKind::MissingChain,
            Self::Pool(_) => ErrorKind::Connection,
            Self::TaskJoin(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-invoking the same call may succeed. Failed writes never leave
    /// partial state behind, so transient failures are always safe to retry.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transaction | ErrorKind::Timeout | ErrorKind::Connection
        )
    }

    /// Map a query failure, reporting interrupted statements as timeouts.
    pub(crate) fn query(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| {
            if is_interrupted(&source) {
                Self::Timeout { operation }
            } else {
                Self::Query { operation, source }
            }
        }
    }

    /// Map a failure inside the write transaction.
    pub(crate) fn transaction(
        operation: &'static str,
        step: WriteStep,
    ) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| {
            if is_interrupted(&source) {
                Self::Timeout { operation }
            } else {
                Self::Transaction { step, source }
            }
        }
    }
}

fn is_interrupted(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted)
}

/// Result type for vote indexer storage operations.
pub type VoteIndexerResult<T> = Result<T, VoteIndexerError>;
