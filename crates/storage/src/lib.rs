//! Vote indexer storage
//!
//! Durable per-chain validator vote history: atomic vote batch writes that
//! advance the index pointer, a recent-window summary for dashboards, and
//! retention based pruning. Each chain's votes live in their own partition
//! table, named by [`PartitionName`].

use std::time::Duration;

use async_trait::async_trait;
pub use primitives::PartitionName;

/// Connection pool and deadlines
pub mod db;
/// Error types
pub mod error;
/// Index metadata capability
pub mod meta;
/// Row models
pub mod models;
/// Recent window summary
pub mod reader;
/// Retention pruning
pub mod retention;
/// Table definitions and provisioning
pub mod schema;
/// Vote batch writer
pub mod writer;

pub use db::SqliteDb;
pub use error::{ErrorKind, VoteIndexerError, VoteIndexerResult, WriteStep};
pub use meta::{IndexMetadata, MetaRepository};
pub use models::{
    ChainInfo, IndexPointer, NewValidatorInfo, RecentValidatorVote, ValidatorInfo, ValidatorVote,
    VoteStatus,
};

/// Logical name of the vote index.
pub const INDEX_NAME: &str = "voteindexer";

/// Default number of trailing blocks covered by the recent vote summary.
pub const DEFAULT_WINDOW_SIZE: u64 = 100;

/// Validator vote repository.
///
/// Adds the vote specific operations on top of a [`MetaRepository`], and
/// exposes the pointer operations through [`IndexMetadata`].
#[derive(Clone, Debug)]
pub struct VoteIndexerRepository {
    db: SqliteDb,
    meta: MetaRepository,
    sql_timeout: Duration,
    window_size: u64,
}

impl VoteIndexerRepository {
    /// Create a new repository where every operation gets `sql_timeout`.
    pub fn new(db: SqliteDb, sql_timeout: Duration) -> Self {
        let meta = MetaRepository::new(db.clone(), sql_timeout);
        Self { db, meta, sql_timeout, window_size: DEFAULT_WINDOW_SIZE }
    }

    /// Use a different time budget for every operation.
    pub fn with_sql_timeout(mut self, sql_timeout: Duration) -> Self {
        self.meta = self.meta.with_sql_timeout(sql_timeout);
        self.sql_timeout = sql_timeout;
        self
    }

    /// Use a different recent window size, in blocks. Must be at least 1.
    pub fn with_window_size(mut self, window_size: u64) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    /// Metadata repository
    pub const fn meta(&self) -> &MetaRepository {
        &self.meta
    }

    /// Recent window size, in blocks
    pub const fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Partition holding the votes of `chain_id`.
    pub fn partition(chain_id: &str) -> VoteIndexerResult<PartitionName> {
        Ok(PartitionName::resolve(INDEX_NAME, chain_id)?)
    }
}

#[async_trait]
impl IndexMetadata for VoteIndexerRepository {
    async fn select_index_pointer(
        &self,
        chain_info_id: i64,
        index_name: &str,
    ) -> VoteIndexerResult<IndexPointer> {
        self.meta.select_index_pointer(chain_info_id, index_name).await
    }

    async fn update_index_pointer(
        &self,
        chain_info_id: i64,
        index_name: &str,
        pointer: i64,
    ) -> VoteIndexerResult<()> {
        self.meta.update_index_pointer(chain_info_id, index_name, pointer).await
    }
}
