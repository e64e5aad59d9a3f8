//! Generic index metadata: chains, validators and index pointers.

use std::time::Duration;

use async_trait::async_trait;
use primitives::PartitionName;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::debug;

use crate::{
    INDEX_NAME,
    db::SqliteDb,
    error::{VoteIndexerError, VoteIndexerResult},
    models::{ChainInfo, IndexPointer, NewValidatorInfo, ValidatorInfo},
};

/// Read and advance index pointers.
///
/// This is the capability every index shares; index specific repositories
/// hold a [`MetaRepository`] and expose it through this trait.
#[async_trait]
pub trait IndexMetadata: Send + Sync {
    /// Return the pointer of `index_name` for a chain.
    async fn select_index_pointer(
        &self,
        chain_info_id: i64,
        index_name: &str,
    ) -> VoteIndexerResult<IndexPointer>;

    /// Set the pointer of `index_name` for a chain.
    ///
    /// Fails with [`VoteIndexerError::PointerNotFound`] when the pointer row
    /// has not been provisioned.
    async fn update_index_pointer(
        &self,
        chain_info_id: i64,
        index_name: &str,
        pointer: i64,
    ) -> VoteIndexerResult<()>;
}

/// Metadata repository backed by the meta tables.
#[derive(Clone, Debug)]
pub struct MetaRepository {
    db: SqliteDb,
    sql_timeout: Duration,
}

impl MetaRepository {
    /// Create a new metadata repository
    pub const fn new(db: SqliteDb, sql_timeout: Duration) -> Self {
        Self { db, sql_timeout }
    }

    pub(crate) fn with_sql_timeout(mut self, sql_timeout: Duration) -> Self {
        self.sql_timeout = sql_timeout;
        self
    }

    /// Register a chain, or refresh its name and network type, and return its id.
    ///
    /// The chain id must map to a valid vote partition.
    pub async fn insert_chain_info(
        &self,
        chain_name: &str,
        mainnet: bool,
        chain_id: &str,
    ) -> VoteIndexerResult<i64> {
        const OPERATION: &str = "insert chain info";
        PartitionName::resolve(INDEX_NAME, chain_id)?;
        let (chain_name, chain_id) = (chain_name.to_owned(), chain_id.to_owned());
        self.db
            .run(OPERATION, self.sql_timeout, move |conn, _| {
                conn.query_row(
                    "INSERT INTO chain_info (chain_name, mainnet, chain_id) VALUES (?1, ?2, ?3)
                     ON CONFLICT (chain_id) DO UPDATE
                     SET chain_name = excluded.chain_name, mainnet = excluded.mainnet
                     RETURNING id",
                    params![chain_name, mainnet, chain_id],
                    |row| row.get(0),
                )
                .map_err(VoteIndexerError::query(OPERATION))
            })
            .await
    }

    /// Look up a chain by its chain id.
    pub async fn select_chain_info(&self, chain_id: &str) -> VoteIndexerResult<Option<ChainInfo>> {
        const OPERATION: &str = "select chain info";
        let chain_id = chain_id.to_owned();
        self.db
            .run(OPERATION, self.sql_timeout, move |conn, _| {
                conn.query_row(
                    "SELECT id, chain_name, mainnet, chain_id FROM chain_info WHERE chain_id = ?1",
                    params![chain_id],
                    ChainInfo::from_row,
                )
                .optional()
                .map_err(VoteIndexerError::query(OPERATION))
            })
            .await
    }

    /// Provision the pointer row of `index_name` for a chain, starting at 0.
    ///
    /// Existing pointers are left untouched.
    pub async fn insert_initial_index_pointer(
        &self,
        chain_info_id: i64,
        index_name: &str,
    ) -> VoteIndexerResult<()> {
        const OPERATION: &str = "insert initial index pointer";
        let index_name = index_name.to_owned();
        self.db
            .run(OPERATION, self.sql_timeout, move |conn, _| {
                conn.execute(
                    "INSERT INTO index_pointer (chain_info_id, index_name, pointer)
                     VALUES (?1, ?2, 0)
                     ON CONFLICT (chain_info_id, index_name) DO NOTHING",
                    params![chain_info_id, index_name],
                )
                .map_err(VoteIndexerError::query(OPERATION))
            })
            .await?;
        Ok(())
    }

    /// Insert or refresh validators of a chain, returning their ids in input order.
    pub async fn insert_validator_info_list(
        &self,
        chain_info_id: i64,
        validators: Vec<NewValidatorInfo>,
    ) -> VoteIndexerResult<Vec<i64>> {
        const OPERATION: &str = "insert validator info list";
        self.db
            .run(OPERATION, self.sql_timeout, move |conn, _| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(VoteIndexerError::query(OPERATION))?;
                let mut ids = Vec::with_capacity(validators.len());
                {
                    let mut stmt = tx
                        .prepare(
                            "INSERT INTO validator_info
                                 (chain_info_id, hex_address, operator_address, moniker)
                             VALUES (?1, ?2, ?3, ?4)
                             ON CONFLICT (chain_info_id, hex_address) DO UPDATE
                             SET operator_address = excluded.operator_address,
                                 moniker = excluded.moniker
                             RETURNING id",
                        )
                        .map_err(VoteIndexerError::query(OPERATION))?;
                    for validator in &validators {
                        let id = stmt
                            .query_row(
                                params![
                                    chain_info_id,
                                    validator.hex_address,
                                    validator.operator_address,
                                    validator.moniker
                                ],
                                |row| row.get(0),
                            )
                            .map_err(VoteIndexerError::query(OPERATION))?;
                        ids.push(id);
                    }
                }
                tx.commit().map_err(VoteIndexerError::query(OPERATION))?;
                Ok(ids)
            })
            .await
    }

    /// List the validators of a chain.
    pub async fn select_validator_info_list(
        &self,
        chain_info_id: i64,
    ) -> VoteIndexerResult<Vec<ValidatorInfo>> {
        const OPERATION: &str = "select validator info list";
        self.db
            .run(OPERATION, self.sql_timeout, move |conn, _| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, chain_info_id, hex_address, operator_address, moniker
                         FROM validator_info
                         WHERE chain_info_id = ?1
                         ORDER BY id",
                    )
                    .map_err(VoteIndexerError::query(OPERATION))?;
                stmt.query_map(params![chain_info_id], ValidatorInfo::from_row)
                    .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                    .map_err(VoteIndexerError::query(OPERATION))
            })
            .await
    }
}

#[async_trait]
impl IndexMetadata for MetaRepository {
    async fn select_index_pointer(
        &self,
        chain_info_id: i64,
        index_name: &str,
    ) -> VoteIndexerResult<IndexPointer> {
        const OPERATION: &str = "select index pointer";
        let index_name = index_name.to_owned();
        self.db
            .run(OPERATION, self.sql_timeout, move |conn, _| {
                let pointer = conn
                    .query_row(
                        "SELECT pointer FROM index_pointer
                         WHERE chain_info_id = ?1 AND index_name = ?2",
                        params![chain_info_id, index_name],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(VoteIndexerError::query(OPERATION))?;
                match pointer {
                    Some(pointer) => Ok(IndexPointer { chain_info_id, index_name, pointer }),
                    None => Err(VoteIndexerError::PointerNotFound { chain_info_id, index_name }),
                }
            })
            .await
    }

    async fn update_index_pointer(
        &self,
        chain_info_id: i64,
        index_name: &str,
        pointer: i64,
    ) -> VoteIndexerResult<()> {
        const OPERATION: &str = "update index pointer";
        let index_name = index_name.to_owned();
        self.db
            .run(OPERATION, self.sql_timeout, move |conn, _| {
                let updated = update_pointer(conn, chain_info_id, &index_name, pointer)
                    .map_err(VoteIndexerError::query(OPERATION))?;
                ensure_pointer_updated(updated, chain_info_id, index_name)?;
                debug!(chain_info_id, pointer, "Index pointer updated");
                Ok(())
            })
            .await
    }
}

/// Set the pointer row matching `(chain_info_id, index_name)`, returning the
/// number of affected rows.
pub(crate) fn update_pointer(
    conn: &Connection,
    chain_info_id: i64,
    index_name: &str,
    pointer: i64,
) -> rusqlite::Result<usize> {
    conn.prepare_cached(
        "UPDATE index_pointer SET pointer = ?1 WHERE chain_info_id = ?2 AND index_name = ?3",
    )?
    .execute(params![pointer, chain_info_id, index_name])
}

/// A pointer update that matched no row means the pointer was never provisioned.
pub(crate) fn ensure_pointer_updated(
    updated: usize,
    chain_info_id: i64,
    index_name: String,
) -> VoteIndexerResult<()> {
    if updated == 0 {
        return Err(VoteIndexerError::PointerNotFound { chain_info_id, index_name });
    }
    Ok(())
}
