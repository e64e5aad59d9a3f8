use primitives::PartitionName;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::debug;

use crate::{
    INDEX_NAME, VoteIndexerRepository,
    db::ensure_before,
    error::{VoteIndexerError, VoteIndexerResult, WriteStep},
    meta::{ensure_pointer_updated, update_pointer},
    models::ValidatorVote,
};

const OPERATION: &str = "insert validator vote list";

impl VoteIndexerRepository {
    /// Store the votes of one height and advance the index pointer to
    /// `pointer_height`.
    ///
    /// Both effects are applied in one transaction: on any error, including
    /// an elapsed time budget, neither is visible and the call can be retried
    /// as is. Heights without votes only move the pointer. Vote timestamps
    /// that do not fit in i64 nanoseconds are rejected before anything is
    /// written.
    pub async fn insert_validator_vote_list(
        &self,
        chain_info_id: i64,
        pointer_height: i64,
        votes: Vec<ValidatorVote>,
    ) -> VoteIndexerResult<()> {
        let vote_count = votes.len();
        let rows = votes
            .iter()
            .map(|vote| {
                let nanos = vote
                    .timestamp
                    .timestamp_nanos_opt()
                    .ok_or(VoteIndexerError::TimestampOutOfRange(vote.timestamp))?;
                Ok((vote.height, vote.validator_hex_address_id, vote.status, nanos))
            })
            .collect::<VoteIndexerResult<Vec<_>>>()?;

        self.db
            .run(OPERATION, self.sql_timeout, move |conn, deadline| {
                if rows.is_empty() {
                    let updated = update_pointer(conn, chain_info_id, INDEX_NAME, pointer_height)
                        .map_err(VoteIndexerError::transaction(OPERATION, WriteStep::UpdatePointer))?;
                    return ensure_pointer_updated(updated, chain_info_id, INDEX_NAME.to_owned());
                }

                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(VoteIndexerError::transaction(OPERATION, WriteStep::Begin))?;

                let partition = chain_partition(&tx, chain_info_id)?;
                {
                    let mut stmt = tx
                        .prepare(&format!(
                            "INSERT INTO \"{partition}\"
                                 (chain_info_id, height, validator_hex_address_id, status, timestamp)
                             VALUES (?1, ?2, ?3, ?4, ?5)"
                        ))
                        .map_err(VoteIndexerError::transaction(OPERATION, WriteStep::InsertVotes))?;
                    for (height, validator, status, timestamp) in &rows {
                        stmt.execute(params![chain_info_id, height, validator, status, timestamp])
                        .map_err(VoteIndexerError::transaction(OPERATION, WriteStep::InsertVotes))?;
                    }
                }

                let updated = update_pointer(&tx, chain_info_id, INDEX_NAME, pointer_height)
                    .map_err(VoteIndexerError::transaction(OPERATION, WriteStep::UpdatePointer))?;
                ensure_pointer_updated(updated, chain_info_id, INDEX_NAME.to_owned())?;

                ensure_before(deadline, OPERATION)?;
                tx.commit().map_err(VoteIndexerError::transaction(OPERATION, WriteStep::Commit))
            })
            .await?;

        debug!(chain_info_id, pointer_height, votes = vote_count, "Index pointer advanced");
        Ok(())
    }
}

/// Resolve the partition of a registered chain.
fn chain_partition(conn: &Connection, chain_info_id: i64) -> VoteIndexerResult<PartitionName> {
    let chain_id: String = conn
        .query_row("SELECT chain_id FROM chain_info WHERE id = ?1", params![chain_info_id], |row| {
            row.get(0)
        })
        .optional()
        .map_err(VoteIndexerError::transaction(OPERATION, WriteStep::ResolvePartition))?
        .ok_or(VoteIndexerError::ChainNotFound(chain_info_id))?;
    VoteIndexerRepository::partition(&chain_id)
}
