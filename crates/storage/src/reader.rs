use rusqlite::params;
use tracing::debug;

use crate::{
    VoteIndexerRepository,
    error::{VoteIndexerError, VoteIndexerResult},
    models::{RecentValidatorVote, VoteStatus},
};

impl VoteIndexerRepository {
    /// Per-validator vote counts over the most recent blocks of a chain.
    ///
    /// Only rows with `height > max_height - window_size` are considered,
    /// where `max_height` is the highest height stored for the chain. Rows are
    /// grouped by validator moniker. An empty partition yields no rows.
    pub async fn select_recent_miss_validator_vote_list(
        &self,
        chain_id: &str,
    ) -> VoteIndexerResult<Vec<RecentValidatorVote>> {
        const OPERATION: &str = "select recent validator vote list";
        let partition = Self::partition(chain_id)?;
        let window = i64::try_from(self.window_size).unwrap_or(i64::MAX);

        let query = format!(
            "SELECT vi.moniker,
                    MAX(vidx.height) AS max_height,
                    MIN(vidx.height) AS min_height,
                    COUNT(CASE WHEN vidx.status = {missed} THEN 1 END) AS missed,
                    COUNT(CASE WHEN vidx.status = {committed} THEN 1 END) AS committed,
                    COUNT(CASE WHEN vidx.status = {proposed} THEN 1 END) AS proposed
             FROM \"{partition}\" vidx
             JOIN validator_info vi ON vidx.validator_hex_address_id = vi.id
             WHERE vidx.height > ((SELECT MAX(height) FROM \"{partition}\") - ?1)
             GROUP BY vi.moniker
             ORDER BY vi.moniker",
            missed = VoteStatus::Missed.code(),
            committed = VoteStatus::Committed.code(),
            proposed = VoteStatus::Proposed.code(),
        );

        let rows = self
            .db
            .run(OPERATION, self.sql_timeout, move |conn, _| {
                let mut stmt = conn.prepare(&query).map_err(VoteIndexerError::query(OPERATION))?;
                stmt.query_map(params![window], RecentValidatorVote::from_row)
                    .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                    .map_err(VoteIndexerError::query(OPERATION))
            })
            .await?;

        debug!(chain_id, %partition, rows = rows.len(), "Recent validator votes selected");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        models::ValidatorVote,
        test_utils::{CHAIN_ID, fixture},
    };

    fn vote(height: i64, validator: i64, status: VoteStatus) -> ValidatorVote {
        ValidatorVote { height, validator_hex_address_id: validator, status, timestamp: Utc::now() }
    }

    #[tokio::test]
    async fn empty_partition_yields_no_rows() {
        let f = fixture().await;
        assert!(f.repo.select_recent_miss_validator_vote_list(CHAIN_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn counts_statuses_per_validator() {
        let f = fixture().await;
        let (alice, bob) = (f.validators[0], f.validators[1]);
        f.repo
            .insert_validator_vote_list(
                f.chain_info_id,
                20,
                vec![
                    vote(20, alice, VoteStatus::Proposed),
                    vote(20, bob, VoteStatus::Missed),
                    vote(21, alice, VoteStatus::Committed),
                    vote(21, bob, VoteStatus::Missed),
                ],
            )
            .await
            .unwrap();

        let rows = f.repo.select_recent_miss_validator_vote_list(CHAIN_ID).await.unwrap();
        assert_eq!(
            rows,
            vec![
                RecentValidatorVote {
                    moniker: "alice".to_owned(),
                    max_height: 21,
                    min_height: 20,
                    missed_count: 0,
                    committed_count: 1,
                    proposed_count: 1,
                },
                RecentValidatorVote {
                    moniker: "bob".to_owned(),
                    max_height: 21,
                    min_height: 20,
                    missed_count: 2,
                    committed_count: 0,
                    proposed_count: 0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn window_size_is_configurable() {
        let f = fixture().await;
        let alice = f.validators[0];
        let votes = (1..=10).map(|h| vote(h, alice, VoteStatus::Missed)).collect();
        f.repo.insert_validator_vote_list(f.chain_info_id, 10, votes).await.unwrap();

        let repo = f.repo.clone().with_window_size(3);
        let rows = repo.select_recent_miss_validator_vote_list(CHAIN_ID).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].min_height, rows[0].max_height, rows[0].missed_count), (8, 10, 3));

        // zero is clamped to a single block
        let repo = f.repo.clone().with_window_size(0);
        let rows = repo.select_recent_miss_validator_vote_list(CHAIN_ID).await.unwrap();
        assert_eq!((rows[0].min_height, rows[0].missed_count), (10, 1));
    }

    #[tokio::test]
    async fn invalid_chain_id_is_rejected() {
        let f = fixture().await;
        let err = f.repo.select_recent_miss_validator_vote_list("no such chain").await.unwrap_err();
        assert!(matches!(err, VoteIndexerError::InvalidPartition(_)));
    }
}
