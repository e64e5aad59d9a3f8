use chrono::{DateTime, Utc};
use primitives::{RetentionParseError, parse_retention_period};
use rusqlite::params;
use tracing::info;

use crate::{
    VoteIndexerRepository,
    error::{VoteIndexerError, VoteIndexerResult},
};

impl VoteIndexerRepository {
    /// Delete the votes of a chain older than `retention_period` (e.g. `"7d"`),
    /// returning the number of deleted rows.
    ///
    /// A malformed period is rejected before storage is touched.
    pub async fn delete_old_validator_vote_list(
        &self,
        chain_id: &str,
        retention_period: &str,
    ) -> VoteIndexerResult<u64> {
        let duration = parse_retention_period(retention_period)?;
        let cutoff = Utc::now()
            .checked_add_signed(duration)
            .ok_or_else(|| RetentionParseError::OutOfRange(retention_period.to_owned()))?;
        self.delete_validator_vote_list_before(chain_id, cutoff).await
    }

    /// Delete the votes of a chain with `timestamp < cutoff`, returning the
    /// number of deleted rows. Votes at exactly `cutoff` are kept.
    pub async fn delete_validator_vote_list_before(
        &self,
        chain_id: &str,
        cutoff: DateTime<Utc>,
    ) -> VoteIndexerResult<u64> {
        const OPERATION: &str = "delete old validator vote list";
        let partition = Self::partition(chain_id)?;
        let query = format!("DELETE FROM \"{partition}\" WHERE timestamp < ?1");
        // cutoffs outside the i64 nanosecond range lie beyond every stored timestamp
        let cutoff_nanos = cutoff.timestamp_nanos_opt().unwrap_or(if cutoff > DateTime::UNIX_EPOCH {
            i64::MAX
        } else {
            i64::MIN
        });

        let deleted = self
            .db
            .run(OPERATION, self.sql_timeout, move |conn, _| {
                conn.execute(&query, params![cutoff_nanos])
                    .map_err(VoteIndexerError::query(OPERATION))
            })
            .await?;

        info!(chain_id, %partition, %cutoff, deleted, "Deleted old validator votes");
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::{
        error::ErrorKind,
        models::{ValidatorVote, VoteStatus},
        test_utils::{CHAIN_ID, count_votes, fixture},
    };

    #[tokio::test]
    async fn prunes_by_retention_period() {
        let f = fixture().await;
        let alice = f.validators[0];
        let now = Utc::now();
        let votes = vec![
            ValidatorVote {
                height: 1,
                validator_hex_address_id: alice,
                status: VoteStatus::Missed,
                timestamp: now - TimeDelta::days(3),
            },
            ValidatorVote {
                height: 2,
                validator_hex_address_id: alice,
                status: VoteStatus::Missed,
                timestamp: now,
            },
        ];
        f.repo.insert_validator_vote_list(f.chain_info_id, 2, votes).await.unwrap();

        assert_eq!(f.repo.delete_old_validator_vote_list(CHAIN_ID, "1d").await.unwrap(), 1);
        assert_eq!(f.repo.delete_old_validator_vote_list(CHAIN_ID, "1d").await.unwrap(), 0);
        assert_eq!(count_votes(&f.repo).await, 1);
    }

    #[tokio::test]
    async fn malformed_period_does_not_touch_storage() {
        let f = fixture().await;
        let vote = ValidatorVote {
            height: 1,
            validator_hex_address_id: f.validators[0],
            status: VoteStatus::Committed,
            timestamp: Utc::now() - TimeDelta::days(30),
        };
        f.repo.insert_validator_vote_list(f.chain_info_id, 1, vec![vote]).await.unwrap();

        for period in ["", "7", "seven days", "0d"] {
            let err = f.repo.delete_old_validator_vote_list(CHAIN_ID, period).await.unwrap_err();
            assert!(matches!(err, VoteIndexerError::InvalidRetentionPeriod(_)), "{period}");
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(count_votes(&f.repo).await, 1);
    }

    #[tokio::test]
    async fn sub_microsecond_cutoff_is_exact() {
        let f = fixture().await;
        let cutoff = Utc.timestamp_opt(1_700_000_000, 500_000_300).unwrap();
        let votes = [(1, -300), (2, 0), (3, 1)]
            .into_iter()
            .map(|(height, offset_nanos)| ValidatorVote {
                height,
                validator_hex_address_id: f.validators[0],
                status: VoteStatus::Missed,
                timestamp: cutoff + TimeDelta::nanoseconds(offset_nanos),
            })
            .collect();
        f.repo.insert_validator_vote_list(f.chain_info_id, 3, votes).await.unwrap();

        assert_eq!(f.repo.delete_validator_vote_list_before(CHAIN_ID, cutoff).await.unwrap(), 1);
        assert_eq!(count_votes(&f.repo).await, 2);
    }

    #[tokio::test]
    async fn far_future_cutoff_deletes_everything() {
        let f = fixture().await;
        let vote = ValidatorVote {
            height: 1,
            validator_hex_address_id: f.validators[0],
            status: VoteStatus::Proposed,
            timestamp: Utc::now(),
        };
        f.repo.insert_validator_vote_list(f.chain_info_id, 1, vec![vote]).await.unwrap();

        let deleted =
            f.repo.delete_validator_vote_list_before(CHAIN_ID, DateTime::<Utc>::MAX_UTC).await.unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn missing_partition_is_a_query_error() {
        let f = fixture().await;
        let err = f.repo.delete_old_validator_vote_list("osmosis-1", "1d").await.unwrap_err();
        assert!(matches!(err, VoteIndexerError::Query { .. }));
    }
}
