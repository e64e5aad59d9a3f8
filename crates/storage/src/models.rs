use chrono::{DateTime, Utc};
use rusqlite::{
    Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};

/// Outcome of a validator for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    /// No signature for the block
    Missed,
    /// Signed the block
    Committed,
    /// Proposed the block
    Proposed,
}

impl VoteStatus {
    /// Stored integer code.
    pub const fn code(self) -> i64 {
        match self {
            Self::Missed => 1,
            Self::Committed => 2,
            Self::Proposed => 3,
        }
    }

    /// Parse a stored integer code.
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Missed),
            2 => Some(Self::Committed),
            3 => Some(Self::Proposed),
            _ => None,
        }
    }
}

impl ToSql for VoteStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for VoteStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        Self::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// One validator vote event, stored in the chain's partition.
///
/// The surrogate id is assigned by storage and never written explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorVote {
    /// Block height
    pub height: i64,
    /// Id of the validator in `validator_info`
    pub validator_hex_address_id: i64,
    /// Vote outcome
    pub status: VoteStatus,
    /// Block time
    pub timestamp: DateTime<Utc>,
}

/// Last height fully processed by an index for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPointer {
    /// Chain info id
    pub chain_info_id: i64,
    /// Logical index name
    pub index_name: String,
    /// Last indexed height
    pub pointer: i64,
}

/// Monitored chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Storage id
    pub id: i64,
    /// Display name
    pub chain_name: String,
    /// Whether the chain is a mainnet
    pub mainnet: bool,
    /// Chain identifier (e.g. `cosmoshub-4`)
    pub chain_id: String,
}

/// Validator metadata joined by the recent vote summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    /// Storage id, referenced by [`ValidatorVote::validator_hex_address_id`]
    pub id: i64,
    /// Chain info id
    pub chain_info_id: i64,
    /// Consensus address (hex)
    pub hex_address: String,
    /// Operator address
    pub operator_address: String,
    /// Display name
    pub moniker: String,
}

/// Validator metadata to insert or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewValidatorInfo {
    /// Consensus address (hex)
    pub hex_address: String,
    /// Operator address
    pub operator_address: String,
    /// Display name
    pub moniker: String,
}

/// Per-validator vote statistics over the recent window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentValidatorVote {
    /// Validator display name
    pub moniker: String,
    /// Highest height in the window
    pub max_height: i64,
    /// Lowest height in the window
    pub min_height: i64,
    /// Missed blocks
    pub missed_count: i64,
    /// Committed blocks
    pub committed_count: i64,
    /// Proposed blocks
    pub proposed_count: i64,
}

impl RecentValidatorVote {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            moniker: row.get(0)?,
            max_height: row.get(1)?,
            min_height: row.get(2)?,
            missed_count: row.get(3)?,
            committed_count: row.get(4)?,
            proposed_count: row.get(5)?,
        })
    }
}

impl ChainInfo {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_name: row.get(1)?,
            mainnet: row.get(2)?,
            chain_id: row.get(3)?,
        })
    }
}

impl ValidatorInfo {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_info_id: row.get(1)?,
            hex_address: row.get(2)?,
            operator_address: row.get(3)?,
            moniker: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_storage_layout() {
        assert_eq!(VoteStatus::Missed.code(), 1);
        assert_eq!(VoteStatus::Committed.code(), 2);
        assert_eq!(VoteStatus::Proposed.code(), 3);
        assert_eq!(VoteStatus::from_code(0), None);
        assert_eq!(VoteStatus::from_code(4), None);
    }

    #[test]
    fn status_column_rejects_unknown_codes() {
        assert!(matches!(
            VoteStatus::column_result(ValueRef::Integer(2)),
            Ok(VoteStatus::Committed)
        ));
        assert!(matches!(
            VoteStatus::column_result(ValueRef::Integer(9)),
            Err(FromSqlError::OutOfRange(9))
        ));
    }
}
