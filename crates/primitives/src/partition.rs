use std::fmt;

use thiserror::Error;

/// Maximum accepted length of a chain identifier, in bytes.
pub const MAX_CHAIN_ID_LEN: usize = 64;

/// Errors raised while resolving a partition name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    /// Index names must be non-empty, start with a lowercase letter and only
    /// contain lowercase letters and digits.
    #[error("invalid index name {0:?}")]
    InvalidIndexName(String),
    /// Chain ids must be 1..=64 bytes of printable, non-whitespace ASCII.
    #[error("invalid chain id {0:?}")]
    InvalidChainId(String),
}

/// Physical partition identifier for one `(index, chain)` pair.
///
/// The only way to obtain one is [`PartitionName::resolve`], so every value is
/// a safe SQL identifier and can be interpolated into statements directly.
///
/// Encoding is `<index>_<chain>` where the chain id keeps lowercase letters and
/// digits and escapes every other byte as `_xx` (lowercase hex). The index name
/// never contains `_` and the escaped chain id never contains a raw `_`, so two
/// distinct inputs can never produce the same name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionName(String);

impl PartitionName {
    /// Map a logical index name and a chain id to the chain's partition.
    pub fn resolve(index_name: &str, chain_id: &str) -> Result<Self, PartitionError> {
        validate_index_name(index_name)?;
        validate_chain_id(chain_id)?;

        let mut name = String::with_capacity(index_name.len() + 1 + chain_id.len() * 3);
        name.push_str(index_name);
        name.push('_');
        for byte in chain_id.bytes() {
            if byte.is_ascii_lowercase() || byte.is_ascii_digit() {
                name.push(byte as char);
            } else {
                name.push_str(&format!("_{byte:02x}"));
            }
        }
        Ok(Self(name))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_index_name(index_name: &str) -> Result<(), PartitionError> {
    let mut bytes = index_name.bytes();
    let valid = bytes.next().is_some_and(|b| b.is_ascii_lowercase())
        && bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if valid { Ok(()) } else { Err(PartitionError::InvalidIndexName(index_name.to_owned())) }
}

fn validate_chain_id(chain_id: &str) -> Result<(), PartitionError> {
    let valid = !chain_id.is_empty()
        && chain_id.len() <= MAX_CHAIN_ID_LEN
        && chain_id.bytes().all(|b| b.is_ascii_graphic());
    if valid { Ok(()) } else { Err(PartitionError::InvalidChainId(chain_id.to_owned())) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_plain_chain_id() {
        let name = PartitionName::resolve("voteindexer", "testchain").unwrap();
        assert_eq!(name.as_str(), "voteindexer_testchain");
    }

    #[test]
    fn escapes_separators_and_uppercase() {
        let name = PartitionName::resolve("voteindexer", "cosmoshub-4").unwrap();
        assert_eq!(name.as_str(), "voteindexer_cosmoshub_2d4");

        let name = PartitionName::resolve("voteindexer", "Oraichain").unwrap();
        assert_eq!(name.as_str(), "voteindexer__4fraichain");
    }

    #[test]
    fn similar_chain_ids_do_not_collide() {
        let ids = ["a-b", "a_b", "a.b", "A-b", "a_2db", "a-2db"];
        let names: std::collections::HashSet<_> = ids
            .iter()
            .map(|id| PartitionName::resolve("voteindexer", id).unwrap())
            .collect();
        assert_eq!(names.len(), ids.len());
    }

    #[test]
    fn resolution_is_deterministic() {
        let a = PartitionName::resolve("voteindexer", "osmosis-1").unwrap();
        let b = PartitionName::resolve("voteindexer", "osmosis-1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_index_names() {
        for index in ["", "1vote", "vote_indexer", "Vote", "vote-indexer"] {
            assert_eq!(
                PartitionName::resolve(index, "testchain"),
                Err(PartitionError::InvalidIndexName(index.to_owned())),
            );
        }
    }

    #[test]
    fn rejects_bad_chain_ids() {
        let too_long = "a".repeat(MAX_CHAIN_ID_LEN + 1);
        for chain in ["", "test chain", "chain\n", too_long.as_str()] {
            assert_eq!(
                PartitionName::resolve("voteindexer", chain),
                Err(PartitionError::InvalidChainId(chain.to_owned())),
            );
        }
    }

    #[test]
    fn escapes_sql_metacharacters() {
        let name = PartitionName::resolve("voteindexer", "x\";--").unwrap();
        assert_eq!(name.as_str(), "voteindexer_x_22_3b_2d_2d");
    }
}
