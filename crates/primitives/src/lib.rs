//! Core primitives for the vote indexer.
/// Chain partition naming
pub mod partition;
/// Retention period parsing
pub mod retention;

pub use partition::{PartitionError, PartitionName};
pub use retention::{RetentionParseError, parse_retention_period};
