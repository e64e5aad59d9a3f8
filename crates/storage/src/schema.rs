//! Schema definitions and provisioning for the metadata tables and the
//! per-chain vote partitions.
//!
//! Provisioning is an operator concern: the vote indexer operations assume
//! these tables exist and never create them on their own.

use std::time::Duration;

use primitives::PartitionName;
use tracing::info;

use crate::{
    db::SqliteDb,
    error::{VoteIndexerError, VoteIndexerResult},
};

/// Time budget for DDL statements.
const DDL_BUDGET: Duration = Duration::from_secs(30);

/// Table schema definition
#[derive(Debug)]
pub struct TableSchema {
    /// Table name
    pub name: &'static str,
    /// Column and constraint definitions
    pub columns: &'static str,
}

/// Schema definitions for the metadata tables
pub const META_TABLE_SCHEMAS: &[TableSchema] = &[
    TableSchema {
        name: "chain_info",
        columns: "id INTEGER PRIMARY KEY AUTOINCREMENT,
                 chain_name TEXT NOT NULL,
                 mainnet INTEGER NOT NULL,
                 chain_id TEXT NOT NULL UNIQUE",
    },
    TableSchema {
        name: "index_pointer",
        columns: "id INTEGER PRIMARY KEY AUTOINCREMENT,
                 chain_info_id INTEGER NOT NULL REFERENCES chain_info(id),
                 index_name TEXT NOT NULL,
                 pointer INTEGER NOT NULL DEFAULT 0,
                 UNIQUE (chain_info_id, index_name)",
    },
    TableSchema {
        name: "validator_info",
        columns: "id INTEGER PRIMARY KEY AUTOINCREMENT,
                 chain_info_id INTEGER NOT NULL REFERENCES chain_info(id),
                 hex_address TEXT NOT NULL,
                 operator_address TEXT NOT NULL,
                 moniker TEXT NOT NULL,
                 UNIQUE (chain_info_id, hex_address)",
    },
];

/// Columns of a vote partition. Timestamps are UTC nanoseconds.
pub const VOTE_PARTITION_COLUMNS: &str = "id INTEGER PRIMARY KEY AUTOINCREMENT,
                 chain_info_id INTEGER NOT NULL REFERENCES chain_info(id),
                 height INTEGER NOT NULL,
                 validator_hex_address_id INTEGER NOT NULL REFERENCES validator_info(id),
                 status INTEGER NOT NULL CHECK (status IN (1, 2, 3)),
                 timestamp INTEGER NOT NULL";

fn create_table_sql(name: &str, columns: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS \"{name}\" (\n                 {columns}\n             )")
}

impl SqliteDb {
    /// Create the metadata tables if they do not exist yet.
    pub async fn init_meta_schema(&self) -> VoteIndexerResult<()> {
        const OPERATION: &str = "create meta tables";
        self.run(OPERATION, DDL_BUDGET, |conn, _| {
            for schema in META_TABLE_SCHEMAS {
                conn.execute_batch(&create_table_sql(schema.name, schema.columns))
                    .map_err(VoteIndexerError::query(OPERATION))?;
            }
            Ok(())
        })
        .await?;
        info!("Meta schema ready");
        Ok(())
    }

    /// Create the vote partition for one chain, with its height and timestamp
    /// indexes.
    pub async fn create_vote_partition(&self, partition: &PartitionName) -> VoteIndexerResult<()> {
        const OPERATION: &str = "create vote partition";
        let sql = format!(
            "{table};
             CREATE INDEX IF NOT EXISTS \"{partition}_height_idx\" ON \"{partition}\" (height);
             CREATE INDEX IF NOT EXISTS \"{partition}_timestamp_idx\" ON \"{partition}\" (timestamp);",
            table = create_table_sql(partition.as_str(), VOTE_PARTITION_COLUMNS),
        );
        self.run(OPERATION, DDL_BUDGET, move |conn, _| {
            conn.execute_batch(&sql).map_err(VoteIndexerError::query(OPERATION))
        })
        .await?;
        info!(%partition, "Vote partition ready");
        Ok(())
    }
}
