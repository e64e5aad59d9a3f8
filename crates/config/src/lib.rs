//! Vote indexer configuration
use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};

/// SQLite database configuration options
#[derive(Debug, Clone, Parser)]
pub struct DatabaseOpts {
    /// Path to the SQLite database file
    #[clap(long = "db-path", env = "VOTEINDEXER_DB_PATH")]
    pub path: PathBuf,
    /// Maximum number of pooled connections
    #[clap(long = "db-pool-size", env = "VOTEINDEXER_DB_POOL_SIZE", default_value = "4")]
    pub pool_size: u32,
}

/// Vote index behaviour options
#[derive(Debug, Clone, Parser)]
pub struct IndexerOpts {
    /// Time budget for each storage operation, in seconds
    #[clap(long, env = "VOTEINDEXER_SQL_TIMEOUT_SECS", default_value = "10")]
    pub sql_timeout_secs: u64,
    /// Number of trailing blocks covered by the recent vote summary
    #[clap(
        long,
        env = "VOTEINDEXER_WINDOW_SIZE",
        default_value = "100",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub window_size: u64,
    /// Default retention period for pruning (e.g. `7d`, `2w`, `1mo`)
    #[clap(long, env = "VOTEINDEXER_RETENTION_PERIOD", default_value = "7d")]
    pub retention_period: String,
}

impl IndexerOpts {
    /// Returns the per-operation time budget.
    pub const fn sql_timeout(&self) -> Duration {
        Duration::from_secs(self.sql_timeout_secs)
    }
}

/// Operator commands
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create the metadata tables, register a chain and provision its partition
    Init {
        /// Chain identifier (e.g. `cosmoshub-4`)
        #[clap(long)]
        chain_id: String,
        /// Human readable chain name
        #[clap(long)]
        chain_name: String,
        /// Whether the chain is a mainnet
        #[clap(long)]
        mainnet: bool,
    },
    /// Print the index pointer of a chain
    Pointer {
        /// Chain identifier
        #[clap(long)]
        chain_id: String,
    },
    /// Print the recent per-validator vote summary of a chain as JSON
    Summary {
        /// Chain identifier
        #[clap(long)]
        chain_id: String,
    },
    /// Delete votes older than the retention period
    Prune {
        /// Chain identifier
        #[clap(long)]
        chain_id: String,
        /// Overrides the configured retention period
        #[clap(long)]
        retention_period: Option<String>,
    },
}

/// CLI options for the vote indexer
#[derive(Debug, Clone, Parser)]
pub struct Opts {
    /// Database configuration
    #[clap(flatten)]
    pub database: DatabaseOpts,

    /// Vote index configuration
    #[clap(flatten)]
    pub indexer: IndexerOpts,

    /// Command to run
    #[clap(subcommand)]
    pub command: Command,
}
