//! Entrypoint.

use clap::Parser;
use config::{Command, Opts};
use dotenvy::dotenv;
use eyre::{OptionExt, WrapErr};
use storage::{INDEX_NAME, IndexMetadata, SqliteDb, VoteIndexerRepository};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        dotenvy::from_filename(custom_env_file)?;
    } else {
        // Try the default .env file, and ignore if it doesn't exist.
        dotenv().ok();
    }

    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let db = SqliteDb::open(&opts.database.path, opts.database.pool_size)
        .wrap_err_with(|| format!("failed to open {}", opts.database.path.display()))?;
    let repo = VoteIndexerRepository::new(db.clone(), opts.indexer.sql_timeout())
        .with_window_size(opts.indexer.window_size);

    match opts.command {
        Command::Init { chain_id, chain_name, mainnet } => {
            db.init_meta_schema().await?;
            let chain_info_id = repo.meta().insert_chain_info(&chain_name, mainnet, &chain_id).await?;
            repo.meta().insert_initial_index_pointer(chain_info_id, INDEX_NAME).await?;
            db.create_vote_partition(&VoteIndexerRepository::partition(&chain_id)?).await?;
            info!(chain_id, chain_info_id, "Chain provisioned");
        }
        Command::Pointer { chain_id } => {
            let chain = repo
                .meta()
                .select_chain_info(&chain_id)
                .await?
                .ok_or_eyre(format!("unknown chain {chain_id}"))?;
            let pointer = repo.select_index_pointer(chain.id, INDEX_NAME).await?;
            println!("{}", serde_json::to_string_pretty(&pointer)?);
        }
        Command::Summary { chain_id } => {
            let summary = repo
                .select_recent_miss_validator_vote_list(&chain_id)
                .await
                .wrap_err_with(|| format!("failed to summarise recent votes of {chain_id}"))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Prune { chain_id, retention_period } => {
            let retention_period = retention_period.unwrap_or(opts.indexer.retention_period);
            let deleted = repo
                .delete_old_validator_vote_list(&chain_id, &retention_period)
                .await
                .wrap_err_with(|| format!("failed to prune votes of {chain_id}"))?;
            info!(chain_id, retention_period, deleted, "Prune complete");
        }
    }

    Ok(())
}
