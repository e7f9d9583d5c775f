//! Unirep state indexer.
//!
//! Replays the Unirep contract's events from the deployment block and keeps the
//! protocol state current, optionally persisting it to a JSON snapshot.
//!
//! Run with:
//!   cargo run --bin indexer -- --config config.toml run

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

mod config;

use config::IndexerConfig;
use unirep_state::adapters::ethereum::EthereumEventSource;
use unirep_state::adapters::json_file::{self, PersistError};
use unirep_state::indexer::{Indexer, IndexerError, StateSnapshot};
use unirep_state::ports::events::EventSourceError;
use unirep_state::unirep_state::StateError;

#[derive(Parser)]
#[command(name = "indexer", about = "Unirep event-replay indexer")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Catch up to the chain head, then follow new blocks.
    Run,
    /// Catch up once and print the resulting roots.
    Replay {
        /// Stop after this block instead of the current head.
        #[arg(long)]
        to_block: Option<u64>,
    },
    /// Print the persisted state file as JSON.
    Dump,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("event source error: {0}")]
    Source(#[from] EventSourceError),

    #[error("indexer error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("state file error: {0}")]
    Persist(#[from] PersistError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("indexer.state_file is not configured")]
    NoStateFile,

    #[error("no state file at {0}")]
    MissingStateFile(PathBuf),
}

fn short(value: &alloy::primitives::B256) -> String {
    format!("0x{}...", &hex::encode(value.0)[..16])
}

fn print_roots(snapshot: &StateSnapshot) -> Result<(), CliError> {
    let state = &snapshot.state;
    let epoch = state.current_epoch();

    info!("state as of block {}", snapshot.as_of_block);
    info!("  current epoch:     {epoch}");
    info!("  sign-ups:          {}", state.sign_up_count());
    info!(
        "  GST root (e{epoch}):  {}",
        short(&state.gen_gs_tree(epoch)?.root())
    );
    if epoch > 1 {
        info!(
            "  epoch tree (e{}): {}",
            epoch - 1,
            short(&state.gen_epoch_tree(epoch - 1)?.root())
        );
    }
    info!(
        "  nullifier root:    {} ({} nullifiers)",
        short(&state.gen_nullifier_tree()?.root()),
        state.nullifier_count()
    );
    Ok(())
}

async fn open_indexer(config: &IndexerConfig) -> Result<Indexer<EthereumEventSource>, CliError> {
    let source = EthereumEventSource::new(&config.chain.rpc_url, config.chain.unirep_address)?;
    let indexer = Indexer::resume(
        source,
        config.settings.clone(),
        config.chain.deployment_block,
        config.indexer.options(),
    )?;
    info!(
        "indexing {} from block {}",
        config.chain.unirep_address,
        indexer.last_block().await + 1
    );
    Ok(indexer)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = IndexerConfig::load(&args.config)?;

    match args.command {
        Command::Run => {
            let indexer = open_indexer(&config).await?;
            indexer.catch_up().await?;
            print_roots(&indexer.snapshot().await)?;
            indexer.run().await?;
        }
        Command::Replay { to_block } => {
            let indexer = open_indexer(&config).await?;
            match to_block {
                Some(target) => indexer.catch_up_to(target).await?,
                None => indexer.catch_up().await?,
            };
            print_roots(&indexer.snapshot().await)?;
        }
        Command::Dump => {
            let path = config.indexer.state_file.ok_or(CliError::NoStateFile)?;
            let snapshot: StateSnapshot =
                json_file::load(&path)?.ok_or_else(|| CliError::MissingStateFile(path.clone()))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(())
}
