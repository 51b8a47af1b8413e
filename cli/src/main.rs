//! spaces-indexer CLI: run sync passes and inspect indexed state.
//!
//! Usage:
//! ```bash
//! # One sync pass from the last checkpoint to the chain tip
//! DATABASE_URL=sqlite:./spaces.db spaces-indexer sync \
//!     --bitcoin-rpc http://127.0.0.1:8332 --spaces-rpc http://127.0.0.1:7225
//!
//! # Checkpoints and row counts
//! spaces-indexer status --database-url postgresql://localhost/spaces
//!
//! # Current status and history of one space
//! spaces-indexer space @bitcoin
//! ```

mod logging;

use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use spaces_core::checkpoint::CheckpointStore;
use spaces_core::config::{
    SyncConfig, SyncConfigBuilder, DEFAULT_LOCK_NAME, MAINNET_ACTIVATION_HEIGHT,
};
use spaces_core::store::SpaceReader;
use spaces_core::sync::{SyncDriver, SyncOutcome};
use spaces_rpc::{RpcBlockSource, RpcSourceConfig};
use spaces_storage::postgres::PostgresStorage;
use spaces_storage::sqlite::SqliteStorage;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "spaces-indexer",
    about = "Index the spaces name/auction protocol into SQLite or PostgreSQL",
    version
)]
struct Cli {
    /// Emit JSON log lines (RUST_LOG sets the filter)
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass from the last checkpoint to the chain tip
    Sync(SyncArgs),

    /// Show checkpoints and stored row counts
    Status(StoreArgs),

    /// Show a space's status and history
    Space {
        /// Space name, e.g. @bitcoin
        name: String,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show defaults and supported backends
    Info,

    /// Print version
    Version,
}

#[derive(Args)]
struct StoreArgs {
    /// sqlite:<path> or postgres(ql)://...
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[derive(Args)]
struct SyncArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Bitcoin node RPC endpoint
    #[arg(long, env = "BITCOIN_RPC_URL")]
    bitcoin_rpc: String,

    /// Spaces protocol RPC endpoint
    #[arg(long, env = "SPACES_RPC_URL")]
    spaces_rpc: String,

    /// Bitcoin node RPC user
    #[arg(long, env = "RPC_USER", requires = "rpc_password")]
    rpc_user: Option<String>,

    /// Bitcoin node RPC password
    #[arg(long, env = "RPC_PASSWORD", requires = "rpc_user", hide_env_values = true)]
    rpc_password: Option<String>,

    /// First height on a fresh store
    #[arg(long, env = "ACTIVATION_HEIGHT", default_value_t = MAINNET_ACTIVATION_HEIGHT)]
    activation_height: u64,

    /// Cap heights processed per sync pass
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_blocks: Option<u64>,

    /// Advisory lock name
    #[arg(long, default_value = DEFAULT_LOCK_NAME)]
    lock_name: String,
}

impl SyncArgs {
    fn sync_config(&self) -> SyncConfig {
        let mut builder = SyncConfigBuilder::new()
            .lock_name(self.lock_name.clone())
            .activation_height(self.activation_height);
        if let Some(n) = self.max_blocks {
            builder = builder.max_blocks_per_run(n);
        }
        builder.build()
    }

    fn source_config(&self) -> RpcSourceConfig {
        let config = RpcSourceConfig::new(self.bitcoin_rpc.clone(), self.spaces_rpc.clone());
        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(password)) => config.with_bitcoin_auth(user, password),
            _ => config,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        json: cli.json_logs,
        ..Default::default()
    });

    let result = match cli.command {
        Commands::Sync(args) => cmd_sync(args).await,
        Commands::Status(store) => cmd_status(store).await,
        Commands::Space { name, store } => cmd_space(store, &name).await,
        Commands::Info => {
            cmd_info();
            Ok(())
        }
        Commands::Version => {
            println!("spaces-indexer {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn cmd_info() {
    let defaults = SyncConfig::default();
    println!("spaces-indexer v{}", env!("CARGO_PKG_VERSION"));
    println!("  Activation height: {MAINNET_ACTIVATION_HEIGHT} (mainnet)");
    println!("  Lock name:         {}", defaults.lock_name);
    println!("  Blocks per run:    unlimited (set --max-blocks to cap)");
    println!("  Storage backends:  SQLite (sqlite:<path>), PostgreSQL (postgres://...)");
    println!("  Node RPC:          getblockcount, getblockhash, getblock");
    println!("  Protocol RPC:      getblockmeta");
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn cmd_sync(args: SyncArgs) -> anyhow::Result<()> {
    let config = args.sync_config();
    let source = RpcBlockSource::new(args.source_config())?;

    let outcome = match open_store(&args.store).await? {
        Store::Sqlite(store) => SyncDriver::new(config, source, store).run().await?,
        Store::Postgres(store) => SyncDriver::new(config, source, store).run().await?,
    };

    match outcome {
        SyncOutcome::Locked => println!("Another sync run holds the lock; nothing to do."),
        SyncOutcome::UpToDate { start, tip } => {
            println!("Up to date (next height {start}, tip {tip}).")
        }
        SyncOutcome::Synced(summary) => {
            println!(
                "Synced heights {}..={} in {:.1}s: {} blocks stored, {} history rows.",
                summary.start_height,
                summary.end_height,
                summary.duration.as_secs_f64(),
                summary.blocks_stored,
                summary.history_rows
            );
        }
    }
    Ok(())
}

async fn cmd_status(args: StoreArgs) -> anyhow::Result<()> {
    match open_store(&args).await? {
        Store::Sqlite(store) => print_status(store.as_ref()).await,
        Store::Postgres(store) => print_status(store.as_ref()).await,
    }
}

async fn cmd_space(args: StoreArgs, name: &str) -> anyhow::Result<()> {
    match open_store(&args).await? {
        Store::Sqlite(store) => print_space(store.as_ref(), name).await,
        Store::Postgres(store) => print_space(store.as_ref(), name).await,
    }
}

async fn print_status<S>(store: &S) -> anyhow::Result<()>
where
    S: SpaceReader + CheckpointStore,
{
    let checkpoints = store.list().await?;
    println!("Blocks stored:       {}", store.block_count().await?);
    println!("Transactions stored: {}", store.transaction_count().await?);

    match store.last_end_height().await? {
        Some(h) => println!("Last synced height:  {h}"),
        None => println!("Last synced height:  none (fresh store)"),
    }

    if checkpoints.is_empty() {
        return Ok(());
    }
    println!("\nRecent runs:");
    for cp in checkpoints.iter().rev().take(10) {
        let when = chrono::DateTime::from_timestamp(cp.recorded_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| cp.recorded_at.to_string());
        println!(
            "  {when}  {:>8}..={:<8}  {:.1}s",
            cp.start_height, cp.end_height, cp.duration_secs
        );
    }
    Ok(())
}

async fn print_space<S: SpaceReader>(store: &S, name: &str) -> anyhow::Result<()> {
    let Some(space) = store.space(name).await? else {
        bail!("space {name} is not indexed");
    };

    println!("{}  status={}", space.name, space.status);
    for h in store.history_for(name).await? {
        let action = h.action.as_ref().map(|a| a.as_str()).unwrap_or("-");
        let bid = h.bid_amount.map(|b| format!(" bid={b}")).unwrap_or_default();
        println!("  #{:<6} {:<10} tx={}{bid}", h.id, action, h.txid);
    }
    Ok(())
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

enum Store {
    Sqlite(Arc<SqliteStorage>),
    Postgres(Arc<PostgresStorage>),
}

async fn open_store(args: &StoreArgs) -> anyhow::Result<Store> {
    let url = args.database_url.as_str();
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let store = PostgresStorage::connect(url)
            .await
            .context("opening PostgreSQL store")?;
        info!("using PostgreSQL store");
        Ok(Store::Postgres(Arc::new(store)))
    } else if let Some(path) = url.strip_prefix("sqlite:") {
        let store = SqliteStorage::open(url)
            .await
            .with_context(|| format!("opening SQLite store at {path}"))?;
        info!(path, "using SQLite store");
        Ok(Store::Sqlite(Arc::new(store)))
    } else {
        bail!("unsupported database URL {url:?}: expected sqlite:<path> or postgres://...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("spaces-indexer").chain(args.iter().copied()))
    }

    fn sync_args<'a>(extra: &[&'a str]) -> Vec<&'a str> {
        let mut args = vec![
            "sync",
            "--database-url",
            "sqlite:./spaces.db",
            "--bitcoin-rpc",
            "http://127.0.0.1:8332",
            "--spaces-rpc",
            "http://127.0.0.1:7225",
        ];
        args.extend_from_slice(extra);
        args
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_config_from_flags() {
        let cli = parse(&sync_args(&[
            "--lock-name",
            "testnet-sync",
            "--activation-height",
            "50000",
            "--max-blocks",
            "10",
        ]))
        .unwrap();
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        let config = args.sync_config();
        assert_eq!(config.lock_name, "testnet-sync");
        assert_eq!(config.activation_height, 50_000);
        assert_eq!(config.max_blocks_per_run, Some(10));
    }

    #[test]
    fn trailing_flag_without_value_is_rejected() {
        assert!(parse(&sync_args(&["--max-blocks"])).is_err());
        assert!(parse(&sync_args(&["--lock-name", "--json-logs"])).is_err());
    }

    #[test]
    fn unknown_flag_and_bad_numbers_are_rejected() {
        assert!(parse(&sync_args(&["--max-block", "10"])).is_err());
        assert!(parse(&sync_args(&["--max-blocks", "many"])).is_err());
        assert!(parse(&sync_args(&["--max-blocks", "0"])).is_err());
    }

    #[test]
    fn rpc_credentials_travel_together() {
        let cli = parse(&sync_args(&["--rpc-user", "alice", "--rpc-password", "secret"])).unwrap();
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        let config = args.source_config();
        assert_eq!(config.bitcoin_auth, Some(("alice".into(), "secret".into())));
        assert_eq!(config.spaces_url, "http://127.0.0.1:7225");

        assert!(parse(&sync_args(&["--rpc-user", "alice"])).is_err());
    }

    #[test]
    fn space_takes_name_and_global_json_flag() {
        let cli = parse(&["space", "@bitcoin", "--database-url", "sqlite:x.db", "--json-logs"])
            .unwrap();
        assert!(cli.json_logs);
        let Commands::Space { name, store } = cli.command else {
            panic!("expected space");
        };
        assert_eq!(name, "@bitcoin");
        assert_eq!(store.database_url, "sqlite:x.db");
    }
}
