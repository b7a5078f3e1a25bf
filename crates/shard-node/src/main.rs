use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use shard_identity::NodeKeyPair;
use shard_storage::{adapter::fs::FsAdapter, MemoryAdapter, StorageManager};
use shard_transfer::TokenTable;

use shard_node::{build_router, HttpOverlay, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "shard-node")]
#[command(about = "shard lifecycle node: contracts, audits, transfer and overlay RPCs", long_about = None)]
struct Args {
    /// path to a TOML config file; CLI flags below override it
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// address to listen on for overlay RPCs and shard transfer
    #[arg(long)]
    listen: Option<std::net::SocketAddr>,

    /// on-disk storage root; omit to run against an in-memory adapter
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// spawns the cooperative reaper described in [`shard_storage::StorageManager::clean`]:
/// ticks every `interval_ms` and sweeps expired or incomplete items.
fn spawn_storage_reaper<A: shard_storage::StorageAdapter + 'static>(
    manager: Arc<StorageManager<A>>,
    interval_ms: u64,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            tick.tick().await;
            match manager.clean(now_ms()).await {
                Ok(reaped) if reaped > 0 => info!(reaped, "storage reaper swept expired items"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "storage reaper failed"),
            }
        }
    });
}

/// sweeps the token table at `ttl` intervals, per its own reaping rule.
fn spawn_token_reaper(tokens: Arc<TokenTable>, ttl_ms: u64) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(ttl_ms.max(1)));
        loop {
            tick.tick().await;
            let reaped = tokens.reap(now_ms());
            if reaped > 0 {
                info!(reaped, "token reaper swept expired tokens");
            }
        }
    });
}

fn load_or_generate_keypair(path: &std::path::Path) -> Result<NodeKeyPair> {
    if let Ok(hex_seed) = std::fs::read_to_string(path) {
        let bytes: [u8; 32] = hex::decode(hex_seed.trim())
            .context("key file is not valid hex")?
            .try_into()
            .map_err(|_| anyhow::anyhow!("key file must hold a 32-byte seed"))?;
        return Ok(NodeKeyPair::from_bytes(&bytes)?);
    }

    let mut seed = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut seed);
    std::fs::write(path, hex::encode(seed)).context("failed to persist new node key")?;
    Ok(NodeKeyPair::from_bytes(&seed)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shard_node=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(listen) = args.listen {
        cfg.listen = listen;
    }
    if args.data_dir.is_some() {
        cfg.data_dir = args.data_dir.clone();
    }

    info!(listen = %cfg.listen, data_dir = ?cfg.data_dir, "starting shard-node");

    let keypair = load_or_generate_keypair(&cfg.key_path)?;
    info!(fingerprint = hex::encode(keypair.fingerprint()), "node identity ready");

    let tokens = Arc::new(TokenTable::new(cfg.token_ttl_ms));
    spawn_token_reaper(tokens.clone(), cfg.token_ttl_ms);
    let overlay = HttpOverlay::new();

    let router = match cfg.data_dir.clone() {
        Some(dir) => {
            let adapter = FsAdapter::open(dir).await?;
            let manager = Arc::new(StorageManager::new(adapter, cfg.capacity_bytes));
            spawn_storage_reaper(manager.clone(), cfg.clean_interval_ms);
            build_router(manager, tokens, overlay, keypair, cfg.consign_threshold_ms)
        }
        None => {
            let adapter = MemoryAdapter::new();
            let manager = Arc::new(StorageManager::new(adapter, cfg.capacity_bytes));
            spawn_storage_reaper(manager.clone(), cfg.clean_interval_ms);
            build_router(manager, tokens, overlay, keypair, cfg.consign_threshold_ms)
        }
    };

    let listener = tokio::net::TcpListener::bind(cfg.listen).await?;
    info!("listening on {}", cfg.listen);
    axum::serve(listener, router).await?;
    Ok(())
}
