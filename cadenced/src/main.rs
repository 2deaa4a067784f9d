//! Cadence Daemon (`cadenced`)
//!
//! Headless daemon that runs the data clock consensus engine. Wired to the
//! in-process transport and the mock pairing oracle; a production gossip
//! mesh and curve backend plug in at the `PubSub` and `FrameProver` seams.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cadence_consensus::{DataClockEngine, EngineConfig, SystemClock};
use cadence_crypto::testing::MockProver;
use cadence_model::PeerId;
use cadence_sim::{MemoryNetwork, MemoryPubSub};
use cadence_store::{ClockStore, KeyStore};

#[derive(Parser, Debug)]
#[command(name = "cadenced", version, about = "Cadence Ceremony Clock Daemon")]
struct Args {
    /// Data directory for the clock and key stores
    #[arg(long, default_value = "./cadence-data")]
    data_dir: PathBuf,

    /// Hex-encoded clock filter to follow
    #[arg(long, default_value = "00000000")]
    filter: String,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    tracing::info!("cadenced v{} starting...", env!("CARGO_PKG_VERSION"));

    let filter = hex::decode(&args.filter)?;
    std::fs::create_dir_all(&args.data_dir)?;

    let clock_store = Arc::new(ClockStore::open(args.data_dir.join("clock.redb"))?);
    let key_store = Arc::new(KeyStore::open(args.data_dir.join("keys.redb"))?);

    let network = MemoryNetwork::new();
    let peer_id = PeerId::new(rand_peer_id());
    let pubsub = Arc::new(MemoryPubSub::new(peer_id.clone(), &network));

    let engine = DataClockEngine::new(
        EngineConfig::new(filter),
        pubsub,
        Arc::new(MockProver::default()),
        clock_store,
        key_store,
        Arc::new(SystemClock),
    );

    // Start errors are fatal to the node.
    engine
        .clone()
        .start()
        .await
        .map_err(|_| "engine start task dropped")??;

    tracing::info!(peer = %peer_id.fmt_short(), "Daemon ready. Press Ctrl+C to stop.");

    shutdown_signal().await;
    tracing::info!("Shutdown signal received...");

    engine
        .stop(true)
        .await
        .map_err(|_| "engine stop task dropped")??;

    tracing::info!("Daemon stopped");
    Ok(())
}

fn rand_peer_id() -> Vec<u8> {
    // Process-unique id is enough for the in-process transport.
    let pid = std::process::id().to_be_bytes();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        .to_be_bytes();
    [pid.as_slice(), now.as_slice()].concat()
}

fn init_tracing(verbosity: u8) {
    let mut filter = EnvFilter::from_default_env();

    // Only apply defaults if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        if let Ok(directive) = level.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(%error, "failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
