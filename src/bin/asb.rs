use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use btc_xmr_swap::proto::v1::asb_service_server::AsbServiceServer;
use btc_xmr_swap::swap::protocol::PeerResumer;
use btc_xmr_swap::swap::resume::{ResumeManager, RetryPolicy};
use btc_xmr_swap::swap::service::{AsbConfig, AsbServiceImpl};
use btc_xmr_swap::swap::store::SqliteStore;
use clap::Parser as _;
use tonic::transport::Server;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:50051")]
    listen_addr: String,

    #[arg(long)]
    store_path: PathBuf,

    /// Hex-encoded 32-byte identity key of this ASB.
    #[arg(long)]
    peer_id: String,

    /// Spread applied on top of the market rate when quoting, as a
    /// fraction (0.02 = 2%).
    #[arg(long, default_value_t = 0.02)]
    ask_spread: f64,

    #[arg(long, default_value_t = 10)]
    resume_connect_timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    resume_handshake_timeout_secs: u64,

    #[arg(long, default_value_t = 3)]
    resume_attempts: u32,

    #[arg(long, default_value_t = 500)]
    resume_retry_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    btc_xmr_swap::logging::init().ok();

    let args = Args::parse();
    let listen_addr: SocketAddr = args.listen_addr.parse().context("parse listen_addr")?;

    anyhow::ensure!(
        args.ask_spread >= 0.0 && args.ask_spread < 1.0,
        "ask_spread must be in [0, 1), got {}",
        args.ask_spread
    );

    let peer_key = hex::decode(&args.peer_id).context("decode peer_id")?;
    anyhow::ensure!(
        peer_key.len() == 32,
        "peer_id must be 32 bytes, got {}",
        peer_key.len()
    );

    let store = SqliteStore::open(args.store_path).context("open sqlite store")?;
    tracing::info!(store_path = %store.path().display(), "swap store ready");

    let store = Arc::new(Mutex::new(store));
    let resume_report = Arc::new(Mutex::new(None));

    let resumer = PeerResumer::new(
        args.peer_id.clone(),
        Duration::from_secs(args.resume_connect_timeout_secs),
        Duration::from_secs(args.resume_handshake_timeout_secs),
    );
    let retry = RetryPolicy {
        attempts: args.resume_attempts,
        initial_delay: Duration::from_millis(args.resume_retry_delay_ms),
    };

    spawn_resume_pass(store.clone(), resumer, retry, resume_report.clone());

    let cfg = AsbConfig {
        peer_id: args.peer_id,
        ask_spread: args.ask_spread,
    };
    let svc = AsbServiceImpl::new(cfg, store, resume_report);

    tracing::info!(%listen_addr, "starting ASB gRPC server");

    Server::builder()
        .add_service(AsbServiceServer::new(svc))
        .serve(listen_addr)
        .await
        .context("serve gRPC")?;

    Ok(())
}

fn spawn_resume_pass(
    store: Arc<Mutex<SqliteStore>>,
    resumer: PeerResumer,
    retry: RetryPolicy,
    report_slot: Arc<Mutex<Option<btc_xmr_swap::swap::resume::ResumeReport>>>,
) {
    tokio::spawn(async move {
        let manager = ResumeManager::new(store, Arc::new(resumer), retry);
        match manager.run().await {
            Ok(report) => {
                *report_slot.lock().expect("resume report mutex poisoned") = Some(report);
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "startup resume pass failed");
            }
        }
    });
}
