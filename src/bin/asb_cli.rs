use anyhow::{Context as _, Result};
use btc_xmr_swap::proto::v1::asb_service_client::AsbServiceClient;
use btc_xmr_swap::proto::v1::{
    GetInfoRequest, GetResumeReportRequest, GetSwapRequest, ListSwapsRequest, ResumeEntry, Swap,
};
use clap::{Parser as _, Subcommand};
use serde_json::json;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    grpc_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Info,
    GetSwap {
        #[arg(long)]
        swap_id: String,
    },
    ListSwaps,
    ResumeReport,
}

#[tokio::main]
async fn main() -> Result<()> {
    btc_xmr_swap::logging::init().ok();
    let args = Args::parse();

    let mut client = AsbServiceClient::connect(args.grpc_url)
        .await
        .context("connect gRPC")?;

    let out = match args.command {
        Command::Info => {
            let info = client
                .get_info(GetInfoRequest {})
                .await
                .context("GetInfo")?
                .into_inner();

            json!({
              "peer_id": info.peer_id,
              "ask_spread": info.ask_spread,
              "swap_count": info.swap_count,
              "unfinished_swap_count": info.unfinished_swap_count,
            })
        }
        Command::GetSwap { swap_id } => {
            let swap = client
                .get_swap(GetSwapRequest { swap_id })
                .await
                .context("GetSwap")?
                .into_inner();

            swap_json(swap)
        }
        Command::ListSwaps => {
            let resp = client
                .list_swaps(ListSwapsRequest {})
                .await
                .context("ListSwaps")?
                .into_inner();

            json!(resp.swaps.into_iter().map(swap_json).collect::<Vec<_>>())
        }
        Command::ResumeReport => {
            let report = client
                .get_resume_report(GetResumeReportRequest {})
                .await
                .context("GetResumeReport")?
                .into_inner();

            json!({
              "scanned": report.scanned,
              "resumed": entries_json(report.resumed),
              "failed": entries_json(report.failed),
              "skipped": entries_json(report.skipped),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn swap_json(swap: Swap) -> serde_json::Value {
    json!({
      "swap_id": swap.swap_id,
      "schema_version": swap.schema_version,
      "state": swap.state,
      "peer_id": swap.peer_id,
      "peer_addr": swap.peer_addr,
      "btc_amount_sats": swap.btc_amount_sats,
      "xmr_amount_piconero": swap.xmr_amount_piconero,
      "btc_lock_txid": hex::encode(swap.btc_lock_txid),
      "xmr_lock_tx_hash": swap.xmr_lock_tx_hash,
      "created_at": swap.created_at,
    })
}

fn entries_json(entries: Vec<ResumeEntry>) -> Vec<serde_json::Value> {
    entries
        .into_iter()
        .map(|e| {
            json!({
              "swap_id": e.swap_id,
              "detail": e.detail,
            })
        })
        .collect()
}
