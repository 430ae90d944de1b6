use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::io::BufReader;
use tokio::net::TcpListener;

use btc_xmr_swap::net::{self, ResumeRequest, ResumeResponse};
use btc_xmr_swap::swap::protocol::{PeerResumer, SwapResumer};
use btc_xmr_swap::swap::{SwapRecord, SwapState};

/// One-shot counterparty: answers the first resume request and exits.
async fn spawn_peer(accept: bool) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind loopback listener")?;
    let addr = listener.local_addr().context("get listener addr")?;

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            if let Ok(request) = net::recv_line::<_, ResumeRequest>(&mut reader).await {
                let response = ResumeResponse {
                    request_id: request.request_id,
                    accepted: accept,
                    reason: (!accept).then(|| "unknown swap".to_string()),
                };
                let _ = net::send_line(&mut write_half, &response).await;
            }
        }
    });

    Ok(addr)
}

fn record_for(addr: SocketAddr) -> SwapRecord {
    SwapRecord {
        swap_id: "swap-a".to_string(),
        state: SwapState::XmrLocked,
        peer_id: "ee".repeat(32),
        peer_addr: addr.to_string(),
        btc_amount_sats: 100_000,
        xmr_amount_piconero: 700_000_000_000,
        btc_lock_txid: None,
        xmr_lock_tx_hash: None,
    }
}

fn resumer() -> PeerResumer {
    PeerResumer::new(
        "ff".repeat(32),
        Duration::from_secs(2),
        Duration::from_secs(2),
    )
}

#[tokio::test]
async fn handshake_accepted_by_peer() -> Result<()> {
    let addr = spawn_peer(true).await?;
    resumer().resume(record_for(addr)).await?;
    Ok(())
}

#[tokio::test]
async fn handshake_refused_by_peer() -> Result<()> {
    let addr = spawn_peer(false).await?;
    let err = resumer().resume(record_for(addr)).await.unwrap_err();
    assert!(format!("{err:#}").contains("refused"));
    Ok(())
}

#[tokio::test]
async fn peer_unreachable_is_an_error() -> Result<()> {
    // Bind to grab a free port, then close it again.
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind loopback listener")?;
    let addr = listener.local_addr().context("get listener addr")?;
    drop(listener);

    let err = resumer().resume(record_for(addr)).await.unwrap_err();
    assert!(format!("{err:#}").contains("dial peer"));
    Ok(())
}
