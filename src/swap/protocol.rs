use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::io::BufReader;
use uuid::Uuid;

use crate::net::{self, ResumeRequest, ResumeResponse};

use super::SwapRecord;

/// Seam to the swap protocol state machine. The resume pass hands each
/// eligible record through here; implementations re-enter execution at
/// the record's last persisted state.
#[tonic::async_trait]
pub trait SwapResumer: Send + Sync {
    async fn resume(&self, record: SwapRecord) -> Result<()>;
}

/// Production resumer: reconnects to the counterparty recorded in the
/// swap and performs the resume handshake. Progressing the swap beyond
/// the handshake is the peer session's job, not ours.
#[derive(Debug, Clone)]
pub struct PeerResumer {
    local_peer_id: String,
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl PeerResumer {
    pub fn new(
        local_peer_id: String,
        connect_timeout: Duration,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            local_peer_id,
            connect_timeout,
            handshake_timeout,
        }
    }
}

#[tonic::async_trait]
impl SwapResumer for PeerResumer {
    async fn resume(&self, record: SwapRecord) -> Result<()> {
        let stream = net::connect(&record.peer_addr, self.connect_timeout)
            .await
            .with_context(|| format!("dial peer of swap {}", record.swap_id))?;
        let (read_half, mut write_half) = stream.into_split();

        let request = ResumeRequest {
            request_id: Uuid::new_v4(),
            swap_id: record.swap_id.clone(),
            peer_id: self.local_peer_id.clone(),
            state: record.state,
        };
        net::send_line(&mut write_half, &request)
            .await
            .context("send resume request")?;

        let mut reader = BufReader::new(read_half);
        let response: ResumeResponse =
            tokio::time::timeout(self.handshake_timeout, net::recv_line(&mut reader))
                .await
                .context("resume handshake timed out")?
                .context("receive resume response")?;

        anyhow::ensure!(
            response.request_id == request.request_id,
            "peer answered request {} instead of {}",
            response.request_id,
            request.request_id
        );

        if !response.accepted {
            anyhow::bail!(
                "peer refused resume of swap {}: {}",
                record.swap_id,
                response.reason.unwrap_or_else(|| "no reason given".to_string())
            );
        }

        tracing::info!(
            swap_id = %record.swap_id,
            peer_addr = %record.peer_addr,
            state = record.state.as_str(),
            "peer accepted resume"
        );
        Ok(())
    }
}
