//! Newline-delimited JSON framing for the peer resume handshake.

use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::swap::SwapState;

/// Sent to the counterparty when re-entering an unfinished swap. `state`
/// is the last state we persisted; the peer decides how to pick up from
/// there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub request_id: Uuid,
    pub swap_id: String,
    pub peer_id: String,
    pub state: SwapState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeResponse {
    pub request_id: Uuid,
    pub accepted: bool,
    pub reason: Option<String>,
}

pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .with_context(|| format!("connect to {addr} timed out"))?
        .with_context(|| format!("connect to {addr}"))?;
    stream.set_nodelay(true).context("set TCP_NODELAY")?;
    Ok(stream)
}

pub async fn send_line<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(msg).context("encode message")?;
    line.push(b'\n');
    writer.write_all(&line).await.context("write message")?;
    writer.flush().await.context("flush message")?;
    Ok(())
}

pub async fn recv_line<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.context("read message")?;
    anyhow::ensure!(n > 0, "connection closed");
    serde_json::from_str(line.trim_end()).context("decode message")
}
