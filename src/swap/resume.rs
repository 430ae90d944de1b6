use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::task::JoinSet;

use super::protocol::SwapResumer;
use super::store::SqliteStore;
use super::{SchemaVersion, SwapRecord, SwapRow};

/// Why a persisted row was not handed to the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedVersion(u32),
    Finished(super::SwapState),
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedVersion(v) => write!(f, "unsupported schema version {v}"),
            SkipReason::Finished(state) => write!(f, "swap finished ({})", state.as_str()),
            SkipReason::Unreadable(err) => write!(f, "unreadable record: {err}"),
        }
    }
}

#[derive(Debug)]
pub enum Disposition {
    Resume(SwapRecord),
    Skip(SkipReason),
}

/// Decide what to do with one persisted row. The version tag is checked
/// before any field is decoded, so rows written by incompatible releases
/// are never interpreted.
pub fn classify(row: &SwapRow) -> Disposition {
    if !SchemaVersion::from(row.schema_version).is_supported() {
        return Disposition::Skip(SkipReason::UnsupportedVersion(row.schema_version));
    }

    let record = match row.decode() {
        Ok(record) => record,
        Err(err) => return Disposition::Skip(SkipReason::Unreadable(format!("{err:#}"))),
    };

    if record.state.is_terminal() {
        return Disposition::Skip(SkipReason::Finished(record.state));
    }

    Disposition::Resume(record)
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

/// Outcome of one startup pass.
#[derive(Debug, Clone, Default)]
pub struct ResumeReport {
    pub scanned: usize,
    pub resumed: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<(String, SkipReason)>,
}

/// Restores unfinished swaps at startup: one scan over the store, one
/// concurrent resume task per eligible record. The pass never writes to
/// the store, so shutting down mid-pass leaves every record re-resumable.
pub struct ResumeManager {
    store: Arc<Mutex<SqliteStore>>,
    resumer: Arc<dyn SwapResumer>,
    retry: RetryPolicy,
}

impl ResumeManager {
    pub fn new(
        store: Arc<Mutex<SqliteStore>>,
        resumer: Arc<dyn SwapResumer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            resumer,
            retry,
        }
    }

    pub async fn run(&self) -> Result<ResumeReport> {
        let rows = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .list_swaps()
            .context("list swaps")?;

        let mut report = ResumeReport {
            scanned: rows.len(),
            ..ResumeReport::default()
        };

        let mut tasks = JoinSet::new();
        for row in rows {
            match classify(&row) {
                Disposition::Skip(reason) => {
                    tracing::info!(swap_id = %row.swap_id, %reason, "skipping swap");
                    report.skipped.push((row.swap_id, reason));
                }
                Disposition::Resume(record) => {
                    let resumer = self.resumer.clone();
                    let retry = self.retry;
                    tasks.spawn(async move {
                        let swap_id = record.swap_id.clone();
                        let result = resume_with_retry(resumer, record, retry).await;
                        (swap_id, result)
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((swap_id, Ok(()))) => {
                    tracing::info!(swap_id = %swap_id, "resumed swap");
                    report.resumed.push(swap_id);
                }
                Ok((swap_id, Err(err))) => {
                    tracing::warn!(
                        swap_id = %swap_id,
                        error = %format!("{err:#}"),
                        "swap resume failed, record left for next startup"
                    );
                    report.failed.push((swap_id, format!("{err:#}")));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "resume task join error");
                }
            }
        }

        report.resumed.sort();
        report.failed.sort();
        report.skipped.sort_by(|a, b| a.0.cmp(&b.0));

        tracing::info!(
            scanned = report.scanned,
            resumed = report.resumed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "swap resume pass done"
        );

        Ok(report)
    }
}

async fn resume_with_retry(
    resumer: Arc<dyn SwapResumer>,
    record: SwapRecord,
    retry: RetryPolicy,
) -> Result<()> {
    let attempts = retry.attempts.max(1);
    let mut delay = retry.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match resumer.resume(record.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if attempt >= attempts {
            return Err(err)
                .with_context(|| format!("resume swap {} ({attempt} attempts)", record.swap_id));
        }

        tracing::debug!(
            swap_id = %record.swap_id,
            attempt,
            error = %format!("{err:#}"),
            "resume attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(2));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::{CURRENT_SCHEMA_VERSION, SwapState};

    fn row(swap_id: &str, version: u32, state: &str) -> SwapRow {
        SwapRow {
            swap_id: swap_id.to_string(),
            schema_version: version,
            state: state.to_string(),
            peer_id: "bb".repeat(32),
            peer_addr: "127.0.0.1:9939".to_string(),
            btc_amount_sats: 100_000,
            xmr_amount_piconero: 2_000_000_000_000,
            btc_lock_txid: None,
            xmr_lock_tx_hash: None,
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn classify_current_unfinished_as_resume() {
        let d = classify(&row("a", CURRENT_SCHEMA_VERSION, "btc_locked"));
        match d {
            Disposition::Resume(record) => assert_eq!(record.state, SwapState::BtcLocked),
            other => panic!("expected resume, got {other:?}"),
        }
    }

    #[test]
    fn classify_old_version_as_skip_before_decoding() {
        // State marker is garbage on purpose: version routing must win.
        let d = classify(&row("a", 1, "???"));
        match d {
            Disposition::Skip(SkipReason::UnsupportedVersion(1)) => {}
            other => panic!("expected version skip, got {other:?}"),
        }
    }

    #[test]
    fn classify_terminal_as_skip() {
        let d = classify(&row("a", CURRENT_SCHEMA_VERSION, "btc_redeemed"));
        match d {
            Disposition::Skip(SkipReason::Finished(SwapState::BtcRedeemed)) => {}
            other => panic!("expected finished skip, got {other:?}"),
        }
    }

    #[test]
    fn classify_unreadable_as_skip() {
        let d = classify(&row("a", CURRENT_SCHEMA_VERSION, "half_locked"));
        match d {
            Disposition::Skip(SkipReason::Unreadable(_)) => {}
            other => panic!("expected unreadable skip, got {other:?}"),
        }

        let mut bad_peer = row("b", CURRENT_SCHEMA_VERSION, "started");
        bad_peer.peer_id = "not hex".to_string();
        match classify(&bad_peer) {
            Disposition::Skip(SkipReason::Unreadable(_)) => {}
            other => panic!("expected unreadable skip, got {other:?}"),
        }
    }
}
