pub mod protocol;
pub mod resume;
pub mod service;
pub mod store;

use std::str::FromStr;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

/// Schema version written into every new swap record. Records tagged with
/// any other version were produced by an incompatible release and must not
/// be decoded into live protocol types.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion(CURRENT_SCHEMA_VERSION);

    pub fn is_supported(self) -> bool {
        self.0 == CURRENT_SCHEMA_VERSION
    }
}

impl From<u32> for SchemaVersion {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

/// Last known step of a swap, from the seller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    Started,
    BtcLocked,
    XmrLocked,
    EncSigLearned,
    CancelTimelockExpired,
    BtcRedeemed,
    XmrRefunded,
    BtcPunished,
    SafelyAborted,
}

impl SwapState {
    /// Terminal states have nothing left to do; everything else is an
    /// unfinished swap and a candidate for resume.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SwapState::BtcRedeemed
                | SwapState::XmrRefunded
                | SwapState::BtcPunished
                | SwapState::SafelyAborted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SwapState::Started => "started",
            SwapState::BtcLocked => "btc_locked",
            SwapState::XmrLocked => "xmr_locked",
            SwapState::EncSigLearned => "enc_sig_learned",
            SwapState::CancelTimelockExpired => "cancel_timelock_expired",
            SwapState::BtcRedeemed => "btc_redeemed",
            SwapState::XmrRefunded => "xmr_refunded",
            SwapState::BtcPunished => "btc_punished",
            SwapState::SafelyAborted => "safely_aborted",
        }
    }
}

impl FromStr for SwapState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "started" => Ok(SwapState::Started),
            "btc_locked" => Ok(SwapState::BtcLocked),
            "xmr_locked" => Ok(SwapState::XmrLocked),
            "enc_sig_learned" => Ok(SwapState::EncSigLearned),
            "cancel_timelock_expired" => Ok(SwapState::CancelTimelockExpired),
            "btc_redeemed" => Ok(SwapState::BtcRedeemed),
            "xmr_refunded" => Ok(SwapState::XmrRefunded),
            "btc_punished" => Ok(SwapState::BtcPunished),
            "safely_aborted" => Ok(SwapState::SafelyAborted),
            other => anyhow::bail!("unknown swap state: {other}"),
        }
    }
}

/// A swap row exactly as persisted. Version tag and state marker are kept
/// raw so rows written by other releases (or damaged rows) can still be
/// listed and reported without being interpreted.
#[derive(Debug, Clone)]
pub struct SwapRow {
    pub swap_id: String,
    pub schema_version: u32,
    pub state: String,
    pub peer_id: String,
    pub peer_addr: String,
    pub btc_amount_sats: u64,
    pub xmr_amount_piconero: u64,
    pub btc_lock_txid: Option<String>,
    pub xmr_lock_tx_hash: Option<String>,
    pub created_at: i64,
}

/// Typed view of a current-schema row, safe to hand to the protocol layer.
#[derive(Debug, Clone)]
pub struct SwapRecord {
    pub swap_id: String,
    pub state: SwapState,
    pub peer_id: String,
    pub peer_addr: String,
    pub btc_amount_sats: u64,
    pub xmr_amount_piconero: u64,
    pub btc_lock_txid: Option<bitcoin::Txid>,
    pub xmr_lock_tx_hash: Option<String>,
}

impl SwapRow {
    /// Decode into live types. The caller must have checked the schema
    /// version first; this only validates field contents.
    pub fn decode(&self) -> Result<SwapRecord> {
        let state = SwapState::from_str(&self.state)
            .with_context(|| format!("decode state of swap {}", self.swap_id))?;

        let peer_key = hex::decode(&self.peer_id)
            .with_context(|| format!("decode peer_id of swap {}", self.swap_id))?;
        anyhow::ensure!(
            peer_key.len() == 32,
            "peer_id of swap {} must be 32 bytes, got {}",
            self.swap_id,
            peer_key.len()
        );

        anyhow::ensure!(
            !self.peer_addr.trim().is_empty(),
            "swap {} has no peer address",
            self.swap_id
        );

        let btc_lock_txid = self
            .btc_lock_txid
            .as_deref()
            .map(bitcoin::Txid::from_str)
            .transpose()
            .with_context(|| format!("decode btc_lock_txid of swap {}", self.swap_id))?;

        Ok(SwapRecord {
            swap_id: self.swap_id.clone(),
            state,
            peer_id: self.peer_id.clone(),
            peer_addr: self.peer_addr.clone(),
            btc_amount_sats: self.btc_amount_sats,
            xmr_amount_piconero: self.xmr_amount_piconero,
            btc_lock_txid,
            xmr_lock_tx_hash: self.xmr_lock_tx_hash.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> SwapRow {
        SwapRow {
            swap_id: "swap-a".to_string(),
            schema_version: CURRENT_SCHEMA_VERSION,
            state: "btc_locked".to_string(),
            peer_id: "aa".repeat(32),
            peer_addr: "127.0.0.1:9939".to_string(),
            btc_amount_sats: 500_000,
            xmr_amount_piconero: 3_000_000_000_000,
            btc_lock_txid: Some(
                "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b".to_string(),
            ),
            xmr_lock_tx_hash: None,
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn state_str_round_trip() {
        for state in [
            SwapState::Started,
            SwapState::BtcLocked,
            SwapState::XmrLocked,
            SwapState::EncSigLearned,
            SwapState::CancelTimelockExpired,
            SwapState::BtcRedeemed,
            SwapState::XmrRefunded,
            SwapState::BtcPunished,
            SwapState::SafelyAborted,
        ] {
            assert_eq!(state.as_str().parse::<SwapState>().unwrap(), state);
        }
        assert!("half_locked".parse::<SwapState>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!SwapState::Started.is_terminal());
        assert!(!SwapState::BtcLocked.is_terminal());
        assert!(!SwapState::CancelTimelockExpired.is_terminal());
        assert!(SwapState::BtcRedeemed.is_terminal());
        assert!(SwapState::XmrRefunded.is_terminal());
        assert!(SwapState::BtcPunished.is_terminal());
        assert!(SwapState::SafelyAborted.is_terminal());
    }

    #[test]
    fn version_support() {
        assert!(SchemaVersion::CURRENT.is_supported());
        assert!(!SchemaVersion::from(1).is_supported());
        assert!(!SchemaVersion::from(CURRENT_SCHEMA_VERSION + 1).is_supported());
    }

    #[test]
    fn decode_valid_row() {
        let record = sample_row().decode().unwrap();
        assert_eq!(record.swap_id, "swap-a");
        assert_eq!(record.state, SwapState::BtcLocked);
        assert!(record.btc_lock_txid.is_some());
    }

    #[test]
    fn decode_rejects_bad_fields() {
        let mut row = sample_row();
        row.state = "locked?".to_string();
        assert!(row.decode().is_err());

        let mut row = sample_row();
        row.peer_id = "not-hex".to_string();
        assert!(row.decode().is_err());

        let mut row = sample_row();
        row.peer_id = "aa".repeat(16);
        assert!(row.decode().is_err());

        let mut row = sample_row();
        row.peer_addr = "  ".to_string();
        assert!(row.decode().is_err());

        let mut row = sample_row();
        row.btc_lock_txid = Some("zz".repeat(32));
        assert!(row.decode().is_err());
    }
}
