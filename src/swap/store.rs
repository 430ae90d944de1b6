use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension as _, params};

use super::{CURRENT_SCHEMA_VERSION, SwapRecord, SwapRow};

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create swap store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a new swap under the current schema version.
    pub fn insert_swap(&mut self, record: &SwapRecord) -> Result<()> {
        let created_at = unix_now()?;
        self.conn
            .execute(
                r#"
INSERT INTO swaps (
  swap_id,
  schema_version,
  state,
  peer_id,
  peer_addr,
  btc_amount_sats,
  xmr_amount_piconero,
  btc_lock_txid,
  xmr_lock_tx_hash,
  created_at
) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
)
"#,
                params![
                    &record.swap_id,
                    CURRENT_SCHEMA_VERSION,
                    record.state.as_str(),
                    &record.peer_id,
                    &record.peer_addr,
                    record.btc_amount_sats,
                    record.xmr_amount_piconero,
                    record.btc_lock_txid.as_ref().map(|t| t.to_string()),
                    &record.xmr_lock_tx_hash,
                    created_at,
                ],
            )
            .with_context(|| format!("insert swap {}", record.swap_id))?;
        Ok(())
    }

    pub fn get_swap(&self, swap_id: &str) -> Result<Option<SwapRow>> {
        self.conn
            .query_row(
                &format!("{SELECT_SWAP} WHERE swap_id = ?1"),
                params![swap_id],
                row_to_swap,
            )
            .optional()
            .with_context(|| format!("get swap {}", swap_id))
    }

    pub fn update_state(&mut self, swap_id: &str, state: super::SwapState) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE swaps SET state = ?2 WHERE swap_id = ?1",
                params![swap_id, state.as_str()],
            )
            .with_context(|| format!("update swap state {swap_id}"))?;
        anyhow::ensure!(rows == 1, "swap not found: {swap_id}");
        Ok(())
    }

    pub fn set_btc_lock_txid(&mut self, swap_id: &str, txid: &bitcoin::Txid) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE swaps SET btc_lock_txid = ?2 WHERE swap_id = ?1",
                params![swap_id, txid.to_string()],
            )
            .with_context(|| format!("set btc_lock_txid {swap_id}"))?;
        anyhow::ensure!(rows == 1, "swap not found: {swap_id}");
        Ok(())
    }

    pub fn set_xmr_lock_tx_hash(&mut self, swap_id: &str, tx_hash: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE swaps SET xmr_lock_tx_hash = ?2 WHERE swap_id = ?1",
                params![swap_id, tx_hash],
            )
            .with_context(|| format!("set xmr_lock_tx_hash {swap_id}"))?;
        anyhow::ensure!(rows == 1, "swap not found: {swap_id}");
        Ok(())
    }

    pub fn list_swaps(&self) -> Result<Vec<SwapRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_SWAP} ORDER BY swap_id"))
            .context("prepare list swaps")?;

        let mut out = Vec::new();
        let rows = stmt
            .query_map([], row_to_swap)
            .context("query list swaps")?;

        for row in rows {
            out.push(row.context("read swap row")?);
        }
        Ok(out)
    }
}

const SELECT_SWAP: &str = r#"
SELECT
  swap_id,
  schema_version,
  state,
  peer_id,
  peer_addr,
  btc_amount_sats,
  xmr_amount_piconero,
  btc_lock_txid,
  xmr_lock_tx_hash,
  created_at
FROM swaps
"#;

fn row_to_swap(row: &rusqlite::Row<'_>) -> rusqlite::Result<SwapRow> {
    let schema_version: i64 = row.get(1)?;
    let btc_amount_sats: i64 = row.get(5)?;
    let xmr_amount_piconero: i64 = row.get(6)?;

    Ok(SwapRow {
        swap_id: row.get(0)?,
        schema_version: u32::try_from(schema_version).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Integer,
                format!("invalid schema_version {schema_version}").into(),
            )
        })?,
        state: row.get(2)?,
        peer_id: row.get(3)?,
        peer_addr: row.get(4)?,
        btc_amount_sats: u64::try_from(btc_amount_sats).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Integer,
                format!("invalid btc_amount_sats {btc_amount_sats}").into(),
            )
        })?,
        xmr_amount_piconero: u64::try_from(xmr_amount_piconero).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Integer,
                format!("invalid xmr_amount_piconero {xmr_amount_piconero}").into(),
            )
        })?,
        btc_lock_txid: row.get(7)?,
        xmr_lock_tx_hash: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS swaps (
  swap_id TEXT PRIMARY KEY,
  schema_version INTEGER NOT NULL,
  state TEXT NOT NULL,
  peer_id TEXT NOT NULL,
  peer_addr TEXT NOT NULL,
  btc_amount_sats INTEGER NOT NULL,
  xmr_amount_piconero INTEGER NOT NULL,
  btc_lock_txid TEXT,
  xmr_lock_tx_hash TEXT,
  created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS swaps_state_idx ON swaps(state);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn unix_now() -> Result<i64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?;
    i64::try_from(now.as_secs()).context("unix timestamp overflow")
}
