use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use tonic::{Request, Response, Status};

use crate::proto::v1 as pb;
use crate::swap::SwapRow;
use crate::swap::resume::{Disposition, ResumeReport, classify};
use crate::swap::store::SqliteStore;

#[derive(Debug, Clone)]
pub struct AsbConfig {
    pub peer_id: String,
    pub ask_spread: f64,
}

/// Read-only operator surface over the swap store and the latest resume
/// report.
#[derive(Clone)]
pub struct AsbServiceImpl {
    cfg: AsbConfig,
    store: Arc<Mutex<SqliteStore>>,
    resume_report: Arc<Mutex<Option<ResumeReport>>>,
}

impl AsbServiceImpl {
    pub fn new(
        cfg: AsbConfig,
        store: Arc<Mutex<SqliteStore>>,
        resume_report: Arc<Mutex<Option<ResumeReport>>>,
    ) -> Self {
        Self {
            cfg,
            store,
            resume_report,
        }
    }

    fn row_to_proto(row: &SwapRow) -> Result<pb::Swap> {
        let btc_lock_txid = match &row.btc_lock_txid {
            Some(hex_txid) => hex::decode(hex_txid).context("decode btc_lock_txid")?,
            None => Vec::new(),
        };

        Ok(pb::Swap {
            swap_id: row.swap_id.clone(),
            schema_version: row.schema_version,
            state: row.state.clone(),
            peer_id: row.peer_id.clone(),
            peer_addr: row.peer_addr.clone(),
            btc_amount_sats: row.btc_amount_sats,
            xmr_amount_piconero: row.xmr_amount_piconero,
            btc_lock_txid,
            xmr_lock_tx_hash: row.xmr_lock_tx_hash.clone().unwrap_or_default(),
            created_at: row.created_at,
        })
    }
}

#[tonic::async_trait]
impl pb::asb_service_server::AsbService for AsbServiceImpl {
    async fn get_info(
        &self,
        _request: Request<pb::GetInfoRequest>,
    ) -> Result<Response<pb::Info>, Status> {
        let rows = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .list_swaps()
            .map_err(|e| Status::internal(format!("list swaps: {e:#}")))?;

        let unfinished = rows
            .iter()
            .filter(|row| matches!(classify(row), Disposition::Resume(_)))
            .count();

        Ok(Response::new(pb::Info {
            peer_id: self.cfg.peer_id.clone(),
            ask_spread: self.cfg.ask_spread,
            swap_count: rows.len() as u64,
            unfinished_swap_count: unfinished as u64,
        }))
    }

    async fn get_swap(
        &self,
        request: Request<pb::GetSwapRequest>,
    ) -> Result<Response<pb::Swap>, Status> {
        let req = request.into_inner();
        if req.swap_id.trim().is_empty() {
            return Err(Status::invalid_argument("swap_id is required"));
        }

        let row = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .get_swap(&req.swap_id)
            .map_err(|e| Status::internal(format!("get swap: {e:#}")))?
            .ok_or_else(|| Status::not_found("swap not found"))?;

        let swap = Self::row_to_proto(&row)
            .map_err(|e| Status::internal(format!("encode swap: {e:#}")))?;
        Ok(Response::new(swap))
    }

    async fn list_swaps(
        &self,
        _request: Request<pb::ListSwapsRequest>,
    ) -> Result<Response<pb::ListSwapsResponse>, Status> {
        let rows = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .list_swaps()
            .map_err(|e| Status::internal(format!("list swaps: {e:#}")))?;

        let mut swaps = Vec::with_capacity(rows.len());
        for row in &rows {
            let swap = Self::row_to_proto(row)
                .map_err(|e| Status::internal(format!("encode swap: {e:#}")))?;
            swaps.push(swap);
        }

        Ok(Response::new(pb::ListSwapsResponse { swaps }))
    }

    async fn get_resume_report(
        &self,
        _request: Request<pb::GetResumeReportRequest>,
    ) -> Result<Response<pb::ResumeReport>, Status> {
        let report = self
            .resume_report
            .lock()
            .expect("resume report mutex poisoned")
            .clone()
            .ok_or_else(|| Status::unavailable("resume pass has not completed yet"))?;

        let resumed = report
            .resumed
            .iter()
            .map(|swap_id| pb::ResumeEntry {
                swap_id: swap_id.clone(),
                detail: String::new(),
            })
            .collect();
        let failed = report
            .failed
            .iter()
            .map(|(swap_id, err)| pb::ResumeEntry {
                swap_id: swap_id.clone(),
                detail: err.clone(),
            })
            .collect();
        let skipped = report
            .skipped
            .iter()
            .map(|(swap_id, reason)| pb::ResumeEntry {
                swap_id: swap_id.clone(),
                detail: reason.to_string(),
            })
            .collect();

        Ok(Response::new(pb::ResumeReport {
            scanned: report.scanned as u64,
            resumed,
            failed,
            skipped,
        }))
    }
}
