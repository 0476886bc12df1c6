use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chainlog_crypto::RecordHasher;
use chainlog_ledger::{AppendReceipt, LedgerService, ProvisioningService, ValidationReport};
use chainlog_types::{Record, GENESIS_SEQUENCE};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ServerError, ServerResult};

/// State shared by every handler.
pub struct AppState {
    pub ledger: LedgerService,
    pub provisioner: ProvisioningService,
}

#[derive(Debug, Deserialize)]
pub struct WriteParams {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

/// Append `message` to the chain.
pub async fn write_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WriteParams>,
) -> ServerResult<Json<AppendReceipt>> {
    let message = params
        .message
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ServerError::BadRequest("missing `message` parameter".into()))?;
    let receipt = state.ledger.append(&message).await?;
    Ok(Json(receipt))
}

/// Create the table and seed genesis.
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
) -> ServerResult<(StatusCode, Json<Record>)> {
    let genesis = state.provisioner.provision().await?;
    Ok((StatusCode::CREATED, Json(genesis)))
}

/// Liveness check.
pub async fn health_handler() -> &'static str {
    "ok"
}

/// Info handler.
pub async fn info_handler(
    State(state): State<Arc<AppState>>,
) -> ServerResult<Json<serde_json::Value>> {
    let provisioned = state.provisioner.is_provisioned().await?;
    let length = if provisioned {
        Some(state.ledger.len().await?)
    } else {
        None
    };
    Ok(Json(json!({
        "name": "chainlog-server",
        "version": env!("CARGO_PKG_VERSION"),
        "hash_domain": RecordHasher::default().domain(),
        "max_payload_len": state.ledger.config().max_payload_len,
        "provisioned": provisioned,
        "length": length,
    })))
}

pub async fn tail_handler(State(state): State<Arc<AppState>>) -> ServerResult<Json<Record>> {
    Ok(Json(state.ledger.tail().await?))
}

/// Records in `[from, to]`. `from` defaults to genesis; without `to` the
/// range is open-ended.
pub async fn records_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> ServerResult<Json<Vec<Record>>> {
    let from = params.from.unwrap_or(GENESIS_SEQUENCE);
    let to = params.to.unwrap_or(u64::MAX);
    Ok(Json(state.ledger.records(from, to).await?))
}

pub async fn record_handler(
    State(state): State<Arc<AppState>>,
    Path(sequence): Path<u64>,
) -> ServerResult<Json<Record>> {
    state
        .ledger
        .record(sequence)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("no record at seq {sequence}")))
}

/// Full-chain validation report.
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
) -> ServerResult<Json<ValidationReport>> {
    Ok(Json(state.ledger.verify().await?))
}
