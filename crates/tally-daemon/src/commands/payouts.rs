//! Claim and reconciliation routes.
//!
//! The claim handler performs no caller authentication: the upstream auth
//! layer is responsible for ensuring `userId` is the caller's own id.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tally_db::rusqlite::Connection;
use tally_settlement::claim::{self, ClaimRequest, LedgerAccess, ReconcileRequest};
use tally_types::ClaimKind;

use super::WindowFields;
use crate::events::{Event, EventKind};
use crate::http::{ApiError, ApiResult};
use crate::DaemonState;

/// The daemon's connection, locked from a blocking worker.
struct SharedLedger<'a>(&'a tokio::sync::Mutex<Connection>);

impl LedgerAccess for SharedLedger<'_> {
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> tally_settlement::Result<T>,
    ) -> tally_settlement::Result<T> {
        let conn = self.0.blocking_lock();
        f(&conn)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimBody {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub window: WindowFields,
    pub notification_type: Option<String>,
    pub wallet_address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub transaction_hash: String,
    pub amount: f64,
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(format!("{name} is required")))
}

fn claim_kind(value: Option<String>) -> Result<ClaimKind, ApiError> {
    Ok(required(value, "notificationType")?.parse()?)
}

/// `POST /payouts/claim`
pub async fn claim(State(state): State<Arc<DaemonState>>, Json(body): Json<ClaimBody>) -> ApiResult<ClaimResponse> {
    let request = ClaimRequest {
        user_id: required(body.user_id, "userId")?,
        window: body.window.required()?,
        kind: claim_kind(body.notification_type)?,
        wallet_override: body.wallet_address,
    };

    let db = state.db.clone();
    let backends = state.backends.clone();
    let (request, receipt) = tokio::task::spawn_blocking(move || {
        let transfer = backends.transfer_client()?;
        let receipt = claim::execute_claim(&SharedLedger(&db), transfer.as_ref(), &request)?;
        Ok::<_, ApiError>((request, receipt))
    })
    .await
    .map_err(|e| ApiError::internal(format!("worker failed: {e}")))??;

    state.event_bus.emit(Event::new(
        EventKind::PayoutClaimed,
        json!({
            "userId": request.user_id,
            "periodStart": request.window.start(),
            "periodEnd": request.window.end(),
            "notificationType": request.kind.as_str(),
            "transactionHash": receipt.transaction_hash,
            "amountSol": receipt.amount,
            "recipient": receipt.recipient,
        }),
    ));

    Ok(Json(ClaimResponse {
        transaction_hash: receipt.transaction_hash,
        amount: receipt.amount,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileBody {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub window: WindowFields,
    pub notification_type: Option<String>,
    pub transaction_hash: Option<String>,
}

/// `POST /payouts/reconcile`
pub async fn reconcile(
    State(state): State<Arc<DaemonState>>,
    Json(body): Json<ReconcileBody>,
) -> ApiResult<serde_json::Value> {
    let request = ReconcileRequest {
        user_id: required(body.user_id, "userId")?,
        window: body.window.required()?,
        kind: claim_kind(body.notification_type)?,
        transaction_hash: required(body.transaction_hash, "transactionHash")?,
    };
    let rows = crate::http::with_db(&state, move |conn| Ok(claim::reconcile(conn, &request)?)).await?;
    Ok(Json(json!({"reconciled": rows})))
}
