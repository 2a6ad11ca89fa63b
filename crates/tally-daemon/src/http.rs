//! HTTP/JSON API.
//!
//! Every pipeline route runs its work on the blocking pool while holding the
//! database lock. Admin routes sit behind [`auth::require_api_key`]; the claim
//! route is public.
//!
//! `/payouts/claim` trusts the `userId` in its body and saves a supplied
//! `walletAddress` to that user's profile. It must be deployed behind an
//! upstream auth layer that binds `userId` to the authenticated caller.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Serialize;
use tally_db::rusqlite::Connection;
use tally_revenue::RevenueError;
use tally_settlement::SettlementError;

use crate::auth::{self, ApiKeyConfig};
use crate::commands;
use crate::DaemonState;

/// JSON error body with its HTTP status.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    #[serde(rename = "error")]
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "CRITICAL_INCONSISTENCY", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "unauthorized")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<RevenueError> for ApiError {
    fn from(err: RevenueError) -> Self {
        match err {
            RevenueError::Validation(m) => ApiError::validation(m),
            RevenueError::NotFound(m) => ApiError::not_found(m),
            RevenueError::Upstream(m) => ApiError::upstream(m),
            RevenueError::Db(e) => ApiError::internal(format!("database error: {e}")),
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        let message = err.to_string();
        match err {
            SettlementError::Validation(m) => ApiError::validation(m),
            SettlementError::NotFound(m) => ApiError::not_found(m),
            SettlementError::NoWalletAddress => ApiError::not_found(message),
            SettlementError::Conflict(m) => ApiError::conflict(m),
            SettlementError::TransferFailed(_) => ApiError::upstream(message),
            SettlementError::CriticalInconsistency { .. } => ApiError::critical(message),
            SettlementError::Signer(_) | SettlementError::Db(_) => ApiError::internal(message),
        }
    }
}

impl From<tally_types::TypeError> for ApiError {
    fn from(err: tally_types::TypeError) -> Self {
        ApiError::validation(err.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Run `f` on the blocking pool with the database locked.
pub async fn with_db<T, F>(state: &Arc<DaemonState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, ApiError> + Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db.blocking_lock();
        f(&conn)
    })
    .await
    .map_err(|e| ApiError::internal(format!("worker failed: {e}")))?
}

/// Build the application router.
pub fn router(state: Arc<DaemonState>) -> Router {
    let api_key = ApiKeyConfig::new(&state.config.server.api_key);

    let admin = Router::new()
        .route("/periods", post(commands::periods::periods))
        .route("/revenue/pumpfun-fees", post(commands::revenue::pumpfun_fees))
        .route("/revenue/platform-fees", post(commands::revenue::platform_fees))
        .route("/revenue/interaction-score", post(commands::revenue::interaction_score))
        .route("/revenue/user-payouts", post(commands::revenue::user_payouts))
        .route("/revenue/referral-payouts", post(commands::revenue::referral_payouts))
        .route("/revenue/run-orchestration", post(commands::revenue::run_orchestration))
        .route("/payouts/reconcile", post(commands::payouts::reconcile))
        .layer(middleware::from_fn_with_state(api_key, auth::require_api_key));

    Router::new()
        .route("/health", get(health))
        .route("/payouts/claim", post(commands::payouts::claim))
        .merge(admin)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
