//! Pipeline stage routes.
//!
//! Each stage route recomputes and stores one stage for a period, so an
//! operator can resume a halted orchestration stage by stage.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tally_revenue::orchestrator::{OrchestrationReport, Orchestrator};
use tally_revenue::{fees, payouts, referrals, scoring};

use super::{today, WindowFields};
use crate::events::{BusSink, Event, EventKind};
use crate::http::{with_db, ApiError, ApiResult};
use crate::DaemonState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpfunFeesRequest {
    /// Overrides the creator wallet recorded on the period.
    pub wallet_address: Option<String>,
    #[serde(flatten)]
    pub window: WindowFields,
}

/// `POST /revenue/pumpfun-fees`
pub async fn pumpfun_fees(
    State(state): State<Arc<DaemonState>>,
    Json(req): Json<PumpfunFeesRequest>,
) -> ApiResult<fees::ExternalFees> {
    let window = req.window.required()?;
    let backends = state.backends.clone();
    let default_wallet = state.config.default_creator_wallet();
    let report = with_db(&state, move |conn| {
        let source = backends.fee_source()?;
        let stored = tally_revenue::periods::by_window(conn, &window)?;
        let wallet = req
            .wallet_address
            .filter(|w| !w.trim().is_empty())
            .or(stored.pumpfun_creator_wallet)
            .or(default_wallet);
        Ok(fees::compute_external_fees(conn, source.as_ref(), &window, wallet.as_deref())?)
    })
    .await?;
    Ok(Json(report))
}

/// `POST /revenue/platform-fees`
pub async fn platform_fees(
    State(state): State<Arc<DaemonState>>,
    Json(req): Json<WindowFields>,
) -> ApiResult<fees::PlatformFees> {
    let window = req.required()?;
    let report = with_db(&state, move |conn| Ok(fees::compute_platform_fees(conn, &window)?)).await?;
    Ok(Json(report))
}

/// `POST /revenue/interaction-score`
pub async fn interaction_score(
    State(state): State<Arc<DaemonState>>,
    Json(req): Json<WindowFields>,
) -> ApiResult<scoring::ScoringReport> {
    let window = req.required()?;
    let report = with_db(&state, move |conn| {
        tally_revenue::periods::by_window(conn, &window)?;
        Ok(scoring::compute_scores(conn, &window)?)
    })
    .await?;
    Ok(Json(report))
}

/// `POST /revenue/user-payouts`
pub async fn user_payouts(
    State(state): State<Arc<DaemonState>>,
    Json(req): Json<WindowFields>,
) -> ApiResult<payouts::PayoutReport> {
    let window = req.required()?;
    let report = with_db(&state, move |conn| Ok(payouts::compute_payouts(conn, &window)?)).await?;
    Ok(Json(report))
}

/// `POST /revenue/referral-payouts`
pub async fn referral_payouts(
    State(state): State<Arc<DaemonState>>,
    Json(req): Json<WindowFields>,
) -> ApiResult<referrals::ReferralReport> {
    let window = req.required()?;
    let report = with_db(&state, move |conn| {
        tally_revenue::periods::by_window(conn, &window)?;
        Ok(referrals::compute_referrals(conn, &window)?)
    })
    .await?;
    Ok(Json(report))
}

/// `POST /revenue/run-orchestration`
///
/// Without dates, runs the most recently ended uncalculated period. Answers
/// 200 when every stage succeeded and 500 with the same report otherwise.
pub async fn run_orchestration(
    State(state): State<Arc<DaemonState>>,
    Json(req): Json<WindowFields>,
) -> Result<Response, ApiError> {
    let requested = req.optional()?;
    let today = today();
    let backends = state.backends.clone();
    let bus = state.event_bus.clone();
    let default_wallet = state.config.default_creator_wallet();

    let report: OrchestrationReport = with_db(&state, move |conn| {
        let source = backends.fee_source()?;
        let sink = BusSink::new(bus);
        Ok(Orchestrator::new(conn, source.as_ref(), &sink)
            .with_default_creator_wallet(default_wallet)
            .run(requested, today))
    })
    .await?;

    state.event_bus.emit(Event::new(
        EventKind::OrchestrationCompleted,
        json!({
            "window": report.window,
            "periodName": report.period_name,
            "success": report.success(),
            "state": report.state,
        }),
    ));

    let status = if report.success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(report)).into_response())
}
