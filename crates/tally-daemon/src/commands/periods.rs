//! Period registry administration.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tally_revenue::periods;

use super::{today, WindowFields};
use crate::http::{with_db, ApiError, ApiResult};
use crate::DaemonState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodsRequest {
    pub action: Option<String>,
    pub year: Option<i32>,
    #[serde(flatten)]
    pub window: WindowFields,
    pub amount_sol: Option<f64>,
    /// Creator wallet recorded on generated periods.
    pub creator_wallet: Option<String>,
}

/// `POST /periods`
pub async fn periods(State(state): State<Arc<DaemonState>>, Json(req): Json<PeriodsRequest>) -> ApiResult<Value> {
    let today = today();
    let result = match req.action.as_deref() {
        Some("generate_year") => {
            let year = req
                .year
                .ok_or_else(|| ApiError::validation("year is required"))?;
            let wallet = req
                .creator_wallet
                .clone()
                .filter(|w| !w.trim().is_empty())
                .or_else(|| state.config.default_creator_wallet());
            let generated = with_db(&state, move |conn| {
                Ok(periods::generate_year(conn, year, today, wallet.as_deref())?)
            })
            .await?;
            json!({
                "action": "generate_year",
                "year": generated.year,
                "created": generated.created,
                "periods": generated.periods,
            })
        }
        Some("update_status_flags") => {
            let updated = with_db(&state, move |conn| Ok(periods::update_status_flags(conn, today)?)).await?;
            json!({"action": "update_status_flags", "updated": updated})
        }
        Some("set_referral_pool") => {
            let window = req.window.required()?;
            let amount = req
                .amount_sol
                .ok_or_else(|| ApiError::validation("amountSol is required"))?;
            let period = with_db(&state, move |conn| {
                Ok(periods::set_referral_pool(conn, &window, amount)?)
            })
            .await?;
            json!({"action": "set_referral_pool", "period": period})
        }
        Some(other) => return Err(ApiError::validation(format!("unknown action '{other}'"))),
        None => return Err(ApiError::validation("action is required")),
    };
    Ok(Json(result))
}
