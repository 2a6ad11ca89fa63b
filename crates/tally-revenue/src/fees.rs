//! Revenue aggregation.
//!
//! Two independent stages feed a period's pool:
//!
//! ```text
//! pumpfun_pool_sol  = Σ creator fees in window  * 0.4
//! platform_pool_sol = (featured + subscriptions) * 0.5
//! total_pool_sol    = pumpfun_pool_sol + platform_pool_sol
//! ```
//!
//! Each stage recomputes its inputs from scratch and writes its fields in
//! one transaction, so a failed or repeated run never leaves a half-updated
//! pool.

use serde::Serialize;
use tally_db::queries::{periods as period_store, revenue as revenue_store};
use tally_db::rusqlite::Connection;
use tally_types::PeriodWindow;

use crate::pumpfun::{CreatorFeeSource, FeeBucket};
use crate::{RevenueError, Result, PLATFORM_POOL_RATE, PUMPFUN_POOL_RATE};

/// Outcome of the external fee stage.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalFees {
    pub wallet_address: String,
    pub buckets_in_window: usize,
    pub pumpfun_fees: f64,
    pub pumpfun_pool: f64,
    pub platform_pool: f64,
    pub total_pool: f64,
}

/// Outcome of the internal platform revenue stage.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFees {
    pub featured_token_revenue: f64,
    pub subscription_revenue: f64,
    pub platform_revenue: f64,
    pub pumpfun_pool: f64,
    pub platform_pool: f64,
    pub total_pool: f64,
}

/// Sum the fees of buckets dated inside the window.
pub fn sum_in_window(buckets: &[FeeBucket], window: &PeriodWindow) -> (f64, usize) {
    buckets
        .iter()
        .filter(|b| window.contains(b.date))
        .fold((0.0, 0), |(sum, n), b| (sum + b.creator_fee_sol, n + 1))
}

/// Fetch creator fees for a period and update its external pool.
///
/// `wallet` overrides the creator wallet stored on the period for this call
/// only; one of the two must be present.
pub fn compute_external_fees(
    conn: &Connection,
    source: &dyn CreatorFeeSource,
    window: &PeriodWindow,
    wallet: Option<&str>,
) -> Result<ExternalFees> {
    let period = period_store::by_window(conn, window)?;
    let wallet = match wallet.map(str::trim).filter(|w| !w.is_empty()) {
        Some(w) => w.to_string(),
        None => period.pumpfun_creator_wallet.clone().ok_or_else(|| {
            RevenueError::Validation(format!("no creator wallet for period {window}"))
        })?,
    };

    let buckets = source.fetch_fee_buckets(&wallet)?;
    warn_if_truncated(&buckets, source.bucket_limit(), window);

    let (fees, in_window) = sum_in_window(&buckets, window);
    let pool = fees * PUMPFUN_POOL_RATE;

    let tx = conn.unchecked_transaction()?;
    let updated = period_store::set_pumpfun_fees(&tx, window, fees, pool)?;
    tx.commit()?;

    tracing::info!(
        period = %window,
        wallet = %wallet,
        buckets = in_window,
        pumpfun_fees_sol = fees,
        pumpfun_pool_sol = pool,
        "computed external fees"
    );

    Ok(ExternalFees {
        wallet_address: wallet,
        buckets_in_window: in_window,
        pumpfun_fees: updated.pumpfun_fees_sol,
        pumpfun_pool: updated.pumpfun_pool_sol,
        platform_pool: updated.platform_pool_sol,
        total_pool: updated.total_pool_sol,
    })
}

fn warn_if_truncated(buckets: &[FeeBucket], limit: Option<usize>, window: &PeriodWindow) {
    let Some(limit) = limit else { return };
    if buckets.len() < limit {
        return;
    }
    if let Some(oldest) = buckets.iter().map(|b| b.date).min() {
        if oldest > window.start() {
            tracing::warn!(
                period = %window,
                %oldest,
                limit,
                "creator-fee history may be truncated; window start not covered"
            );
        }
    }
}

/// Sum internal platform revenue for a period and update its platform pool.
pub fn compute_platform_fees(conn: &Connection, window: &PeriodWindow) -> Result<PlatformFees> {
    let tx = conn.unchecked_transaction()?;
    let featured = revenue_store::featured_token_revenue(&tx, window)?;
    let subscriptions = revenue_store::subscription_revenue(&tx, window)?;
    let revenue = featured + subscriptions;
    let pool = revenue * PLATFORM_POOL_RATE;
    let updated = period_store::set_platform_revenue(&tx, window, revenue, pool)?;
    tx.commit()?;

    tracing::info!(
        period = %window,
        featured_sol = featured,
        subscriptions_sol = subscriptions,
        platform_pool_sol = pool,
        "computed platform fees"
    );

    Ok(PlatformFees {
        featured_token_revenue: featured,
        subscription_revenue: subscriptions,
        platform_revenue: updated.platform_revenue_sol,
        pumpfun_pool: updated.pumpfun_pool_sol,
        platform_pool: updated.platform_pool_sol,
        total_pool: updated.total_pool_sol,
    })
}
