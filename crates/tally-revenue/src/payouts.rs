//! Proportional payout computation.
//!
//! Each Pro-eligible user receives `share = score / total_score` of every
//! pool. The referral bonus pool is split with the same share and added on
//! top of the revenue payout:
//!
//! ```text
//! total_payout = share * pumpfun_pool + share * platform_pool
//! final_payout = total_payout + share * referral_bonus_pool
//! ```
//!
//! With a total score of zero every eligible user gets a zero row. Rows that
//! have left `pending` are never rewritten.

use serde::Serialize;
use tally_db::queries::{payouts as payout_store, periods as period_store, scores as score_store};
use tally_db::rusqlite::Connection;
use tally_types::{PayoutStatus, PeriodWindow, UserPayout, BALANCE_TOLERANCE_SOL};

use crate::Result;

/// Conservation check of a period's distributed payouts.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheck {
    /// Amount the payouts should add up to.
    pub expected_sol: f64,
    /// Σ final_payout_sol of stored rows.
    pub distributed_sol: f64,
    pub difference_sol: f64,
    pub tolerance_sol: f64,
    pub balanced: bool,
}

/// Summary of a payout run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReport {
    pub total_score: f64,
    pub pumpfun_pool: f64,
    pub platform_pool: f64,
    pub referral_bonus_pool: f64,
    pub total_pool: f64,
    pub payouts: Vec<UserPayout>,
    /// Rows kept as-is because they were already being settled.
    pub settled_kept: usize,
    pub removed: usize,
    pub balance: BalanceCheck,
}

/// Compute and store every eligible user's payout for the period.
pub fn compute_payouts(conn: &Connection, window: &PeriodWindow) -> Result<PayoutReport> {
    let tx = conn.unchecked_transaction()?;
    let period = period_store::by_window(&tx, window)?;
    let scores: Vec<_> = score_store::list_for_period(&tx, window)?
        .into_iter()
        .filter(|s| s.is_pro_eligible)
        .collect();
    let total_score: f64 = scores.iter().map(|s| s.total_score).sum();

    let mut payouts = Vec::new();
    let mut settled_kept = 0;
    for s in &scores {
        let share = if total_score > 0.0 {
            if s.total_score <= 0.0 {
                continue;
            }
            s.total_score / total_score
        } else {
            0.0
        };
        let pumpfun_share_sol = share * period.pumpfun_pool_sol;
        let platform_share_sol = share * period.platform_pool_sol;
        let total_payout_sol = pumpfun_share_sol + platform_share_sol;
        let referral_bonus_sol = share * period.referral_bonus_pool_sol;
        let payout = UserPayout {
            user_id: s.user_id.clone(),
            window: *window,
            pumpfun_share_sol,
            platform_share_sol,
            total_payout_sol,
            referral_bonus_sol,
            final_payout_sol: total_payout_sol + referral_bonus_sol,
            payout_status: PayoutStatus::Pending,
            payment_tx_hash: None,
        };
        if !payout_store::upsert(&tx, &payout)? {
            settled_kept += 1;
            tracing::debug!(user = %payout.user_id, period = %window, "payout already settling, kept");
        }
        payouts.push(payout);
    }

    let mut removed = 0;
    for stored in payout_store::list_for_period(&tx, window)? {
        if !payouts.iter().any(|p| p.user_id == stored.user_id)
            && payout_store::delete_pending(&tx, &stored.user_id, window)?
        {
            removed += 1;
        }
    }
    tx.commit()?;

    let balance = verify_balance(conn, window)?;
    let stored = payout_store::list_for_period(conn, window)?;

    tracing::info!(
        period = %window,
        users = stored.len(),
        total_score,
        distributed_sol = balance.distributed_sol,
        "computed user payouts"
    );

    Ok(PayoutReport {
        total_score,
        pumpfun_pool: period.pumpfun_pool_sol,
        platform_pool: period.platform_pool_sol,
        referral_bonus_pool: period.referral_bonus_pool_sol,
        total_pool: period.total_pool_sol,
        payouts: stored,
        settled_kept,
        removed,
        balance,
    })
}

/// Compare the stored payouts of a period against its pools.
///
/// With a positive total score the payouts must add up to `total_pool_sol
/// + referral_bonus_pool_sol`; with a zero total score they must add up to
/// zero. A mismatch is logged and reported, never raised.
pub fn verify_balance(conn: &Connection, window: &PeriodWindow) -> Result<BalanceCheck> {
    let period = period_store::by_window(conn, window)?;
    let rows = payout_store::list_for_period(conn, window)?;
    let total_score: f64 = score_store::list_for_period(conn, window)?
        .iter()
        .filter(|s| s.is_pro_eligible)
        .map(|s| s.total_score)
        .sum();

    let expected_sol = if total_score > 0.0 {
        period.total_pool_sol + period.referral_bonus_pool_sol
    } else {
        0.0
    };
    let distributed_sol: f64 = rows.iter().map(|p| p.final_payout_sol).sum();
    let difference_sol = distributed_sol - expected_sol;
    let balanced = difference_sol.abs() < BALANCE_TOLERANCE_SOL;

    if !balanced {
        tracing::warn!(
            period = %window,
            expected_sol,
            distributed_sol,
            difference_sol,
            "payout balance mismatch"
        );
    }

    Ok(BalanceCheck {
        expected_sol,
        distributed_sol,
        difference_sol,
        tolerance_sol: BALANCE_TOLERANCE_SOL,
        balanced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::tests::seed_period;
    use tally_types::InteractionScore;

    fn window() -> PeriodWindow {
        PeriodWindow::parse("2025-01-01", "2025-01-15").expect("window")
    }

    fn set_pools(conn: &Connection, pumpfun: f64, platform: f64) {
        period_store::set_pumpfun_fees(conn, &window(), pumpfun / 0.4, pumpfun).expect("fees");
        period_store::set_platform_revenue(conn, &window(), platform / 0.5, platform).expect("rev");
    }

    fn seed_score(conn: &Connection, user: &str, total: f64, eligible: bool) {
        score_store::upsert(
            conn,
            &InteractionScore {
                user_id: user.into(),
                window: window(),
                posts_created: 0,
                comments_replies_created: 0,
                likes_received: 0,
                follows_received: 0,
                total_score: total,
                is_pro_eligible: eligible,
            },
        )
        .expect("score");
    }

    fn setup() -> Connection {
        let conn = tally_db::open_memory().expect("open");
        seed_period(&conn, &window(), Some("Creator1"));
        conn
    }

    #[test]
    fn test_proportional_split() {
        let conn = setup();
        set_pools(&conn, 4.0, 6.0);
        seed_score(&conn, "a", 30.0, true);
        seed_score(&conn, "b", 10.0, true);
        seed_score(&conn, "outsider", 50.0, false);

        let report = compute_payouts(&conn, &window()).expect("payouts");
        assert_eq!(report.payouts.len(), 2);
        let a = payout_store::get(&conn, "a", &window()).expect("a");
        let b = payout_store::get(&conn, "b", &window()).expect("b");
        assert!((a.final_payout_sol - 7.5).abs() < 1e-9);
        assert!((b.final_payout_sol - 2.5).abs() < 1e-9);
        assert!((a.pumpfun_share_sol - 3.0).abs() < 1e-9);
        assert!((a.platform_share_sol - 4.5).abs() < 1e-9);
        assert!(report.balance.balanced);
    }

    #[test]
    fn test_zero_scores_give_zero_rows() {
        let conn = setup();
        set_pools(&conn, 2.0, 3.0);
        seed_score(&conn, "a", 0.0, true);
        seed_score(&conn, "b", 0.0, true);

        let report = compute_payouts(&conn, &window()).expect("payouts");
        assert_eq!(report.payouts.len(), 2);
        assert!(report.payouts.iter().all(|p| p.final_payout_sol == 0.0));
        assert!(report.balance.balanced);
    }

    #[test]
    fn test_zero_score_user_omitted_when_others_score() {
        let conn = setup();
        set_pools(&conn, 1.0, 0.0);
        seed_score(&conn, "a", 5.0, true);
        seed_score(&conn, "idle", 0.0, true);
        let report = compute_payouts(&conn, &window()).expect("payouts");
        assert_eq!(report.payouts.len(), 1);
        assert_eq!(report.payouts[0].user_id, "a");
    }

    #[test]
    fn test_referral_pool_component() {
        let conn = setup();
        set_pools(&conn, 1.0, 1.0);
        period_store::set_referral_pool(&conn, &window(), 1.0).expect("pool");
        seed_score(&conn, "a", 3.0, true);
        seed_score(&conn, "b", 1.0, true);

        let report = compute_payouts(&conn, &window()).expect("payouts");
        let a = payout_store::get(&conn, "a", &window()).expect("a");
        assert!((a.total_payout_sol - 1.5).abs() < 1e-9);
        assert!((a.referral_bonus_sol - 0.75).abs() < 1e-9);
        assert!((a.final_payout_sol - 2.25).abs() < 1e-9);
        assert!((report.balance.expected_sol - 3.0).abs() < 1e-9);
        assert!(report.balance.balanced);
    }

    #[test]
    fn test_rerun_is_identical() {
        let conn = setup();
        set_pools(&conn, 1.0, 2.0);
        seed_score(&conn, "a", 7.0, true);
        seed_score(&conn, "b", 3.0, true);

        compute_payouts(&conn, &window()).expect("first");
        let first = payout_store::list_for_period(&conn, &window()).expect("list");
        compute_payouts(&conn, &window()).expect("second");
        let second = payout_store::list_for_period(&conn, &window()).expect("list");
        assert_eq!(first, second);
    }

    #[test]
    fn test_stale_pending_removed_claimed_kept() {
        let conn = setup();
        set_pools(&conn, 1.0, 0.0);
        seed_score(&conn, "a", 1.0, true);
        seed_score(&conn, "b", 1.0, true);
        compute_payouts(&conn, &window()).expect("first");
        payout_store::transition(&conn, "b", &window(), PayoutStatus::Pending, PayoutStatus::Processing, None)
            .expect("begin");

        // Both users stop being eligible
        seed_score(&conn, "a", 1.0, false);
        seed_score(&conn, "b", 1.0, false);
        seed_score(&conn, "c", 1.0, true);
        let report = compute_payouts(&conn, &window()).expect("second");
        assert_eq!(report.removed, 1);
        let users: Vec<_> = report.payouts.iter().map(|p| p.user_id.as_str()).collect();
        assert!(users.contains(&"b"));
        assert!(users.contains(&"c"));
        assert!(!users.contains(&"a"));
    }

    #[test]
    fn test_verify_reports_mismatch() {
        let conn = setup();
        set_pools(&conn, 1.0, 0.0);
        seed_score(&conn, "a", 1.0, true);
        compute_payouts(&conn, &window()).expect("payouts");
        // Pool grows after payouts were computed
        set_pools(&conn, 2.0, 0.0);
        let check = verify_balance(&conn, &window()).expect("verify");
        assert!(!check.balanced);
        assert!((check.difference_sol + 1.0).abs() < 1e-9);
    }
}
