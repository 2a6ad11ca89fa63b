//! Referral overrides.
//!
//! A referrer earns `0.05 * final_payout_sol` of each referred user's
//! payout for the period. Referred users without a positive payout produce
//! no row.

use std::collections::BTreeMap;

use serde::Serialize;
use tally_db::queries::{payouts as payout_store, referrals as referral_store};
use tally_db::rusqlite::Connection;
use tally_types::{PayoutStatus, PeriodWindow, ReferralPayout};

use crate::{Result, REFERRAL_RATE};

/// One referrer's rows for a period.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerBreakdown {
    pub referrer_id: String,
    pub total_bonus_sol: f64,
    pub referred: Vec<ReferralPayout>,
}

/// Summary of a referral run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralReport {
    pub total_bonus_sol: f64,
    pub referrers: Vec<ReferrerBreakdown>,
    pub settled_kept: usize,
    pub removed: usize,
}

/// Compute and store referral overrides for every referred payout.
pub fn compute_referrals(conn: &Connection, window: &PeriodWindow) -> Result<ReferralReport> {
    let tx = conn.unchecked_transaction()?;

    let mut targets: Vec<(String, String)> = Vec::new();
    let mut settled_kept = 0;
    for payout in payout_store::list_for_period(&tx, window)? {
        if payout.final_payout_sol <= 0.0 {
            continue;
        }
        let Some(referrer_id) = referral_store::referrer_of(&tx, &payout.user_id)? else {
            continue;
        };
        let row = ReferralPayout {
            referrer_id,
            referred_user_id: payout.user_id,
            window: *window,
            referral_bonus_sol: payout.final_payout_sol * REFERRAL_RATE,
            payout_status: PayoutStatus::Pending,
            payment_tx_hash: None,
        };
        if !referral_store::upsert_payout(&tx, &row)? {
            settled_kept += 1;
        }
        targets.push((row.referrer_id, row.referred_user_id));
    }

    let mut removed = 0;
    for stored in referral_store::list_for_period(&tx, window)? {
        let wanted = targets
            .iter()
            .any(|(r, u)| *r == stored.referrer_id && *u == stored.referred_user_id);
        if !wanted
            && referral_store::delete_pending(&tx, &stored.referrer_id, &stored.referred_user_id, window)?
        {
            removed += 1;
        }
    }
    tx.commit()?;

    let referrers = breakdown(referral_store::list_for_period(conn, window)?);
    let total_bonus_sol = referrers.iter().map(|r| r.total_bonus_sol).sum();
    tracing::info!(
        period = %window,
        referrers = referrers.len(),
        total_bonus_sol,
        removed,
        "computed referral payouts"
    );

    Ok(ReferralReport {
        total_bonus_sol,
        referrers,
        settled_kept,
        removed,
    })
}

/// Group referral rows by referrer, summing each group.
pub fn breakdown(rows: Vec<ReferralPayout>) -> Vec<ReferrerBreakdown> {
    let mut grouped: BTreeMap<String, Vec<ReferralPayout>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.referrer_id.clone()).or_default().push(row);
    }
    grouped
        .into_iter()
        .map(|(referrer_id, referred)| ReferrerBreakdown {
            total_bonus_sol: referred.iter().map(|r| r.referral_bonus_sol).sum(),
            referrer_id,
            referred,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::{ReferralLink, UserPayout};

    fn window() -> PeriodWindow {
        PeriodWindow::parse("2025-01-01", "2025-01-15").expect("window")
    }

    fn pay(conn: &Connection, user: &str, amount: f64) {
        payout_store::upsert(
            conn,
            &UserPayout {
                user_id: user.into(),
                window: window(),
                pumpfun_share_sol: amount,
                platform_share_sol: 0.0,
                total_payout_sol: amount,
                referral_bonus_sol: 0.0,
                final_payout_sol: amount,
                payout_status: PayoutStatus::Pending,
                payment_tx_hash: None,
            },
        )
        .expect("payout");
    }

    fn link(conn: &Connection, referrer: &str, referred: &str) {
        referral_store::insert_link(
            conn,
            &ReferralLink {
                referrer_id: referrer.into(),
                referred_user_id: referred.into(),
            },
        )
        .expect("link");
    }

    #[test]
    fn test_bonus_is_five_percent() {
        let conn = tally_db::open_memory().expect("open");
        pay(&conn, "alice", 2.0);
        pay(&conn, "bob", 1.0);
        pay(&conn, "carol", 4.0);
        pay(&conn, "dave", 0.0);
        link(&conn, "ref", "alice");
        link(&conn, "ref", "bob");
        link(&conn, "ref2", "dave");

        let report = compute_referrals(&conn, &window()).expect("referrals");
        assert_eq!(report.referrers.len(), 1);
        let r = &report.referrers[0];
        assert_eq!(r.referrer_id, "ref");
        assert_eq!(r.referred.len(), 2);
        assert!((r.total_bonus_sol - 0.15).abs() < 1e-12);

        let rows = referral_store::list_for_period(&conn, &window()).expect("rows");
        assert!(rows.iter().all(|row| row.referred_user_id != "carol"));
        assert!(rows.iter().all(|row| row.referred_user_id != "dave"));
    }

    #[test]
    fn test_rerun_never_duplicates() {
        let conn = tally_db::open_memory().expect("open");
        pay(&conn, "alice", 2.0);
        link(&conn, "ref", "alice");
        compute_referrals(&conn, &window()).expect("first");
        compute_referrals(&conn, &window()).expect("second");
        assert_eq!(referral_store::list_for_period(&conn, &window()).expect("rows").len(), 1);
    }

    #[test]
    fn test_stale_row_removed() {
        let conn = tally_db::open_memory().expect("open");
        pay(&conn, "alice", 2.0);
        link(&conn, "ref", "alice");
        compute_referrals(&conn, &window()).expect("first");

        pay(&conn, "alice", 0.0);
        let report = compute_referrals(&conn, &window()).expect("second");
        assert_eq!(report.removed, 1);
        assert!(report.referrers.is_empty());
    }
}
