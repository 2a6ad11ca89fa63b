//! Integration test: one period through the whole pipeline.
//!
//! Exercises:
//! 1. Proportional split of a known pool (7.5 / 2.5)
//! 2. Zero-score periods completing with zero payouts
//! 3. Halting at the fee stage when the fee API is down
//! 4. Re-running a period without changing any row
//! 5. Referral overrides on referred users only
//!
//! This test uses tally-revenue (orchestrator and stages), tally-db
//! (collaborator inputs, stored rows) and tally-types.

use tally_db::queries::{activity, notifications, payouts as payout_store, referrals, scores};
use tally_integration_tests::{
    db_with_periods, january_first_half, period, posts, pro_user, ts, DownFees, StaticFees,
    CREATOR_WALLET,
};
use tally_revenue::notify::LogSink;
use tally_revenue::orchestrator::{Orchestrator, RunState, Stage};
use tally_types::{ReferralLink, RevenueStatus, BALANCE_TOLERANCE_SOL};

fn today() -> chrono::NaiveDate {
    tally_types::parse_date("2025-03-01").expect("date")
}

/// alice scores 30 (10 posts), bob scores 10 (3 posts and 1 reply).
fn seed_scored_users(conn: &tally_db::rusqlite::Connection) {
    pro_user(conn, "alice");
    pro_user(conn, "bob");
    posts(conn, "alice", 10, "2025-01-04");
    posts(conn, "bob", 3, "2025-01-06");
    let post_id = activity::insert_post(conn, "carol", ts("2025-01-02")).expect("post");
    activity::insert_reply(conn, post_id, "bob", ts("2025-01-07")).expect("reply");
}

#[test]
fn pipeline_splits_pool_proportionally() {
    let conn = db_with_periods();
    seed_scored_users(&conn);
    let window = january_first_half();

    // 25 SOL creator fees -> 10 SOL pool; no platform revenue in the window
    let fees = StaticFees::single("2025-01-10", 25.0);
    let report = Orchestrator::new(&conn, &fees, &LogSink).run(Some(window), today());

    assert_eq!(report.state, RunState::Done, "{:?}", report.steps);
    assert_eq!(report.steps.len(), Stage::ALL.len());
    assert!(report.steps.iter().all(|s| s.success));

    let stored = period(&conn, &window);
    assert_eq!(stored.revenue_status, RevenueStatus::Calculated);
    assert!((stored.total_pool_sol - 10.0).abs() < 1e-9);
    assert!(stored.calculated_at.is_some());

    let alice = payout_store::get(&conn, "alice", &window).expect("alice");
    let bob = payout_store::get(&conn, "bob", &window).expect("bob");
    assert!((alice.final_payout_sol - 7.5).abs() < 1e-9);
    assert!((bob.final_payout_sol - 2.5).abs() < 1e-9);

    // carol has activity but no subscription
    let carol = scores::get(&conn, "carol", &window).expect("query");
    assert!(carol.is_some_and(|s| !s.is_pro_eligible));
    assert!(payout_store::get(&conn, "carol", &window).is_err());

    let balance = report.balance.expect("balance check");
    assert!(balance.balanced);
    assert!(balance.difference_sol.abs() < BALANCE_TOLERANCE_SOL);

    let inbox = notifications::list_for_user(&conn, "alice").expect("notifications");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, "payout_available");
}

#[test]
fn pipeline_zero_scores_pay_nothing() {
    let conn = db_with_periods();
    pro_user(&conn, "alice");
    pro_user(&conn, "bob");
    let window = january_first_half();

    // 12.5 SOL creator fees -> 5 SOL pool, nobody active
    let fees = StaticFees::single("2025-01-10", 12.5);
    let report = Orchestrator::new(&conn, &fees, &LogSink).run(Some(window), today());

    assert_eq!(report.state, RunState::Done);
    let rows = payout_store::list_for_period(&conn, &window).expect("payouts");
    assert!(rows.iter().all(|p| p.final_payout_sol == 0.0));
    assert!(report.balance.expect("balance").balanced);

    let inbox = notifications::list_for_user(&conn, "alice").expect("notifications");
    assert!(inbox.is_empty());
}

#[test]
fn pipeline_halts_when_fee_api_down() {
    let conn = db_with_periods();
    seed_scored_users(&conn);
    let window = january_first_half();

    let report = Orchestrator::new(&conn, &DownFees, &LogSink).run(Some(window), today());

    assert!(
        matches!(
            &report.state,
            RunState::Failed { step, reason }
                if *step == Stage::ComputeExternalFees.step() && reason.contains("503")
        ),
        "{:?}",
        report.state
    );
    assert_eq!(report.steps.len(), 3);
    assert!(report.steps[..2].iter().all(|s| s.success));
    assert!(report.balance.is_none());

    // Scores from step 2 stay, nothing downstream was written
    assert_eq!(scores::list_for_period(&conn, &window).expect("scores").len(), 3);
    assert!(payout_store::list_for_period(&conn, &window).expect("payouts").is_empty());
    assert_eq!(period(&conn, &window).revenue_status, RevenueStatus::Failed);

    // Recovery: the same period succeeds once the API is back
    let fees = StaticFees::single("2025-01-10", 25.0);
    let retry = Orchestrator::new(&conn, &fees, &LogSink).run(Some(window), today());
    assert!(retry.success());
}

#[test]
fn pipeline_rerun_is_idempotent() {
    let conn = db_with_periods();
    seed_scored_users(&conn);
    let window = january_first_half();
    let fees = StaticFees::single("2025-01-10", 25.0);

    Orchestrator::new(&conn, &fees, &LogSink).run(Some(window), today());
    let first = payout_store::list_for_period(&conn, &window).expect("payouts");
    let first_scores = scores::list_for_period(&conn, &window).expect("scores");

    let again = Orchestrator::new(&conn, &fees, &LogSink).run(Some(window), today());
    assert!(again.success());
    assert_eq!(payout_store::list_for_period(&conn, &window).expect("payouts"), first);
    assert_eq!(scores::list_for_period(&conn, &window).expect("scores"), first_scores);
    assert_eq!(notifications::list_for_user(&conn, "alice").expect("inbox").len(), 1);
}

#[test]
fn pipeline_pays_referrers_five_percent() {
    let conn = db_with_periods();
    seed_scored_users(&conn);
    referrals::insert_link(
        &conn,
        &ReferralLink {
            referrer_id: "rita".into(),
            referred_user_id: "alice".into(),
        },
    )
    .expect("link");
    let window = january_first_half();
    let fees = StaticFees::single("2025-01-10", 25.0);

    let report = Orchestrator::new(&conn, &fees, &LogSink).run(Some(window), today());
    assert!(report.success());

    let rows = referrals::list_for_period(&conn, &window).expect("referral rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].referrer_id, "rita");
    assert_eq!(rows[0].referred_user_id, "alice");
    assert!((rows[0].referral_bonus_sol - 0.375).abs() < 1e-9);

    let inbox = notifications::list_for_user(&conn, "rita").expect("inbox");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, "referral_bonus");
}

#[test]
fn pipeline_resolves_latest_uncalculated_period() {
    let conn = db_with_periods();
    seed_scored_users(&conn);
    let fees = StaticFees::single("2025-01-10", 25.0);

    // On 2025-01-20 the latest ended period is January 1-15
    let today = tally_types::parse_date("2025-01-20").expect("date");
    let report = Orchestrator::new(&conn, &fees, &LogSink).run(None, today);
    assert!(report.success());
    assert_eq!(report.window, Some(january_first_half()));
    assert_eq!(period(&conn, &january_first_half()).pumpfun_creator_wallet.as_deref(), Some(CREATOR_WALLET));
}
