//! Integration test: settling computed payouts.
//!
//! Exercises:
//! 1. Refusing a claim with no payout wallet before any transfer
//! 2. Two concurrent claims for one payout producing one transfer
//! 3. Releasing a claim whose transfer never left the client
//! 4. Holding an unconfirmed claim until an operator reconciles it
//! 5. Paying a referrer's summed bonuses in one transfer
//! 6. Re-running a period after a claim without notifying again
//!
//! This test uses tally-settlement (claim state machine), tally-revenue
//! (orchestrator, to produce payouts) and tally-db.

use std::cell::RefCell;
use std::sync::Mutex;
use std::time::Duration;

use tally_db::queries::{payouts as payout_store, profiles, referrals};
use tally_db::rusqlite::Connection;
use tally_integration_tests::{
    db_with_periods, january_first_half, posts, pro_user, set_wallet, signature, SlowTransfer,
    StaticFees, RECIPIENT,
};
use tally_revenue::notify::{LogSink, NotificationSink, PayoutNotification};
use tally_revenue::orchestrator::Orchestrator;
use tally_settlement::claim::{execute_claim, reconcile, ClaimRequest, ReconcileRequest};
use tally_settlement::{SettlementError, TransferError};
use tally_types::{ClaimKind, PayoutStatus, ReferralLink};

/// alice 9 points, bob 3 points, 10 SOL pool; rita referred alice.
fn calculated_period() -> Connection {
    let conn = db_with_periods();
    pro_user(&conn, "alice");
    pro_user(&conn, "bob");
    posts(&conn, "alice", 3, "2025-01-05");
    posts(&conn, "bob", 1, "2025-01-05");
    profiles::upsert(&conn, "rita", None).expect("profile");
    referrals::insert_link(
        &conn,
        &ReferralLink {
            referrer_id: "rita".into(),
            referred_user_id: "alice".into(),
        },
    )
    .expect("link");

    let fees = StaticFees::single("2025-01-10", 25.0);
    let today = tally_types::parse_date("2025-03-01").expect("date");
    let report = Orchestrator::new(&conn, &fees, &LogSink).run(Some(january_first_half()), today);
    assert!(report.success(), "{:?}", report.steps);
    conn
}

fn request(user: &str, kind: ClaimKind) -> ClaimRequest {
    ClaimRequest {
        user_id: user.into(),
        window: january_first_half(),
        kind,
        wallet_override: None,
    }
}

fn status(conn: &Connection, user: &str) -> PayoutStatus {
    payout_store::get(conn, user, &january_first_half())
        .expect("payout")
        .payout_status
}

#[test]
fn claim_without_wallet_never_transfers() {
    let conn = calculated_period();
    let transfer = SlowTransfer::confirming(Duration::ZERO);

    let err = execute_claim(&conn, &transfer, &request("alice", ClaimKind::PayoutAvailable))
        .expect_err("claim must be rejected");

    assert!(matches!(err, SettlementError::NoWalletAddress));
    assert_eq!(err.to_string(), "no payout wallet address");
    assert_eq!(transfer.calls(), 0);
    assert_eq!(status(&conn, "alice"), PayoutStatus::Pending);
}

#[test]
fn concurrent_claims_transfer_once() {
    let conn = calculated_period();
    set_wallet(&conn, "alice", RECIPIENT);
    let ledger = Mutex::new(conn);
    let transfer = SlowTransfer::confirming(Duration::from_millis(200));

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(|| execute_claim(&ledger, &transfer, &request("alice", ClaimKind::PayoutAvailable)))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("claim thread"))
            .collect()
    });

    assert_eq!(transfer.calls(), 1);
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(SettlementError::Conflict(_))))
        .count();
    assert_eq!(rejected, 1);

    let conn = ledger.into_inner().expect("ledger");
    let stored = payout_store::get(&conn, "alice", &january_first_half()).expect("payout");
    assert_eq!(stored.payout_status, PayoutStatus::Claimed);
    assert_eq!(stored.payment_tx_hash, Some(signature(1)));
}

#[test]
fn unsent_transfer_releases_claim() {
    let conn = calculated_period();
    set_wallet(&conn, "bob", RECIPIENT);
    let transfer = SlowTransfer::failing_with(TransferError::NotSubmitted("insufficient funds".into()));

    let err = execute_claim(&conn, &transfer, &request("bob", ClaimKind::PayoutAvailable))
        .expect_err("transfer fails");
    assert!(matches!(err, SettlementError::TransferFailed(_)));
    assert_eq!(status(&conn, "bob"), PayoutStatus::Pending);

    // The released payout can be claimed again
    let retry = SlowTransfer::confirming(Duration::ZERO);
    let receipt = execute_claim(&conn, &retry, &request("bob", ClaimKind::PayoutAvailable)).expect("retry");
    assert!((receipt.amount - 2.5).abs() < 1e-9);
    assert_eq!(status(&conn, "bob"), PayoutStatus::Claimed);
}

#[test]
fn unconfirmed_transfer_waits_for_reconciliation() {
    let conn = calculated_period();
    set_wallet(&conn, "alice", RECIPIENT);
    let sig = signature(4);
    let transfer = SlowTransfer::failing_with(TransferError::Unconfirmed {
        signature: sig.clone(),
        reason: "not confirmed within 60s".into(),
    });

    let err = execute_claim(&conn, &transfer, &request("alice", ClaimKind::PayoutAvailable))
        .expect_err("unconfirmed");
    assert!(matches!(err, SettlementError::CriticalInconsistency { .. }));
    assert!(err.to_string().contains(&sig));
    assert_eq!(status(&conn, "alice"), PayoutStatus::Processing);

    // A second claim must not pay again
    let again = SlowTransfer::confirming(Duration::ZERO);
    let blocked = execute_claim(&conn, &again, &request("alice", ClaimKind::PayoutAvailable));
    assert!(matches!(blocked, Err(SettlementError::Conflict(_))));
    assert_eq!(again.calls(), 0);

    let rows = reconcile(
        &conn,
        &ReconcileRequest {
            user_id: "alice".into(),
            window: january_first_half(),
            kind: ClaimKind::PayoutAvailable,
            transaction_hash: sig.clone(),
        },
    )
    .expect("reconcile");
    assert_eq!(rows, 1);
    let stored = payout_store::get(&conn, "alice", &january_first_half()).expect("payout");
    assert_eq!(stored.payout_status, PayoutStatus::Paid);
    assert_eq!(stored.payment_tx_hash, Some(sig));
}

#[test]
fn referral_bonus_claimed_in_one_transfer() {
    let conn = calculated_period();
    let transfer = SlowTransfer::confirming(Duration::ZERO);
    let mut req = request("rita", ClaimKind::ReferralBonus);
    req.wallet_override = Some(RECIPIENT.into());

    let receipt = execute_claim(&conn, &transfer, &req).expect("referral claim");
    // alice earned 7.5 SOL; rita gets 5%
    assert!((receipt.amount - 0.375).abs() < 1e-9);
    assert_eq!(receipt.lamports, 375_000_000);
    assert_eq!(receipt.rows, 1);
    assert_eq!(transfer.calls(), 1);
    assert_eq!(
        profiles::payout_wallet(&conn, "rita").expect("wallet").as_deref(),
        Some(RECIPIENT)
    );

    let rows = referrals::list_for_referrer(&conn, "rita", &january_first_half()).expect("rows");
    assert!(rows.iter().all(|r| r.payout_status == PayoutStatus::Claimed));

    // bob referred nobody and has no wallet: the missing rows are reported
    let none = execute_claim(&conn, &transfer, &request("bob", ClaimKind::ReferralBonus));
    assert!(matches!(none, Err(SettlementError::NotFound(_))), "{none:?}");
    assert_eq!(transfer.calls(), 1);
}

#[derive(Default)]
struct RecordingSink(RefCell<Vec<PayoutNotification>>);

impl NotificationSink for RecordingSink {
    fn deliver(&self, n: &PayoutNotification) {
        self.0.borrow_mut().push(n.clone());
    }
}

#[test]
fn rerun_after_claim_does_not_notify_again() {
    let conn = db_with_periods();
    pro_user(&conn, "alice");
    posts(&conn, "alice", 3, "2025-01-05");
    set_wallet(&conn, "alice", RECIPIENT);
    let fees = StaticFees::single("2025-01-10", 25.0);
    let today = tally_types::parse_date("2025-03-01").expect("date");
    let sink = RecordingSink::default();

    let first = Orchestrator::new(&conn, &fees, &sink).run(Some(january_first_half()), today);
    assert!(first.success(), "{:?}", first.steps);
    let transfer = SlowTransfer::confirming(Duration::ZERO);
    execute_claim(&conn, &transfer, &request("alice", ClaimKind::PayoutAvailable)).expect("claim");

    let again = Orchestrator::new(&conn, &fees, &sink).run(Some(january_first_half()), today);
    assert!(again.success(), "{:?}", again.steps);

    let to_alice = sink.0.borrow().iter().filter(|n| n.user_id == "alice").count();
    assert_eq!(to_alice, 1);
    assert_eq!(status(&conn, "alice"), PayoutStatus::Claimed);
}
