//! Payout notifications.
//!
//! One `payout_available` notification per user with a non-zero pending
//! payout and one summed `referral_bonus` notification per referrer over
//! their pending rows. Notifications are stored idempotently; only those
//! stored for the first time are handed to a [`NotificationSink`] for push
//! delivery. Payout rows are only read.

use serde::Serialize;
use tally_db::queries::notifications::{self as notification_store, NewNotification};
use tally_db::queries::{payouts as payout_store, referrals as referral_store};
use tally_db::rusqlite::Connection;
use tally_types::{ClaimKind, PayoutStatus, PeriodWindow};

use crate::referrals::breakdown;
use crate::Result;

/// A notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutNotification {
    pub user_id: String,
    pub kind: ClaimKind,
    pub window: PeriodWindow,
    pub amount_sol: f64,
    pub title: String,
    pub message: String,
}

/// Push delivery of stored notifications.
pub trait NotificationSink {
    fn deliver(&self, notification: &PayoutNotification);
}

/// Sink that only logs.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, n: &PayoutNotification) {
        tracing::debug!(user = %n.user_id, kind = n.kind.as_str(), amount_sol = n.amount_sol, "notification");
    }
}

/// Counts of notifications first sent by a run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotifyReport {
    pub payout_notifications: usize,
    pub referral_notifications: usize,
}

fn payout_message(window: &PeriodWindow, amount_sol: f64) -> (String, String) {
    (
        "Your payout is ready".to_string(),
        format!("You earned {amount_sol:.6} SOL for {window}. Claim it from your wallet page."),
    )
}

fn referral_message(window: &PeriodWindow, amount_sol: f64, referred: usize) -> (String, String) {
    (
        "Referral bonus available".to_string(),
        format!(
            "You earned {amount_sol:.6} SOL in referral bonuses from {referred} referred user(s) for {window}."
        ),
    )
}

/// Emit the period's notifications.
pub fn notify_period(
    conn: &Connection,
    window: &PeriodWindow,
    sink: &dyn NotificationSink,
) -> Result<NotifyReport> {
    let mut pending = Vec::new();

    for payout in payout_store::list_for_period(conn, window)? {
        if payout.final_payout_sol <= 0.0 || payout.payout_status != PayoutStatus::Pending {
            continue;
        }
        let (title, message) = payout_message(window, payout.final_payout_sol);
        pending.push(PayoutNotification {
            user_id: payout.user_id,
            kind: ClaimKind::PayoutAvailable,
            window: *window,
            amount_sol: payout.final_payout_sol,
            title,
            message,
        });
    }
    let payout_count = pending.len();

    let unpaid = referral_store::list_for_period(conn, window)?
        .into_iter()
        .filter(|r| r.payout_status == PayoutStatus::Pending)
        .collect();
    for referrer in breakdown(unpaid) {
        if referrer.total_bonus_sol <= 0.0 {
            continue;
        }
        let (title, message) = referral_message(window, referrer.total_bonus_sol, referrer.referred.len());
        pending.push(PayoutNotification {
            user_id: referrer.referrer_id,
            kind: ClaimKind::ReferralBonus,
            window: *window,
            amount_sol: referrer.total_bonus_sol,
            title,
            message,
        });
    }

    let tx = conn.unchecked_transaction()?;
    let mut fresh = Vec::new();
    for (i, n) in pending.iter().enumerate() {
        let inserted = notification_store::upsert(
            &tx,
            &NewNotification {
                user_id: n.user_id.clone(),
                notification_type: n.kind.as_str().to_string(),
                window: n.window,
                amount_sol: n.amount_sol,
                title: n.title.clone(),
                message: n.message.clone(),
            },
        )?;
        if inserted {
            fresh.push(i);
        }
    }
    tx.commit()?;

    let payout_notifications = fresh.iter().filter(|&&i| i < payout_count).count();
    let referral_notifications = fresh.len() - payout_notifications;
    for &i in &fresh {
        sink.deliver(&pending[i]);
    }

    tracing::info!(
        period = %window,
        payout_notifications,
        referral_notifications,
        "sent payout notifications"
    );
    Ok(NotifyReport {
        payout_notifications,
        referral_notifications,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tally_types::{ReferralPayout, UserPayout};

    #[derive(Default)]
    struct Recorder(RefCell<Vec<PayoutNotification>>);

    impl NotificationSink for Recorder {
        fn deliver(&self, n: &PayoutNotification) {
            self.0.borrow_mut().push(n.clone());
        }
    }

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

    fn refer(conn: &Connection, referrer: &str, referred: &str, amount: f64) {
        referral_store::upsert_payout(
            conn,
            &ReferralPayout {
                referrer_id: referrer.into(),
                referred_user_id: referred.into(),
                window: window(),
                referral_bonus_sol: amount,
                payout_status: PayoutStatus::Pending,
                payment_tx_hash: None,
            },
        )
        .expect("referral");
    }

    #[test]
    fn test_one_summed_notification_per_referrer() {
        let conn = tally_db::open_memory().expect("open");
        pay(&conn, "alice", 1.0);
        pay(&conn, "bob", 2.0);
        pay(&conn, "zero", 0.0);
        refer(&conn, "ref", "alice", 0.05);
        refer(&conn, "ref", "bob", 0.1);

        let sink = Recorder::default();
        let report = notify_period(&conn, &window(), &sink).expect("notify");
        assert_eq!(report.payout_notifications, 2);
        assert_eq!(report.referral_notifications, 1);

        let delivered = sink.0.borrow();
        let referral: Vec<_> = delivered.iter().filter(|n| n.kind == ClaimKind::ReferralBonus).collect();
        assert_eq!(referral.len(), 1);
        assert!((referral[0].amount_sol - 0.15).abs() < 1e-12);
        assert!(delivered.iter().all(|n| n.user_id != "zero"));
    }

    #[test]
    fn test_rerun_stores_and_delivers_once() {
        let conn = tally_db::open_memory().expect("open");
        pay(&conn, "alice", 1.0);
        let sink = Recorder::default();
        let first = notify_period(&conn, &window(), &sink).expect("first");
        let second = notify_period(&conn, &window(), &sink).expect("second");

        assert_eq!(first.payout_notifications, 1);
        assert_eq!(second, NotifyReport::default());
        assert_eq!(sink.0.borrow().len(), 1);
        assert_eq!(notification_store::list_for_user(&conn, "alice").expect("list").len(), 1);
        let stored = payout_store::get(&conn, "alice", &window()).expect("payout");
        assert_eq!(stored.payout_status, PayoutStatus::Pending);
    }

    #[test]
    fn test_settled_rows_not_notified() {
        let conn = tally_db::open_memory().expect("open");
        pay(&conn, "alice", 1.0);
        pay(&conn, "bob", 2.0);
        refer(&conn, "ref", "alice", 0.05);
        conn.execute("UPDATE user_payouts SET payout_status = 'claimed' WHERE user_id = 'alice'", [])
            .expect("settle payout");
        conn.execute("UPDATE referral_payouts SET payout_status = 'processing'", [])
            .expect("hold referral");

        let sink = Recorder::default();
        let report = notify_period(&conn, &window(), &sink).expect("notify");
        assert_eq!(report.payout_notifications, 1);
        assert_eq!(report.referral_notifications, 0);
        let delivered = sink.0.borrow();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].user_id, "bob");
    }
}
