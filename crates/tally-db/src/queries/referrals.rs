//! Referral relation and referral payout query functions.

use rusqlite::{Connection, OptionalExtension, Row};
use tally_types::{PayoutStatus, PeriodWindow, ReferralLink, ReferralPayout};

use super::{parse_col, window_cols};
use crate::{now_secs, Result};

const REFERRAL_PAYOUT_COLUMNS: &str = "referrer_id, referred_user_id, period_start, period_end,
     referral_bonus_sol, payout_status, payment_tx_hash";

fn map_referral_payout(row: &Row<'_>) -> rusqlite::Result<ReferralPayout> {
    Ok(ReferralPayout {
        referrer_id: row.get(0)?,
        referred_user_id: row.get(1)?,
        window: window_cols(row, 2)?,
        referral_bonus_sol: row.get(4)?,
        payout_status: parse_col(row, 5)?,
        payment_tx_hash: row.get(6)?,
    })
}

/// Record a referral relation (signup flow).
pub fn insert_link(conn: &Connection, link: &ReferralLink) -> Result<()> {
    conn.execute(
        "INSERT INTO referrals (referred_user_id, referrer_id, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![link.referred_user_id, link.referrer_id, now_secs()],
    )?;
    Ok(())
}

/// The referrer of `user_id`, if any.
pub fn referrer_of(conn: &Connection, user_id: &str) -> Result<Option<String>> {
    let referrer = conn
        .query_row(
            "SELECT referrer_id FROM referrals WHERE referred_user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(referrer)
}

/// Insert or overwrite a referral payout. Rows that have left `pending` are
/// left untouched; returns `false` in that case.
pub fn upsert_payout(conn: &Connection, payout: &ReferralPayout) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO referral_payouts
         (referrer_id, referred_user_id, period_start, period_end, referral_bonus_sol,
          payout_status, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
         ON CONFLICT (referrer_id, referred_user_id, period_start, period_end) DO UPDATE SET
             referral_bonus_sol = excluded.referral_bonus_sol,
             updated_at = excluded.updated_at
         WHERE referral_payouts.payout_status = 'pending'",
        rusqlite::params![
            payout.referrer_id,
            payout.referred_user_id,
            payout.window.start(),
            payout.window.end(),
            payout.referral_bonus_sol,
            now_secs(),
        ],
    )?;
    Ok(changed == 1)
}

/// List a period's referral payouts grouped by referrer.
pub fn list_for_period(conn: &Connection, window: &PeriodWindow) -> Result<Vec<ReferralPayout>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REFERRAL_PAYOUT_COLUMNS} FROM referral_payouts
         WHERE period_start = ?1 AND period_end = ?2
         ORDER BY referrer_id, referred_user_id"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![window.start(), window.end()], map_referral_payout)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// List one referrer's rows for a period.
pub fn list_for_referrer(
    conn: &Connection,
    referrer_id: &str,
    window: &PeriodWindow,
) -> Result<Vec<ReferralPayout>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REFERRAL_PAYOUT_COLUMNS} FROM referral_payouts
         WHERE referrer_id = ?1 AND period_start = ?2 AND period_end = ?3
         ORDER BY referred_user_id"
    ))?;
    let rows = stmt
        .query_map(
            rusqlite::params![referrer_id, window.start(), window.end()],
            map_referral_payout,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete a pending referral payout. Returns `true` if a row was removed.
pub fn delete_pending(
    conn: &Connection,
    referrer_id: &str,
    referred_user_id: &str,
    window: &PeriodWindow,
) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM referral_payouts
         WHERE referrer_id = ?1 AND referred_user_id = ?2 AND period_start = ?3
           AND period_end = ?4 AND payout_status = 'pending'",
        rusqlite::params![referrer_id, referred_user_id, window.start(), window.end()],
    )?;
    Ok(deleted == 1)
}

/// Move one referral row from `from` to `to`. Returns `false` if the row was
/// not in `from`.
pub fn transition_payout(
    conn: &Connection,
    referrer_id: &str,
    referred_user_id: &str,
    window: &PeriodWindow,
    from: PayoutStatus,
    to: PayoutStatus,
    tx_hash: Option<&str>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE referral_payouts
         SET payout_status = ?6, payment_tx_hash = COALESCE(?7, payment_tx_hash), updated_at = ?8
         WHERE referrer_id = ?1 AND referred_user_id = ?2 AND period_start = ?3
           AND period_end = ?4 AND payout_status = ?5",
        rusqlite::params![
            referrer_id,
            referred_user_id,
            window.start(),
            window.end(),
            from.as_str(),
            to.as_str(),
            tx_hash,
            now_secs(),
        ],
    )?;
    Ok(changed == 1)
}

/// Move every row of a referrer's period from `from` to `to` in one
/// statement, returning the rows that moved.
///
/// Used as the claim guard: two concurrent callers can never both receive
/// the same row.
pub fn transition_for_referrer(
    conn: &Connection,
    referrer_id: &str,
    window: &PeriodWindow,
    from: PayoutStatus,
    to: PayoutStatus,
    tx_hash: Option<&str>,
) -> Result<Vec<ReferralPayout>> {
    let mut stmt = conn.prepare(&format!(
        "UPDATE referral_payouts
         SET payout_status = ?5, payment_tx_hash = COALESCE(?6, payment_tx_hash), updated_at = ?7
         WHERE referrer_id = ?1 AND period_start = ?2 AND period_end = ?3 AND payout_status = ?4
         RETURNING {REFERRAL_PAYOUT_COLUMNS}"
    ))?;
    let rows = stmt
        .query_map(
            rusqlite::params![
                referrer_id,
                window.start(),
                window.end(),
                from.as_str(),
                to.as_str(),
                tx_hash,
                now_secs(),
            ],
            map_referral_payout,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> PeriodWindow {
        PeriodWindow::parse("2025-01-01", "2025-01-15").expect("window")
    }

    fn row(referrer: &str, referred: &str, bonus: f64) -> ReferralPayout {
        ReferralPayout {
            referrer_id: referrer.to_string(),
            referred_user_id: referred.to_string(),
            window: window(),
            referral_bonus_sol: bonus,
            payout_status: PayoutStatus::Pending,
            payment_tx_hash: None,
        }
    }

    #[test]
    fn test_links() {
        let conn = crate::open_memory().expect("open");
        insert_link(
            &conn,
            &ReferralLink {
                referrer_id: "ref".into(),
                referred_user_id: "alice".into(),
            },
        )
        .expect("insert");
        assert_eq!(referrer_of(&conn, "alice").expect("query").as_deref(), Some("ref"));
        assert_eq!(referrer_of(&conn, "bob").expect("query"), None);
    }

    #[test]
    fn test_self_referral_rejected() {
        let conn = crate::open_memory().expect("open");
        let result = insert_link(
            &conn,
            &ReferralLink {
                referrer_id: "alice".into(),
                referred_user_id: "alice".into(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_upsert_never_duplicates() {
        let conn = crate::open_memory().expect("open");
        upsert_payout(&conn, &row("ref", "alice", 0.1)).expect("insert");
        upsert_payout(&conn, &row("ref", "alice", 0.2)).expect("overwrite");
        let rows = list_for_period(&conn, &window()).expect("list");
        assert_eq!(rows.len(), 1);
        assert!((rows[0].referral_bonus_sol - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_transition_for_referrer_moves_all_pending_once() {
        let conn = crate::open_memory().expect("open");
        upsert_payout(&conn, &row("ref", "alice", 0.1)).expect("insert");
        upsert_payout(&conn, &row("ref", "bob", 0.3)).expect("insert");
        upsert_payout(&conn, &row("other", "carol", 0.5)).expect("insert");

        let moved = transition_for_referrer(
            &conn,
            "ref",
            &window(),
            PayoutStatus::Pending,
            PayoutStatus::Processing,
            None,
        )
        .expect("transition");
        assert_eq!(moved.len(), 2);
        assert!(moved.iter().all(|r| r.payout_status == PayoutStatus::Processing));

        let again = transition_for_referrer(
            &conn,
            "ref",
            &window(),
            PayoutStatus::Pending,
            PayoutStatus::Processing,
            None,
        )
        .expect("transition");
        assert!(again.is_empty());

        let others = list_for_referrer(&conn, "other", &window()).expect("list");
        assert_eq!(others[0].payout_status, PayoutStatus::Pending);
    }

    #[test]
    fn test_transition_single_row() {
        let conn = crate::open_memory().expect("open");
        upsert_payout(&conn, &row("ref", "alice", 0.1)).expect("insert");
        upsert_payout(&conn, &row("ref", "bob", 0.3)).expect("insert");
        let moved = transition_payout(
            &conn,
            "ref",
            "alice",
            &window(),
            PayoutStatus::Pending,
            PayoutStatus::Processing,
            None,
        )
        .expect("transition");
        assert!(moved);

        let rows = list_for_referrer(&conn, "ref", &window()).expect("list");
        assert_eq!(rows[0].payout_status, PayoutStatus::Processing);
        assert_eq!(rows[1].payout_status, PayoutStatus::Pending);
    }
}
