//! User payout query functions.
//!
//! Settlement transitions are conditional updates on `payout_status` so
//! that only one caller can move a row out of a given state.

use rusqlite::{Connection, OptionalExtension, Row};
use tally_types::{PayoutStatus, PeriodWindow, UserPayout};

use super::{parse_col, window_cols};
use crate::{now_secs, DbError, Result};

const PAYOUT_COLUMNS: &str = "user_id, period_start, period_end, pumpfun_share_sol,
     platform_share_sol, total_payout_sol, referral_bonus_sol, final_payout_sol,
     payout_status, payment_tx_hash";

fn map_payout(row: &Row<'_>) -> rusqlite::Result<UserPayout> {
    Ok(UserPayout {
        user_id: row.get(0)?,
        window: window_cols(row, 1)?,
        pumpfun_share_sol: row.get(3)?,
        platform_share_sol: row.get(4)?,
        total_payout_sol: row.get(5)?,
        referral_bonus_sol: row.get(6)?,
        final_payout_sol: row.get(7)?,
        payout_status: parse_col(row, 8)?,
        payment_tx_hash: row.get(9)?,
    })
}

/// Insert or overwrite a payout's amounts.
///
/// Rows that have left `pending` keep their amounts; returns `false` when
/// the existing row was left untouched for that reason.
pub fn upsert(conn: &Connection, payout: &UserPayout) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO user_payouts
         (user_id, period_start, period_end, pumpfun_share_sol, platform_share_sol,
          total_payout_sol, referral_bonus_sol, final_payout_sol, payout_status, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9)
         ON CONFLICT (user_id, period_start, period_end) DO UPDATE SET
             pumpfun_share_sol = excluded.pumpfun_share_sol,
             platform_share_sol = excluded.platform_share_sol,
             total_payout_sol = excluded.total_payout_sol,
             referral_bonus_sol = excluded.referral_bonus_sol,
             final_payout_sol = excluded.final_payout_sol,
             updated_at = excluded.updated_at
         WHERE user_payouts.payout_status = 'pending'",
        rusqlite::params![
            payout.user_id,
            payout.window.start(),
            payout.window.end(),
            payout.pumpfun_share_sol,
            payout.platform_share_sol,
            payout.total_payout_sol,
            payout.referral_bonus_sol,
            payout.final_payout_sol,
            now_secs(),
        ],
    )?;
    Ok(changed == 1)
}

/// List a period's payouts, largest first.
pub fn list_for_period(conn: &Connection, window: &PeriodWindow) -> Result<Vec<UserPayout>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYOUT_COLUMNS} FROM user_payouts
         WHERE period_start = ?1 AND period_end = ?2
         ORDER BY final_payout_sol DESC, user_id"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![window.start(), window.end()], map_payout)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Fetch one payout.
pub fn get(conn: &Connection, user_id: &str, window: &PeriodWindow) -> Result<UserPayout> {
    conn.query_row(
        &format!(
            "SELECT {PAYOUT_COLUMNS} FROM user_payouts
             WHERE user_id = ?1 AND period_start = ?2 AND period_end = ?3"
        ),
        rusqlite::params![user_id, window.start(), window.end()],
        map_payout,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("payout for {user_id} in {window}")))
}

/// Delete a payout that is still pending. Returns `true` if a row was removed.
pub fn delete_pending(conn: &Connection, user_id: &str, window: &PeriodWindow) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM user_payouts
         WHERE user_id = ?1 AND period_start = ?2 AND period_end = ?3 AND payout_status = 'pending'",
        rusqlite::params![user_id, window.start(), window.end()],
    )?;
    Ok(deleted == 1)
}

/// Move a payout from `from` to `to`, optionally recording a transaction hash.
///
/// Returns `false` if the row was not in `from` (or does not exist).
pub fn transition(
    conn: &Connection,
    user_id: &str,
    window: &PeriodWindow,
    from: PayoutStatus,
    to: PayoutStatus,
    tx_hash: Option<&str>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE user_payouts
         SET payout_status = ?5, payment_tx_hash = COALESCE(?6, payment_tx_hash), updated_at = ?7
         WHERE user_id = ?1 AND period_start = ?2 AND period_end = ?3 AND payout_status = ?4",
        rusqlite::params![
            user_id,
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
