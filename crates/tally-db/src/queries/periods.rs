//! Period registry query functions.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use tally_types::{Period, PeriodWindow, RevenueStatus};

use super::{parse_col, window_cols};
use crate::{DbError, Result};

const PERIOD_COLUMNS: &str = "id, period_start, period_end, period_name, year, month, period_number,
     is_current, is_future, pumpfun_creator_wallet, revenue_status, pumpfun_fees_sol,
     platform_revenue_sol, pumpfun_pool_sol, platform_pool_sol, referral_bonus_pool_sol,
     total_pool_sol, calculated_at";

/// A period about to be registered.
#[derive(Debug, Clone)]
pub struct NewPeriod {
    pub window: PeriodWindow,
    pub period_name: String,
    pub year: i32,
    pub month: u32,
    pub period_number: u32,
    pub pumpfun_creator_wallet: Option<String>,
}

fn map_period(row: &Row<'_>) -> rusqlite::Result<Period> {
    Ok(Period {
        id: row.get(0)?,
        window: window_cols(row, 1)?,
        period_name: row.get(3)?,
        year: row.get(4)?,
        month: row.get(5)?,
        period_number: row.get(6)?,
        is_current: row.get(7)?,
        is_future: row.get(8)?,
        pumpfun_creator_wallet: row.get(9)?,
        revenue_status: parse_col(row, 10)?,
        pumpfun_fees_sol: row.get(11)?,
        platform_revenue_sol: row.get(12)?,
        pumpfun_pool_sol: row.get(13)?,
        platform_pool_sol: row.get(14)?,
        referral_bonus_pool_sol: row.get(15)?,
        total_pool_sol: row.get(16)?,
        calculated_at: row.get(17)?,
    })
}

/// Insert a period unless its window already exists. Returns `true` if a row
/// was created.
pub fn insert_if_absent(conn: &Connection, period: &NewPeriod) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO periods
         (period_start, period_end, period_name, year, month, period_number, pumpfun_creator_wallet)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            period.window.start(),
            period.window.end(),
            period.period_name,
            period.year,
            period.month,
            period.period_number,
            period.pumpfun_creator_wallet,
        ],
    )?;
    Ok(inserted == 1)
}

/// List a year's periods in chronological order.
pub fn list_by_year(conn: &Connection, year: i32) -> Result<Vec<Period>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PERIOD_COLUMNS} FROM periods WHERE year = ?1 ORDER BY period_start"
    ))?;
    let rows = stmt
        .query_map([year], map_period)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Fetch the period with exactly this window.
pub fn by_window(conn: &Connection, window: &PeriodWindow) -> Result<Period> {
    conn.query_row(
        &format!("SELECT {PERIOD_COLUMNS} FROM periods WHERE period_start = ?1 AND period_end = ?2"),
        rusqlite::params![window.start(), window.end()],
        map_period,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("period {window}")))
}

/// Fetch the period whose window covers `date`.
pub fn covering(conn: &Connection, date: NaiveDate) -> Result<Period> {
    conn.query_row(
        &format!(
            "SELECT {PERIOD_COLUMNS} FROM periods
             WHERE period_start <= ?1 AND period_end >= ?1
             ORDER BY period_start DESC LIMIT 1"
        ),
        [date],
        map_period,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("period covering {date}")))
}

/// The most recently ended period that has not been calculated yet.
pub fn latest_uncalculated(conn: &Connection, today: NaiveDate) -> Result<Option<Period>> {
    let period = conn
        .query_row(
            &format!(
                "SELECT {PERIOD_COLUMNS} FROM periods
                 WHERE period_end < ?1 AND revenue_status != ?2
                 ORDER BY period_end DESC LIMIT 1"
            ),
            rusqlite::params![today, RevenueStatus::Calculated.as_str()],
            map_period,
        )
        .optional()?;
    Ok(period)
}

/// Recompute `is_current` / `is_future` for every period relative to `today`.
pub fn update_status_flags(conn: &Connection, today: NaiveDate) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE periods SET
             is_current = (period_start <= ?1 AND period_end >= ?1),
             is_future = (period_start > ?1)",
        [today],
    )?;
    Ok(updated)
}

/// Record external creator fees and recompute the total pool. The creator
/// wallet is left as generated.
pub fn set_pumpfun_fees(
    conn: &Connection,
    window: &PeriodWindow,
    fees_sol: f64,
    pool_sol: f64,
) -> Result<Period> {
    let updated = conn.execute(
        "UPDATE periods SET
             pumpfun_fees_sol = ?3,
             pumpfun_pool_sol = ?4,
             total_pool_sol = ?4 + platform_pool_sol
         WHERE period_start = ?1 AND period_end = ?2",
        rusqlite::params![window.start(), window.end(), fees_sol, pool_sol],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("period {window}")));
    }
    by_window(conn, window)
}

/// Record internal platform revenue and recompute the total pool.
pub fn set_platform_revenue(
    conn: &Connection,
    window: &PeriodWindow,
    revenue_sol: f64,
    pool_sol: f64,
) -> Result<Period> {
    let updated = conn.execute(
        "UPDATE periods SET
             platform_revenue_sol = ?3,
             platform_pool_sol = ?4,
             total_pool_sol = pumpfun_pool_sol + ?4
         WHERE period_start = ?1 AND period_end = ?2",
        rusqlite::params![window.start(), window.end(), revenue_sol, pool_sol],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("period {window}")));
    }
    by_window(conn, window)
}

/// Set the admin-funded referral bonus pool.
pub fn set_referral_pool(conn: &Connection, window: &PeriodWindow, amount_sol: f64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE periods SET referral_bonus_pool_sol = ?3
         WHERE period_start = ?1 AND period_end = ?2",
        rusqlite::params![window.start(), window.end(), amount_sol],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("period {window}")));
    }
    Ok(())
}

/// Update the calculation status.
pub fn set_status(
    conn: &Connection,
    window: &PeriodWindow,
    status: RevenueStatus,
    calculated_at: Option<i64>,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE periods SET revenue_status = ?3, calculated_at = COALESCE(?4, calculated_at)
         WHERE period_start = ?1 AND period_end = ?2",
        rusqlite::params![window.start(), window.end(), status.as_str(), calculated_at],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("period {window}")));
    }
    Ok(())
}
