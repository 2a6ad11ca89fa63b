//! Period registry.
//!
//! A year is split into 24 semi-monthly windows: the 1st to the 15th, and
//! the 16th to the last day of each month. Windows are contiguous and never
//! overlap. Only fee and status fields change after a period is created.

use chrono::{Months, NaiveDate};
use tally_db::queries::periods::{self as store, NewPeriod};
use tally_db::rusqlite::Connection;
use tally_types::{Period, PeriodWindow};

use crate::{RevenueError, Result};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Earliest year accepted by [`generate_year`].
pub const MIN_YEAR: i32 = 2000;

/// Latest year accepted by [`generate_year`].
pub const MAX_YEAR: i32 = 2200;

/// Result of generating a year's periods.
#[derive(Debug, Clone)]
pub struct GeneratedYear {
    pub year: i32,
    /// Rows inserted by this call; 0 when the year already existed.
    pub created: usize,
    pub periods: Vec<Period>,
}

/// Build the 24 semi-monthly windows of `year`.
pub fn semi_monthly_windows(year: i32) -> Result<Vec<NewPeriod>> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(RevenueError::Validation(format!(
            "year {year} outside {MIN_YEAR}..={MAX_YEAR}"
        )));
    }

    let mut out = Vec::with_capacity(24);
    for (idx, name) in MONTH_NAMES.iter().enumerate() {
        let month = idx as u32 + 1;
        let first = date(year, month, 1)?;
        let fifteenth = date(year, month, 15)?;
        let sixteenth = date(year, month, 16)?;
        let last = first
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| RevenueError::Validation(format!("no last day for {year}-{month}")))?;

        let halves = [
            (1, PeriodWindow::new(first, fifteenth)?),
            (2, PeriodWindow::new(sixteenth, last)?),
        ];
        for (number, window) in halves {
            out.push(NewPeriod {
                window,
                period_name: format!("{name} {year} - Period {number}"),
                year,
                month,
                period_number: number,
                pumpfun_creator_wallet: None,
            });
        }
    }
    Ok(out)
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| RevenueError::Validation(format!("invalid date {year}-{month}-{day}")))
}

/// Create a year's periods. Existing windows are left untouched. Status
/// flags are refreshed relative to `today`.
pub fn generate_year(
    conn: &Connection,
    year: i32,
    today: NaiveDate,
    creator_wallet: Option<&str>,
) -> Result<GeneratedYear> {
    let windows = semi_monthly_windows(year)?;

    let tx = conn.unchecked_transaction()?;
    let mut created = 0;
    for mut period in windows {
        period.pumpfun_creator_wallet = creator_wallet.map(str::to_string);
        if store::insert_if_absent(&tx, &period)? {
            created += 1;
        }
    }
    store::update_status_flags(&tx, today)?;
    tx.commit()?;

    tracing::info!(year, created, "generated periods");
    Ok(GeneratedYear {
        year,
        created,
        periods: store::list_by_year(conn, year)?,
    })
}

/// Recompute `is_current`/`is_future` for every period. Returns the number
/// of periods touched.
pub fn update_status_flags(conn: &Connection, today: NaiveDate) -> Result<usize> {
    let updated = store::update_status_flags(conn, today)?;
    tracing::debug!(%today, updated, "refreshed period flags");
    Ok(updated)
}

/// The period covering `today`.
pub fn current(conn: &Connection, today: NaiveDate) -> Result<Period> {
    by_date(conn, today)
}

/// The period covering `date`.
pub fn by_date(conn: &Connection, date: NaiveDate) -> Result<Period> {
    Ok(store::covering(conn, date)?)
}

/// The period with exactly this window.
pub fn by_window(conn: &Connection, window: &PeriodWindow) -> Result<Period> {
    Ok(store::by_window(conn, window)?)
}

/// The most recently ended period that has not been calculated yet.
pub fn latest_uncalculated(conn: &Connection, today: NaiveDate) -> Result<Period> {
    store::latest_uncalculated(conn, today)?.ok_or_else(|| {
        RevenueError::NotFound(format!("no ended, uncalculated period before {today}"))
    })
}

/// Set the admin-funded referral bonus pool of a period.
pub fn set_referral_pool(conn: &Connection, window: &PeriodWindow, amount_sol: f64) -> Result<Period> {
    if !amount_sol.is_finite() || amount_sol < 0.0 {
        return Err(RevenueError::Validation(format!(
            "referral pool must be a non-negative amount, got {amount_sol}"
        )));
    }
    store::set_referral_pool(conn, window, amount_sol)?;
    tracing::info!(period = %window, amount_sol, "set referral bonus pool");
    by_window(conn, window)
}
