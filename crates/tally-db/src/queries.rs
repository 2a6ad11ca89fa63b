//! Database query functions organized by domain.

pub mod activity;
pub mod notifications;
pub mod payouts;
pub mod periods;
pub mod profiles;
pub mod referrals;
pub mod revenue;
pub mod scores;

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::Row;
use tally_types::{PeriodWindow, TypeError};

/// Read a text column and parse it into a domain enum.
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = TypeError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a `(period_start, period_end)` column pair.
pub(crate) fn window_cols(row: &Row<'_>, start_idx: usize) -> rusqlite::Result<PeriodWindow> {
    let start: NaiveDate = row.get(start_idx)?;
    let end: NaiveDate = row.get(start_idx + 1)?;
    PeriodWindow::new(start, end).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(start_idx, Type::Text, Box::new(e))
    })
}
