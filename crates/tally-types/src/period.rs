//! Accounting periods.
//!
//! A period is a fixed semi-monthly window `[start, end]` with both ends
//! inclusive. Activity timestamps are Unix epoch seconds, so the window is
//! also exposed as the half-open range `[start_ts, end_ts_exclusive)`.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{TypeError, DATE_FORMAT};

/// Seconds in one calendar day.
const SECS_PER_DAY: i64 = 86_400;

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, TypeError> {
    let s = s.trim();
    if s.len() != 10 {
        return Err(TypeError::InvalidDate(s.to_string()));
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| TypeError::InvalidDate(s.to_string()))
}

/// An inclusive date window with `start < end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawWindow", into = "RawWindow")]
pub struct PeriodWindow {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWindow {
    period_start: NaiveDate,
    period_end: NaiveDate,
}

impl TryFrom<RawWindow> for PeriodWindow {
    type Error = TypeError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        PeriodWindow::new(raw.period_start, raw.period_end)
    }
}

impl From<PeriodWindow> for RawWindow {
    fn from(window: PeriodWindow) -> Self {
        RawWindow {
            period_start: window.start,
            period_end: window.end,
        }
    }
}

impl PeriodWindow {
    /// Create a window, rejecting `start >= end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TypeError> {
        if start >= end {
            return Err(TypeError::InvalidWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, TypeError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// First day of the window.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the window (inclusive).
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whether `date` falls inside the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Unix timestamp of `start` at 00:00 UTC.
    pub fn start_ts(&self) -> i64 {
        midnight_ts(self.start)
    }

    /// Unix timestamp of the midnight following `end`.
    pub fn end_ts_exclusive(&self) -> i64 {
        midnight_ts(self.end) + SECS_PER_DAY
    }
}

impl fmt::Display for PeriodWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

fn midnight_ts(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Revenue calculation status of a period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueStatus {
    /// Not yet calculated.
    #[default]
    Pending,
    /// An orchestration run is in progress.
    Processing,
    /// All stages completed.
    Calculated,
    /// The last orchestration run stopped at a failing step.
    Failed,
}

impl RevenueStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Calculated => "calculated",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for RevenueStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "calculated" => Ok(Self::Calculated),
            "failed" => Ok(Self::Failed),
            other => Err(TypeError::UnknownVariant {
                kind: "revenue status",
                value: other.to_string(),
            }),
        }
    }
}

/// A stored accounting period with its revenue pools.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Period {
    /// Row identifier.
    pub id: i64,
    /// The covered window.
    pub window: PeriodWindow,
    /// Display name, e.g. "January 2025 - Period 1".
    pub period_name: String,
    /// Calendar year.
    pub year: i32,
    /// Calendar month (1-12).
    pub month: u32,
    /// Period number within the month (1 or 2).
    pub period_number: u32,
    /// Today falls inside this window.
    pub is_current: bool,
    /// The window starts after today.
    pub is_future: bool,
    /// Creator wallet whose fees feed the pumpfun pool.
    pub pumpfun_creator_wallet: Option<String>,
    /// Calculation status.
    pub revenue_status: RevenueStatus,
    /// External creator fees collected in the window.
    pub pumpfun_fees_sol: f64,
    /// Internal platform revenue collected in the window.
    pub platform_revenue_sol: f64,
    /// Distributable share of creator fees.
    pub pumpfun_pool_sol: f64,
    /// Distributable share of platform revenue.
    pub platform_pool_sol: f64,
    /// Admin-funded pool distributed pro rata as a pool referral component.
    pub referral_bonus_pool_sol: f64,
    /// `pumpfun_pool_sol + platform_pool_sol`.
    pub total_pool_sol: f64,
    /// Unix timestamp of the last successful orchestration run.
    pub calculated_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).expect("valid date")
    }

    #[test]
    fn test_parse_date_strict() {
        assert!(parse_date("2025-01-15").is_ok());
        assert!(parse_date("2025-1-15").is_err());
        assert!(parse_date("15/01/2025").is_err());
        assert!(parse_date("2025-02-30").is_err());
    }

    #[test]
    fn test_window_rejects_out_of_order() {
        assert!(PeriodWindow::new(date("2025-01-15"), date("2025-01-01")).is_err());
        assert!(PeriodWindow::new(date("2025-01-01"), date("2025-01-01")).is_err());
        assert!(PeriodWindow::new(date("2025-01-01"), date("2025-01-15")).is_ok());
    }

    #[test]
    fn test_window_contains_inclusive() {
        let w = PeriodWindow::parse("2025-01-01", "2025-01-15").expect("window");
        assert!(w.contains(date("2025-01-01")));
        assert!(w.contains(date("2025-01-15")));
        assert!(!w.contains(date("2025-01-16")));
    }

    #[test]
    fn test_window_timestamps() {
        let w = PeriodWindow::parse("2025-01-01", "2025-01-15").expect("window");
        assert_eq!(w.start_ts(), 1_735_689_600);
        assert_eq!(w.end_ts_exclusive() - w.start_ts(), 15 * SECS_PER_DAY);
    }

    #[test]
    fn test_window_serde_validates() {
        let ok: PeriodWindow =
            serde_json::from_str(r#"{"periodStart":"2025-01-01","periodEnd":"2025-01-15"}"#)
                .expect("parse");
        assert_eq!(ok.start(), date("2025-01-01"));

        let bad = serde_json::from_str::<PeriodWindow>(
            r#"{"periodStart":"2025-01-15","periodEnd":"2025-01-01"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_revenue_status_roundtrip() {
        for status in [
            RevenueStatus::Pending,
            RevenueStatus::Processing,
            RevenueStatus::Calculated,
            RevenueStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RevenueStatus>(), Ok(status));
        }
        assert!("done".parse::<RevenueStatus>().is_err());
    }
}
