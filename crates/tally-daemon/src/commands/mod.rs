//! Route handlers.
//!
//! Each submodule implements the routes for one API prefix.

pub mod payouts;
pub mod periods;
pub mod revenue;

use chrono::NaiveDate;
use serde::Deserialize;
use tally_types::PeriodWindow;

use crate::http::ApiError;

/// `{periodStart, periodEnd}` request body fields.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowFields {
    pub period_start: Option<String>,
    pub period_end: Option<String>,
}

impl WindowFields {
    /// Both dates, validated.
    pub fn required(&self) -> Result<PeriodWindow, ApiError> {
        self.optional()?
            .ok_or_else(|| ApiError::validation("periodStart and periodEnd are required"))
    }

    /// Both dates or neither.
    pub fn optional(&self) -> Result<Option<PeriodWindow>, ApiError> {
        match (self.period_start.as_deref(), self.period_end.as_deref()) {
            (Some(start), Some(end)) => Ok(Some(PeriodWindow::parse(start, end)?)),
            (None, None) => Ok(None),
            _ => Err(ApiError::validation(
                "periodStart and periodEnd must be given together",
            )),
        }
    }
}

/// Current UTC date.
pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(start: Option<&str>, end: Option<&str>) -> WindowFields {
        WindowFields {
            period_start: start.map(str::to_string),
            period_end: end.map(str::to_string),
        }
    }

    #[test]
    fn test_window_fields() {
        assert!(fields(Some("2025-01-01"), Some("2025-01-15")).required().is_ok());
        assert!(fields(None, None).required().is_err());
        assert_eq!(fields(None, None).optional().expect("optional"), None);
        assert!(fields(Some("2025-01-01"), None).optional().is_err());
        assert!(fields(Some("2025-13-01"), Some("2025-01-15")).required().is_err());
    }
}
