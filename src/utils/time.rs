use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::Serialize;

use crate::error::{AppError, Result};

/// Inclusive calendar range sent to history endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// The `days` calendar days leading up to and including `today`.
pub fn lookback_range(today: NaiveDate, days: u32) -> Result<DateRange> {
    let from = today
        .checked_sub_days(Days::new(u64::from(days)))
        .ok_or_else(|| AppError::message(format!("cannot look back {days} days from {today}")))?;
    Ok(DateRange { from, to: today })
}

/// The closest earlier Monday-to-Friday date. A calendar heuristic only: exchange holidays are
/// not known here, so results after a closure name the holiday itself.
pub fn previous_weekday(date: NaiveDate) -> NaiveDate {
    let mut day = date.pred_opt().unwrap_or(date);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    day
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_requested_days() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let range = lookback_range(today, 7).expect("range");
        assert_eq!(range.from, NaiveDate::from_ymd_opt(2024, 2, 26).unwrap());
        assert_eq!(range.to, today);
    }

    #[test]
    fn previous_weekday_skips_weekend() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let friday = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(previous_weekday(monday), friday);
        assert_eq!(
            previous_weekday(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
            NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()
        );
    }

    #[test]
    fn rejects_underflow() {
        assert!(lookback_range(NaiveDate::MIN, 1).is_err());
    }
}
