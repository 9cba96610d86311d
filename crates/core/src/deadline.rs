//! Opposition deadline policy.
//!
//! The deadline is three calendar months after the day the opposition is
//! prepared. When the target month is shorter than the start day, the
//! deadline is clamped to the last day of the target month
//! (2025-01-31 -> 2025-04-30, 2024-11-30 -> 2025-02-28).

use chrono::{Months, NaiveDate};

/// Calendar months between preparation and deadline.
pub const OPPOSITION_PERIOD_MONTHS: u32 = 3;

/// Deadline for an opposition prepared on `prepared_on`.
pub fn opposition_deadline(prepared_on: NaiveDate) -> NaiveDate {
    // checked_add_months clamps to the month end; None only past NaiveDate::MAX.
    prepared_on
        .checked_add_months(Months::new(OPPOSITION_PERIOD_MONTHS))
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn plain_three_months() {
        assert_eq!(opposition_deadline(d(2025, 3, 14)), d(2025, 6, 14));
    }

    #[test]
    fn clamps_to_month_end() {
        assert_eq!(opposition_deadline(d(2025, 1, 31)), d(2025, 4, 30));
        assert_eq!(opposition_deadline(d(2024, 11, 30)), d(2025, 2, 28));
        assert_eq!(opposition_deadline(d(2023, 11, 30)), d(2024, 2, 29));
    }

    #[test]
    fn crosses_year_boundary() {
        assert_eq!(opposition_deadline(d(2025, 10, 17)), d(2026, 1, 17));
    }
}
