//! Recurrence date arithmetic.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

use crate::types::RecurrencePattern;

/// Compute the occurrence after `from` for the given pattern and interval.
///
/// Returns `None` for `RecurrencePattern::None` or a zero interval.
/// Monthly addition clamps to the last day of the target month, so
/// Jan 31 + 1 month lands on Feb 28 (29 in leap years).
pub fn next_occurrence(
    pattern: RecurrencePattern,
    interval: u32,
    from: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if interval == 0 {
        return None;
    }
    match pattern {
        RecurrencePattern::Daily | RecurrencePattern::Custom => {
            Some(from + Duration::days(interval as i64))
        }
        RecurrencePattern::Weekly => Some(from + Duration::weeks(interval as i64)),
        RecurrencePattern::Monthly => add_months_clamped(from, interval),
        RecurrencePattern::None => None,
    }
}

fn add_months_clamped(from: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    let total = from.year() as i64 * 12 + from.month0() as i64 + months as i64;
    let year = (total.div_euclid(12)) as i32;
    let month0 = total.rem_euclid(12) as u32;
    let day = from.day().min(last_day_of_month(year, month0 + 1)?);

    Utc.with_ymd_and_hms(
        year,
        month0 + 1,
        day,
        from.hour(),
        from.minute(),
        from.second(),
    )
    .single()
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_y, next_m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_y, next_m, 1)?;
    Some((first_of_next - Duration::days(1)).day())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn daily_adds_interval_days() {
        let got = next_occurrence(RecurrencePattern::Daily, 1, ts("2025-01-10T00:00:00Z"));
        assert_eq!(got, Some(ts("2025-01-11T00:00:00Z")));

        let got = next_occurrence(RecurrencePattern::Daily, 3, ts("2025-01-10T08:30:00Z"));
        assert_eq!(got, Some(ts("2025-01-13T08:30:00Z")));
    }

    #[test]
    fn weekly_adds_interval_weeks() {
        let got = next_occurrence(RecurrencePattern::Weekly, 2, ts("2025-01-10T00:00:00Z"));
        assert_eq!(got, Some(ts("2025-01-24T00:00:00Z")));
    }

    #[test]
    fn monthly_clamps_to_end_of_month() {
        let got = next_occurrence(RecurrencePattern::Monthly, 1, ts("2025-01-31T09:00:00Z"));
        assert_eq!(got, Some(ts("2025-02-28T09:00:00Z")));

        // Leap year.
        let got = next_occurrence(RecurrencePattern::Monthly, 1, ts("2024-01-31T09:00:00Z"));
        assert_eq!(got, Some(ts("2024-02-29T09:00:00Z")));
    }

    #[test]
    fn monthly_crosses_year_boundary() {
        let got = next_occurrence(RecurrencePattern::Monthly, 2, ts("2025-11-30T00:00:00Z"));
        assert_eq!(got, Some(ts("2026-01-30T00:00:00Z")));
    }

    #[test]
    fn monthly_keeps_day_when_it_fits() {
        let got = next_occurrence(RecurrencePattern::Monthly, 1, ts("2025-03-15T12:00:00Z"));
        assert_eq!(got, Some(ts("2025-04-15T12:00:00Z")));
    }

    #[test]
    fn custom_steps_in_days() {
        let got = next_occurrence(RecurrencePattern::Custom, 10, ts("2025-01-10T00:00:00Z"));
        assert_eq!(got, Some(ts("2025-01-20T00:00:00Z")));
    }

    #[test]
    fn none_and_zero_interval_yield_nothing() {
        assert_eq!(
            next_occurrence(RecurrencePattern::None, 1, ts("2025-01-10T00:00:00Z")),
            None
        );
        assert_eq!(
            next_occurrence(RecurrencePattern::Daily, 0, ts("2025-01-10T00:00:00Z")),
            None
        );
    }
}
