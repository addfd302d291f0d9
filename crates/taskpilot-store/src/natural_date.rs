//! Deterministic natural-language due-date parsing.
//!
//! The recogniser is intentionally small: explicit timestamps, bare
//! dates, and a fixed phrase list pinned to the injected `now`. Anything
//! else returns `None` and the caller reports an invalid field.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};

/// Parse `text` into a UTC timestamp relative to `now`.
///
/// Accepted forms:
/// - RFC-3339 (`2025-01-10T17:00:00Z`)
/// - bare date (`2025-01-10`), resolved to end of day
/// - `today`, `tonight`, `tomorrow`
/// - `in N days` / `in N weeks`, `next week`
/// - weekday names (`friday`, `next friday`): the next such day after today
pub fn parse_natural_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let input = text.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return end_of_day(date);
    }

    let lower = input.to_ascii_lowercase();
    let today = now.date_naive();

    match lower.as_str() {
        "today" => return end_of_day(today),
        "tonight" => return at_hour(today, 21),
        "tomorrow" => return end_of_day(today + Duration::days(1)),
        "next week" => return end_of_day(today + Duration::days(7)),
        _ => {}
    }

    if let Some(rest) = lower.strip_prefix("in ") {
        let mut parts = rest.split_whitespace();
        let n: i64 = parts.next()?.parse().ok()?;
        if n <= 0 {
            return None;
        }
        return match parts.next()? {
            "day" | "days" => end_of_day(today + Duration::days(n)),
            "week" | "weeks" => end_of_day(today + Duration::weeks(n)),
            _ => None,
        };
    }

    let day_word = lower.strip_prefix("next ").unwrap_or(&lower);
    if let Some(weekday) = parse_weekday(day_word) {
        let ahead = days_until(today.weekday(), weekday);
        return end_of_day(today + Duration::days(ahead));
    }

    None
}

fn parse_weekday(word: &str) -> Option<Weekday> {
    match word {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Days from `from` to the next occurrence of `to`, always 1..=7 so
/// "friday" said on a Friday means next week's Friday.
fn days_until(from: Weekday, to: Weekday) -> i64 {
    let diff = (to.num_days_from_monday() as i64 - from.num_days_from_monday() as i64).rem_euclid(7);
    if diff == 0 {
        7
    } else {
        diff
    }
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(date.year(), date.month(), date.day(), 23, 59, 59)
        .single()
}

fn at_hour(date: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(date.year(), date.month(), date.day(), hour, 0, 0)
        .single()
}
