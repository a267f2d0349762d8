//! Free-text date extraction for class and social variants
//! ("Tuesday 27th May", "3 Jun - Leader", "June 3rd").

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

const MONTHS: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

fn day_month() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b"
        ))
        .expect("day-month pattern is valid")
    })
}

fn month_day() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b({MONTHS})\s+(\d{{1,2}})(?:st|nd|rd|th)?\b"))
            .expect("month-day pattern is valid")
    })
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let n = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

/// Find the first day + month mention in `text` and pin it to `year`.
///
/// Returns `None` when no mention is found or the day does not exist in
/// that month (e.g. "31st June").
pub fn parse_day_month(text: &str, year: i32) -> Option<NaiveDate> {
    let dm = day_month()
        .captures(text)
        .map(|c| (c.get(0).map_or(0, |m| m.start()), c[1].to_string(), c[2].to_string()));
    let md = month_day()
        .captures(text)
        .map(|c| (c.get(0).map_or(0, |m| m.start()), c[2].to_string(), c[1].to_string()));

    // Earliest mention wins when both shapes appear.
    let (_, day, month) = match (dm, md) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };

    let day: u32 = day.parse().ok()?;
    let month = month_number(&month)?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Whole days `date` lies before `today` (negative for future dates).
pub fn days_before(date: NaiveDate, today: NaiveDate) -> i64 {
    (today - date).num_days()
}

/// Year used for variants that omit it.
pub fn assumed_year(today: NaiveDate) -> i32 {
    today.year()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn ordinal_day_then_month() {
        assert_eq!(parse_day_month("27th May", 2025), Some(d(2025, 5, 27)));
        assert_eq!(parse_day_month("Tuesday 3rd June - Leader", 2025), Some(d(2025, 6, 3)));
        assert_eq!(parse_day_month("1st of Sept", 2025), Some(d(2025, 9, 1)));
        assert_eq!(parse_day_month("22 Jul", 2025), Some(d(2025, 7, 22)));
    }

    #[test]
    fn month_then_day() {
        assert_eq!(parse_day_month("May 27th / Follower", 2025), Some(d(2025, 5, 27)));
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(parse_day_month("27TH MAY", 2025), Some(d(2025, 5, 27)));
    }

    #[test]
    fn invalid_or_missing() {
        assert_eq!(parse_day_month("31st June", 2025), None);
        assert_eq!(parse_day_month("Leader", 2025), None);
        assert_eq!(parse_day_month("Term 2 / Mayhem", 2025), None);
        assert_eq!(parse_day_month("", 2025), None);
    }

    #[test]
    fn day_distance() {
        assert_eq!(days_before(d(2025, 5, 27), d(2025, 6, 15)), 19);
        assert_eq!(days_before(d(2025, 5, 27), d(2025, 6, 5)), 9);
        assert_eq!(days_before(d(2025, 6, 20), d(2025, 6, 5)), -15);
    }
}
