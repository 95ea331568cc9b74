//! Temporal expression parsing relative to an article's publication date.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use regex::Regex;
use std::sync::LazyLock;

use crate::model::TimestampConfidence;

static EXPLICIT_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?",
    )
    .expect("explicit date pattern compiles")
});

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date pattern compiles"));

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(yesterday|today|this morning|this evening|tonight|overnight|last week|last month|(\d+)\s+(hours?|days?|weeks?)\s+ago|on\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b")
        .expect("relative pattern compiles")
});

fn month_number(name: &str) -> u32 {
    match name.to_lowercase().as_str() {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        _ => 12,
    }
}

fn weekday_number(name: &str) -> Weekday {
    match name.to_lowercase().as_str() {
        "monday" => Weekday::Mon,
        "tuesday" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

/// Resolve the event timestamp mentioned in `text` relative to the
/// article's publication date.
///
/// Explicit dates score high confidence, relative expressions medium, and
/// the absence of any temporal cue falls back to the article date with low
/// confidence.
pub fn parse_temporal(
    text: &str,
    article_date: DateTime<Utc>,
) -> (DateTime<Utc>, TimestampConfidence) {
    if let Some(caps) = ISO_DATE_RE.captures(text) {
        let year: i32 = caps[1].parse().unwrap_or(article_date.year());
        let month: u32 = caps[2].parse().unwrap_or(1);
        let day: u32 = caps[3].parse().unwrap_or(1);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            let ts = Utc
                .from_utc_datetime(&date.and_hms_opt(12, 0, 0).expect("valid time"));
            return (ts, TimestampConfidence::High);
        }
    }

    if let Some(caps) = EXPLICIT_DATE_RE.captures(text) {
        let month = month_number(&caps[1]);
        let day: u32 = caps[2].parse().unwrap_or(1);
        let year: i32 = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(article_date.year());
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            let ts = Utc
                .from_utc_datetime(&date.and_hms_opt(12, 0, 0).expect("valid time"));
            return (ts, TimestampConfidence::High);
        }
    }

    if let Some(caps) = RELATIVE_RE.captures(text) {
        let expr = caps[1].to_lowercase();
        let ts = if expr == "yesterday" || expr == "overnight" {
            article_date - Duration::days(1)
        } else if expr == "last week" {
            article_date - Duration::weeks(1)
        } else if expr == "last month" {
            article_date - Duration::days(30)
        } else if let (Some(n), Some(unit)) = (caps.get(2), caps.get(3)) {
            let n: i64 = n.as_str().parse().unwrap_or(1);
            match unit.as_str().chars().next() {
                Some('h') => article_date - Duration::hours(n),
                Some('w') => article_date - Duration::weeks(n),
                _ => article_date - Duration::days(n),
            }
        } else if let Some(day_name) = caps.get(4) {
            // The most recent such weekday on or before the article date.
            let target = weekday_number(day_name.as_str());
            let mut date = article_date.date_naive();
            while date.weekday() != target {
                date -= Duration::days(1);
            }
            Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).expect("valid time"))
        } else {
            // today / this morning / this evening / tonight
            article_date
        };
        return (ts, TimestampConfidence::Medium);
    }

    (article_date, TimestampConfidence::Low)
}
