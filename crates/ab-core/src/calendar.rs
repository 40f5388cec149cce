//! `<date>` and `<interval>` support.

use chrono::format::{Item, Parsed, StrftimeItems};
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone};

pub const DEFAULT_DATE_FORMAT: &str = "%B %d, %Y";

/// Unit an interval is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalStyle {
    Years,
    Months,
    Weeks,
    Days,
    Hours,
}

impl IntervalStyle {
    pub fn parse(style: &str) -> Option<Self> {
        match style.trim().to_lowercase().as_str() {
            "years" => Some(Self::Years),
            "months" => Some(Self::Months),
            "weeks" => Some(Self::Weeks),
            "days" => Some(Self::Days),
            "hours" => Some(Self::Hours),
            _ => None,
        }
    }
}

fn valid_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Format a timestamp; `None` for an invalid strftime string.
pub fn format_date<Tz: TimeZone>(when: &DateTime<Tz>, format: &str) -> Option<String>
where
    Tz::Offset: std::fmt::Display,
{
    valid_format(format).then(|| when.format(format).to_string())
}

pub fn format_now(format: Option<&str>) -> Option<String> {
    format_date(&Local::now(), format.unwrap_or(DEFAULT_DATE_FORMAT))
}

fn parse_moment(text: &str, format: &str) -> Option<NaiveDateTime> {
    if !valid_format(format) {
        return None;
    }
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .or_else(|| parse_partial_date(text, format))
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// A date whose format leaves out the month or day, such as `%Y`, falls on
/// the first of each.
fn parse_partial_date(text: &str, format: &str) -> Option<NaiveDate> {
    let mut parsed = Parsed::new();
    chrono::format::parse(&mut parsed, text, StrftimeItems::new(format)).ok()?;
    // Fields the text supplied keep their value.
    let _ = parsed.set_month(1);
    let _ = parsed.set_day(1);
    parsed.to_naive_date().ok()
}

/// Whole months from `from` to `to`.
fn months_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    let mut months = (to.year() as i64 - from.year() as i64) * 12 + to.month() as i64
        - from.month() as i64;
    if months > 0 && to.day() < from.day() {
        months -= 1;
    } else if months < 0 && to.day() > from.day() {
        months += 1;
    }
    months
}

/// Length of the span between two dates written in `format`. A missing
/// `from` means the Unix epoch, a missing `to` means now.
pub fn interval(
    style: IntervalStyle,
    format: &str,
    from: Option<&str>,
    to: Option<&str>,
    now: NaiveDateTime,
) -> Option<i64> {
    let from = match from {
        Some(text) => parse_moment(text, format)?,
        None => DateTime::UNIX_EPOCH.naive_utc(),
    };
    let to = match to {
        Some(text) => parse_moment(text, format)?,
        None => now,
    };
    let span = to - from;
    Some(match style {
        IntervalStyle::Years => months_between(from, to) / 12,
        IntervalStyle::Months => months_between(from, to),
        IntervalStyle::Weeks => span.num_weeks(),
        IntervalStyle::Days => span.num_days(),
        IntervalStyle::Hours => span.num_hours(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_format_date() {
        let when = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        assert_eq!(format_date(&when, DEFAULT_DATE_FORMAT).as_deref(), Some("March 05, 2024"));
        assert_eq!(format_date(&when, "%Y").as_deref(), Some("2024"));
    }

    #[test]
    fn test_invalid_format_is_none() {
        let when = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        assert_eq!(format_date(&when, "%Q"), None);
        assert!(format_now(Some("%")).is_none());
    }

    #[test]
    fn test_interval_styles() {
        let now = at(2024, 1, 1);
        let f = "%B %d, %Y";
        let from = Some("March 15, 2000");
        let to = Some("March 14, 2024");
        assert_eq!(interval(IntervalStyle::Years, f, from, to, now), Some(23));
        assert_eq!(interval(IntervalStyle::Months, f, from, to, now), Some(287));
        assert_eq!(
            interval(IntervalStyle::Days, f, Some("January 01, 2024"), Some("January 15, 2024"), now),
            Some(14)
        );
        assert_eq!(
            interval(IntervalStyle::Weeks, f, Some("January 01, 2024"), Some("January 15, 2024"), now),
            Some(2)
        );
    }

    #[test]
    fn test_interval_defaults_to_now() {
        let now = at(2024, 6, 1);
        let got = interval(IntervalStyle::Days, "%Y-%m-%d", Some("2024-05-30"), None, now);
        assert_eq!(got, Some(2));
    }

    #[test]
    fn test_interval_year_only_format() {
        let now = at(2024, 6, 1);
        assert_eq!(interval(IntervalStyle::Years, "%Y", Some("2000"), Some("2010"), now), Some(10));
        assert_eq!(interval(IntervalStyle::Years, "%Y", Some("2000"), None, now), Some(24));
        assert_eq!(
            interval(IntervalStyle::Months, "%B %Y", Some("March 2000"), Some("June 2000"), now),
            Some(3)
        );
    }

    #[test]
    fn test_interval_bad_date() {
        let now = at(2024, 6, 1);
        assert_eq!(interval(IntervalStyle::Days, "%Y-%m-%d", Some("soon"), None, now), None);
    }

    #[test]
    fn test_style_parse() {
        assert_eq!(IntervalStyle::parse("Years"), Some(IntervalStyle::Years));
        assert_eq!(IntervalStyle::parse("fortnights"), None);
    }
}
