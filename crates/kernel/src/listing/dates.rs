//! Date format resolution.
//!
//! Dates arrive as free-form strings. Each pattern below is tried in order and
//! the first one that parses wins; the result is read as UTC.

use chrono::format::{Parsed, StrftimeItems, parse};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{ListError, ListOpResult};

/// How much of a timestamp a pattern carries.
#[derive(Debug, Clone, Copy)]
enum Precision {
    /// Calendar day only; time is midnight.
    Date,
    /// Date plus hour; minutes are zero.
    Hour,
    /// Date plus at least hours and minutes.
    Full,
}

/// Ordered pattern list. Day-first forms come before ISO forms, and the
/// bare `YYYY-MM-DD` form comes last.
const DATE_PATTERNS: &[(&str, Precision)] = &[
    ("%d-%m-%Y", Precision::Date),
    ("%d/%m/%Y", Precision::Date),
    ("%d-%b-%y", Precision::Date),
    ("%d-%b-%Y", Precision::Date),
    ("%Y-%m-%dT%H:%M:%S%.fZ", Precision::Full),
    ("%Y-%m-%dT%H:%M:%S%.f", Precision::Full),
    ("%Y-%m-%dT%H:%M:%S", Precision::Full),
    ("%Y-%m-%dT%H:%M", Precision::Full),
    ("%Y-%m-%dT%H", Precision::Hour),
    ("%Y-%m-%d", Precision::Date),
];

/// Parse `text` with the first matching pattern, normalized to UTC.
pub fn parse_date(text: &str) -> ListOpResult<DateTime<Utc>> {
    DATE_PATTERNS
        .iter()
        .find_map(|(pattern, precision)| parse_with(text, pattern, *precision))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ListError::InvalidDateFormat(text.to_string()))
}

fn parse_with(text: &str, pattern: &str, precision: Precision) -> Option<NaiveDateTime> {
    match precision {
        Precision::Date => NaiveDate::parse_from_str(text, pattern)
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN)),
        Precision::Hour => {
            let mut parsed = Parsed::new();
            parse(&mut parsed, text, StrftimeItems::new(pattern)).ok()?;
            parsed.set_minute(0).ok()?;
            parsed.to_naive_datetime_with_offset(0).ok()
        }
        Precision::Full => NaiveDateTime::parse_from_str(text, pattern).ok(),
    }
}

/// Whether `instant` sits exactly on midnight, i.e. it came from a date-only input.
pub fn is_midnight(instant: &DateTime<Utc>) -> bool {
    instant.time() == NaiveTime::MIN
}

/// Last representable microsecond of `instant`'s calendar day.
pub fn end_of_day(instant: &DateTime<Utc>) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
    instant.date_naive().and_time(last).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn day_first_with_dashes() {
        assert_eq!(parse_date("01-12-2025").unwrap(), ymd(2025, 12, 1));
    }

    #[test]
    fn day_first_with_slashes_and_no_padding() {
        assert_eq!(parse_date("5/1/2025").unwrap(), ymd(2025, 1, 5));
        assert_eq!(parse_date("05/01/2025").unwrap(), ymd(2025, 1, 5));
    }

    #[test]
    fn month_abbreviations() {
        assert_eq!(parse_date("5-Jan-25").unwrap(), ymd(2025, 1, 5));
        assert_eq!(parse_date("05-Jan-2025").unwrap(), ymd(2025, 1, 5));
    }

    #[test]
    fn bare_iso_date() {
        assert_eq!(parse_date("2025-01-05").unwrap(), ymd(2025, 1, 5));
    }

    #[test]
    fn iso_with_fraction_and_zulu() {
        let parsed = parse_date("2025-01-05T10:20:30.250Z").unwrap();
        assert_eq!(parsed.hour(), 10);
        assert_eq!(parsed.second(), 30);
        assert_eq!(parsed.nanosecond(), 250_000_000);
    }

    #[test]
    fn iso_without_seconds_or_minutes() {
        let minutes = parse_date("2025-01-05T10:20").unwrap();
        assert_eq!((minutes.hour(), minutes.minute()), (10, 20));

        let hour = parse_date("2025-01-05T10").unwrap();
        assert_eq!((hour.hour(), hour.minute()), (10, 0));
        assert_eq!(hour.day(), 5);
    }

    #[test]
    fn unrecognized_input_fails() {
        for bad in ["", "yesterday", "2025/01/05", "32-01-2025", "2025-13-01"] {
            assert!(
                matches!(parse_date(bad), Err(ListError::InvalidDateFormat(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn midnight_detection_and_widening() {
        let day = ymd(2025, 1, 5);
        assert!(is_midnight(&day));

        let widened = end_of_day(&day);
        assert!(!is_midnight(&widened));
        assert_eq!(widened.to_rfc3339(), "2025-01-05T23:59:59.999999+00:00");
    }
}
