//! Civic date parsing.
//!
//! Vendors publish wall-clock local times in a dozen formats. Everything
//! parses to a naive [`NaiveDateTime`]; unparseable input yields `None`,
//! never an error, because a bad date on one meeting must not sink a sync.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Formats carrying both date and time.
const DATETIME_FORMATS: &[&str] = &[
    "%B %d, %Y %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%B %d, %Y %H:%M",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%B %d, %Y at %I:%M %p",
    "%A, %B %d, %Y @ %I:%M %p",
    "%A, %B %d, %Y %I:%M %p",
];

/// Date-only formats; midnight is assumed.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%m/%d/%Y", "%A, %B %d, %Y"];

/// Parse a vendor-published date string to a naive local datetime.
pub fn parse_civic_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // ISO 8601 first: with offset/Z the wall-clock portion is kept as-is,
    // matching how the vendors mean it.
    if trimmed.contains('T') || trimmed.matches('-').count() >= 2 {
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(dt.naive_local());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
            return Some(dt);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(dt);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.and_hms_opt(0, 0, 0).expect("midnight is valid"));
        }
    }

    None
}

/// Combine a date-ish string with a separate time-of-day string (Legistar
/// splits EventDate and EventTime). Falls back to the date alone when the
/// time does not parse.
pub fn combine_date_time(date_raw: &str, time_raw: Option<&str>) -> Option<NaiveDateTime> {
    let date = parse_civic_date(date_raw)?;

    let Some(time_raw) = time_raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Some(date);
    };

    for format in ["%I:%M %p", "%H:%M", "%I:%M:%S %p"] {
        if let Ok(time) = NaiveTime::parse_from_str(time_raw, format) {
            return Some(date.date().and_time(time));
        }
    }
    Some(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_iso_with_and_without_zone() {
        let dt = parse_civic_date("2026-02-24T18:00:00").unwrap();
        assert_eq!((dt.year(), dt.hour()), (2026, 18));

        // Z suffix keeps the wall-clock reading.
        let dt = parse_civic_date("2026-02-24T18:00:00Z").unwrap();
        assert_eq!(dt.hour(), 18);
    }

    #[test]
    fn parses_us_formats() {
        let cases = [
            "Feb 24, 2026",
            "February 24, 2026",
            "02/24/2026 6:00 PM",
            "2/24/2026 6:00 PM",
            "Feb 24, 2026 6:00 PM",
            "February 24, 2026 at 6:00 PM",
            "Tuesday, February 24, 2026 @ 6:00 PM",
            "2026-02-24",
        ];
        for case in cases {
            let dt = parse_civic_date(case)
                .unwrap_or_else(|| panic!("failed to parse {case:?}"));
            assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 2, 24), "{case}");
        }
    }

    #[test]
    fn unparseable_dates_return_none() {
        assert_eq!(parse_civic_date(""), None);
        assert_eq!(parse_civic_date("TBD"), None);
        assert_eq!(parse_civic_date("next Tuesday"), None);
    }

    #[test]
    fn combine_date_time_merges_legistar_fields() {
        let dt = combine_date_time("2025-10-01T00:00:00", Some("6:00 PM")).unwrap();
        assert_eq!((dt.hour(), dt.minute()), (18, 0));

        let dt = combine_date_time("2025-10-01T00:00:00", None).unwrap();
        assert_eq!(dt.hour(), 0);

        let dt = combine_date_time("2025-10-01T00:00:00", Some("garbled")).unwrap();
        assert_eq!(dt.hour(), 0, "bad time falls back to the date");
    }
}
