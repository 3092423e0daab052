//! Tolerant parsing of review dates.
//!
//! Parsing never fails loudly: anything that does not match a known layout
//! becomes `None`, and the caller stores a null cell.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%Y%m%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d %Y",
];

pub const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a raw review date, returning `None` when no known layout matches.
///
/// Date-only inputs resolve to midnight. Inputs carrying an offset are
/// converted to UTC.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }

    None
}

/// True when the value carries no time-of-day component
pub fn is_midnight(dt: &NaiveDateTime) -> bool {
    dt.time() == NaiveTime::MIN
}

/// Pick the canonical output layout for a whole column of dates.
///
/// A column where every value sits at midnight is written date-only,
/// otherwise every value gets a time component.
pub fn column_format<'a, I>(dates: I) -> &'static str
where
    I: IntoIterator<Item = &'a NaiveDateTime>,
{
    if dates.into_iter().all(is_midnight) {
        DATE_ONLY_FORMAT
    } else {
        DATE_TIME_FORMAT
    }
}
