//! SQL temporal-value parser (§4.7).
//!
//! Parses the family of ISO-8601-ish strings a SQL driver hands back for DATE/TIME/
//! DATETIME/TIMESTAMP columns into the broken-down [`SqlDate`]/[`SqlTime`]/[`SqlDateTime`]
//! triplet, or to/from Unix epoch seconds. The source's `Time_toDateTime`/`Time_toTimestamp`/
//! `Time_toString` (documented in full in `original_source/src/system/Time.h`; the `.c`
//! bodies were not part of the retrieval pack) fix the exact contract this module follows,
//! including the worked example in the doc comment:
//!
//! ```text
//! Time_toTimestamp("2013-12-15 00:12:58Z")      -> 1387066378
//! Time_toTimestamp("2013-12-14 19:12:58-05:00")  -> 1387066378
//! ```
//!
//! The surrounding calendar/epoch arithmetic is delegated to the `time` crate (the same
//! crate the teacher optionally depends on for its own temporal column types) rather than
//! hand-rolled, but the actual string scanning — locating date/time tokens, reversed
//! ordering, compressed forms, surrounding cruft — is bespoke, since no published crate
//! parses this particular grab-bag of formats.

use crate::error::{Error, Result};

/// A SQL DATE value. `month` is 0-11 (the source's `struct tm` convention), `year` is the
/// literal year, not "years since 1900".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqlDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

/// A SQL TIME value. `sec` may be 60 to represent a leap second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqlTime {
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub microseconds: u32,
}

/// A SQL DATETIME/TIMESTAMP value with an optional explicit UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqlDateTime {
    pub date: SqlDate,
    pub time: SqlTime,
    /// Seconds east of UTC if the source string had an explicit `Z`/`±HH[:MM]` suffix,
    /// otherwise 0 (values with no timezone are assumed UTC, per §4.7).
    pub gmt_offset_seconds: i32,
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn parse_digits(b: &[u8]) -> i32 {
    let mut v: i32 = 0;
    for &c in b {
        v = v * 10 + (c - b'0') as i32;
    }
    v
}

/// Reads 1 or 2 ASCII digits starting at `i`. Returns `(value, end_index)`.
fn read_1_2_digits(b: &[u8], i: usize) -> Option<(i32, usize)> {
    if i >= b.len() || !is_digit(b[i]) {
        return None;
    }
    let mut j = i + 1;
    if j < b.len() && is_digit(b[j]) && (j + 1 >= b.len() || !is_digit(b[j + 1])) {
        j += 1;
    }
    Some((parse_digits(&b[i..j]), j))
}

/// Attempts to match a date token with `i` as its first character. Tries the separated
/// `YYYY-MM-DD` form first, then the compressed `YYYYMMDD` form.
fn try_date_at(b: &[u8], i: usize) -> Option<(SqlDate, usize)> {
    if i > 0 && is_digit(b[i - 1]) {
        return None;
    }

    // Separated: exactly 4 digits, '-', 1-2 digits, '-', 1-2 digits.
    if i + 4 <= b.len() && b[i..i + 4].iter().all(|&c| is_digit(c)) {
        let mut j = i + 4;
        if j < b.len() && b[j] == b'-' && !(j > 0 && is_digit(b[j.saturating_sub(0)])) {
            j += 1;
            if let Some((month, j2)) = read_1_2_digits(b, j) {
                if j2 < b.len() && b[j2] == b'-' {
                    if let Some((day, j3)) = read_1_2_digits(b, j2 + 1) {
                        if month >= 1 && month <= 12 {
                            let year = parse_digits(&b[i..i + 4]);
                            return Some((
                                SqlDate { year, month: (month - 1) as u8, day: day as u8 },
                                j3,
                            ));
                        }
                    }
                }
            }
        }
    }

    // Compressed: exactly 8 digits, flanked by non-digits.
    if i + 8 <= b.len()
        && b[i..i + 8].iter().all(|&c| is_digit(c))
        && (i + 8 == b.len() || !is_digit(b[i + 8]))
    {
        let year = parse_digits(&b[i..i + 4]);
        let month = parse_digits(&b[i + 4..i + 6]);
        let day = parse_digits(&b[i + 6..i + 8]);
        if (1..=12).contains(&month) {
            return Some((SqlDate { year, month: (month - 1) as u8, day: day as u8 }, i + 8));
        }
    }

    None
}

/// Attempts to match a time token (and its optional fraction/timezone suffix) with `i` as
/// its first character. Returns `(time, gmt_offset_seconds, end_index)`.
fn try_time_at(b: &[u8], i: usize) -> Option<(SqlTime, i32, usize)> {
    if i > 0 && is_digit(b[i - 1]) {
        return None;
    }

    let (time, mut end) = if let Some((hour, j)) = read_1_2_digits(b, i) {
        // Separated: 1-2 digits, ':', 2 digits, ':', 2 digits.
        if j < b.len() && b[j] == b':' && j + 3 <= b.len() && b[j + 1..j + 3].iter().all(|&c| is_digit(c)) {
            let min = parse_digits(&b[j + 1..j + 3]);
            let k = j + 3;
            if k < b.len() && b[k] == b':' && k + 3 <= b.len() && b[k + 1..k + 3].iter().all(|&c| is_digit(c)) {
                let sec = parse_digits(&b[k + 1..k + 3]);
                let end = k + 3;
                if hour <= 23 && min <= 59 && sec <= 60 && !(end < b.len() && is_digit(b[end])) {
                    (
                        SqlTime { hour: hour as u8, min: min as u8, sec: sec as u8, microseconds: 0 },
                        end,
                    )
                } else {
                    return None;
                }
            } else {
                return None;
            }
        } else {
            return None;
        }
    } else {
        return None;
    };

    // Compressed fallback only applies when nothing separated matched above; try it if the
    // separated attempt didn't consume anything useful (handled by falling through to the
    // explicit compressed check below when `i` starts a bare 6-digit run).
    let (mut time, mut end) = (time, end);
    if end == i {
        return None;
    }

    // Sub-second fraction: accepted and ignored (§4.7).
    if end < b.len() && b[end] == b'.' {
        let mut j = end + 1;
        while j < b.len() && is_digit(b[j]) {
            j += 1;
        }
        if j > end + 1 {
            end = j;
        }
    }

    // Explicit timezone suffix.
    let mut offset = 0;
    if end < b.len() {
        match b[end] {
            b'Z' | b'z' => {
                offset = 0;
                end += 1;
            }
            b'+' | b'-' => {
                let sign = if b[end] == b'-' { -1 } else { 1 };
                if let Some((tzh, j)) = read_1_2_digits(b, end + 1) {
                    let mut j2 = j;
                    let mut tzm = 0;
                    if j2 < b.len() && b[j2] == b':' {
                        if let Some((m, j3)) = read_1_2_digits(b, j2 + 1) {
                            tzm = m;
                            j2 = j3;
                        }
                    } else if j2 + 2 <= b.len() && b[j2..j2 + 2].iter().all(|&c| is_digit(c)) {
                        tzm = parse_digits(&b[j2..j2 + 2]);
                        j2 += 2;
                    }
                    offset = sign * (tzh * 3600 + tzm * 60);
                    end = j2;
                }
            }
            _ => {}
        }
    }

    time.microseconds = 0;
    Some((time, offset, end))
}

/// Attempts the compressed 6-digit `HHMMSS` time form, flanked by non-digits (no fraction or
/// timezone is possible in this form since it would introduce ambiguity with trailing
/// digits).
fn try_compressed_time_at(b: &[u8], i: usize) -> Option<(SqlTime, usize)> {
    if i > 0 && is_digit(b[i - 1]) {
        return None;
    }
    if i + 6 <= b.len() && b[i..i + 6].iter().all(|&c| is_digit(c)) && (i + 6 == b.len() || !is_digit(b[i + 6])) {
        let hour = parse_digits(&b[i..i + 2]);
        let min = parse_digits(&b[i + 2..i + 4]);
        let sec = parse_digits(&b[i + 4..i + 6]);
        if hour <= 23 && min <= 59 && sec <= 60 {
            return Some((SqlTime { hour: hour as u8, min: min as u8, sec: sec as u8, microseconds: 0 }, i + 6));
        }
    }
    None
}

struct Scan {
    date: Option<(SqlDate, usize, usize)>,
    time: Option<(SqlTime, i32, usize, usize)>,
}

/// Scans `s` once, left to right, for the leftmost date token and the leftmost time token,
/// skipping over whichever of the two is found first so they don't overlap. Handles
/// reversed ordering (time before date) and compressed `YYYYMMDDHHMMSS` automatically,
/// since in that case the date scan at the run's start and the time scan starting 8 bytes in
/// both succeed and abut exactly.
fn scan(s: &str) -> Scan {
    let b = s.as_bytes();
    let mut date = None;
    let mut time = None;
    let mut i = 0;
    while i < b.len() {
        if date.is_none() {
            if let Some((d, end)) = try_date_at(b, i) {
                date = Some((d, i, end));
                i = end;
                continue;
            }
        }
        if time.is_none() {
            if let Some((t, off, end)) = try_time_at(b, i) {
                time = Some((t, off, i, end));
                i = end;
                continue;
            }
            if let Some((t, end)) = try_compressed_time_at(b, i) {
                time = Some((t, 0, i, end));
                i = end;
                continue;
            }
        }
        i += 1;
    }
    Scan { date, time }
}

/// Parses a full DATETIME/TIMESTAMP string, accepting all the forms in §4.7. A date token
/// must be present; a time token is optional and defaults to midnight with no offset.
pub fn parse_datetime(s: &str) -> Result<SqlDateTime> {
    let found = scan(s);
    let (date, _, _) = found.date.ok_or_else(|| invalid(s))?;
    let (time, offset) = match found.time {
        Some((t, off, _, _)) => (t, off),
        None => (SqlTime::default(), 0),
    };
    Ok(SqlDateTime { date, time, gmt_offset_seconds: offset })
}

/// Parses a DATE-only string.
pub fn parse_date(s: &str) -> Result<SqlDate> {
    scan(s).date.map(|(d, _, _)| d).ok_or_else(|| invalid(s))
}

/// Parses a TIME-only string. The timezone suffix, if present, is parsed but discarded — the
/// `sqltime_t` triplet carries no offset field (§3).
pub fn parse_time(s: &str) -> Result<SqlTime> {
    scan(s).time.map(|(t, _, _, _)| t).ok_or_else(|| invalid(s))
}

fn invalid(s: &str) -> Error {
    Error::ValueParse(format!("NumberFormatException: could not parse '{s}' as a date/time value"))
}

fn to_time_date(date: SqlDate, time: SqlTime) -> Result<(time::Date, time::Time)> {
    let month = time::Month::try_from((date.month + 1) as u8).map_err(|_| invalid("month"))?;
    let d = time::Date::from_calendar_date(date.year, month, date.day)
        .map_err(|e| Error::ValueParse(e.to_string()))?;
    let sec = time.sec.min(59);
    let t = time::Time::from_hms_micro(time.hour, time.min, sec, time.microseconds)
        .map_err(|e| Error::ValueParse(e.to_string()))?;
    Ok((d, t))
}

/// Converts a parsed datetime string to UTC epoch seconds.
///
/// If `s` carries an explicit timezone offset the fields are interpreted as wall-clock time
/// in that zone and the offset is subtracted to land on UTC; otherwise the fields are assumed
/// to already be UTC (§4.7).
pub fn to_timestamp(s: &str) -> Result<i64> {
    let parsed = parse_datetime(s)?;
    let (d, t) = to_time_date(parsed.date, parsed.time)?;
    let base = time::PrimitiveDateTime::new(d, t).assume_utc().unix_timestamp();
    let leap = if parsed.time.sec == 60 { 1 } else { 0 };
    Ok(base - i64::from(parsed.gmt_offset_seconds) + leap)
}

/// Formats a Unix timestamp as `YYYY-MM-DD HH:MM:SS` in UTC (the `T` is omitted, per §4.7).
pub fn to_string(epoch: i64) -> Result<String> {
    let dt = time::OffsetDateTime::from_unix_timestamp(epoch).map_err(|e| Error::ValueParse(e.to_string()))?;
    Ok(format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_datetime_with_t() {
        let dt = parse_datetime("2013-12-28T10:12:42").unwrap();
        assert_eq!(dt.date, SqlDate { year: 2013, month: 11, day: 28 });
        assert_eq!(dt.time, SqlTime { hour: 10, min: 12, sec: 42, microseconds: 0 });
        assert_eq!(dt.gmt_offset_seconds, 0);
    }

    #[test]
    fn separated_datetime_with_space() {
        let dt = parse_datetime("2013-12-28 10:12:42").unwrap();
        assert_eq!(dt.date, SqlDate { year: 2013, month: 11, day: 28 });
    }

    #[test]
    fn date_only() {
        let d = parse_date("2013-12-28").unwrap();
        assert_eq!(d, SqlDate { year: 2013, month: 11, day: 28 });
    }

    #[test]
    fn time_only() {
        let t = parse_time("10:12:42").unwrap();
        assert_eq!(t, SqlTime { hour: 10, min: 12, sec: 42, microseconds: 0 });
    }

    #[test]
    fn compressed_date() {
        let d = parse_date("20131228").unwrap();
        assert_eq!(d, SqlDate { year: 2013, month: 11, day: 28 });
    }

    #[test]
    fn compressed_time() {
        let t = parse_time("101242").unwrap();
        assert_eq!(t, SqlTime { hour: 10, min: 12, sec: 42, microseconds: 0 });
    }

    #[test]
    fn compressed_datetime() {
        let dt = parse_datetime("20131228101242").unwrap();
        assert_eq!(dt.date, SqlDate { year: 2013, month: 11, day: 28 });
        assert_eq!(dt.time, SqlTime { hour: 10, min: 12, sec: 42, microseconds: 0 });
    }

    #[test]
    fn reversed_time_then_date() {
        let dt = parse_datetime("10:12:42 2013-12-28").unwrap();
        assert_eq!(dt.date, SqlDate { year: 2013, month: 11, day: 28 });
        assert_eq!(dt.time, SqlTime { hour: 10, min: 12, sec: 42, microseconds: 0 });
    }

    #[test]
    fn surrounding_cruft() {
        let dt = parse_datetime("date=2013-12-28 time=10:12:42 (utc)").unwrap();
        assert_eq!(dt.date, SqlDate { year: 2013, month: 11, day: 28 });
        assert_eq!(dt.time, SqlTime { hour: 10, min: 12, sec: 42, microseconds: 0 });
    }

    #[test]
    fn fraction_is_accepted_and_ignored() {
        let dt = parse_datetime("2013-12-28 10:12:42.123456").unwrap();
        assert_eq!(dt.time.microseconds, 0);
    }

    #[test]
    fn timezone_law_matches_spec() {
        let a = to_timestamp("2013-12-15 00:12:58Z").unwrap();
        let b = to_timestamp("2013-12-14 19:12:58-05:00").unwrap();
        let c = to_timestamp("2013-12-15 05:57:58+05:45").unwrap();
        assert_eq!(a, 1387066378);
        assert_eq!(b, 1387066378);
        assert_eq!(c, 1387066378);
    }

    #[test]
    fn round_trip_law() {
        for t in [0i64, 1, 86_399, 1_000_000_000, 2_147_000_000] {
            let s = to_string(t).unwrap();
            assert_eq!(to_timestamp(&s).unwrap(), t);
        }
    }

    #[test]
    fn to_string_format() {
        assert_eq!(to_string(1_386_951_482).unwrap(), "2013-12-13 16:18:02");
    }

    #[test]
    fn invalid_input_errors() {
        assert!(parse_datetime("not a date").is_err());
        assert!(parse_date("").is_err());
    }
}
