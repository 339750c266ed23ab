//! Loose timestamp parsing and day ranges.
//!
//! Stored timestamps are RFC 3339 with millisecond precision and an explicit
//! offset. Input is accepted in the looser shapes people and agents actually
//! send: with or without `T`, with or without fractional seconds, `+0800` or
//! `+08:00`, or no offset at all (the configured offset is assumed).

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, SubsecRound, TimeDelta,
    TimeZone, Utc,
};

use crate::error::{Error, Result};

const STORED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Parse `Z`, `UTC`, `+08`, `+0800` or `+08:00`.
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(utc());
    }
    let invalid = || Error::validation(format!("invalid UTC offset: {s:?}"));

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        2 => (&digits[..2], "0"),
        4 => (&digits[..2], &digits[2..]),
        _ => return Err(invalid()),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

pub fn utc() -> FixedOffset {
    Utc.fix()
}

/// Current time in `offset`, truncated to milliseconds.
pub fn now(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset).trunc_subsecs(3)
}

pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format(STORED_FORMAT).to_string()
}

/// Parse a timestamp in any accepted shape. Naive input is read in `default_offset`;
/// a bare date means midnight.
pub fn parse_loose(input: &str, default_offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::validation("empty timestamp"));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.trunc_subsecs(3));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Ok(ts.trunc_subsecs(3));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return localize(naive, default_offset);
        }
    }
    if let Some(date) = parse_date_only(s) {
        return localize(date.and_time(NaiveTime::MIN), default_offset);
    }

    Err(Error::validation(format!("unrecognized timestamp: {input:?}")))
}

fn parse_date_only(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn localize(naive: NaiveDateTime, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|ts| ts.trunc_subsecs(3))
        .ok_or_else(|| Error::validation(format!("timestamp out of range: {naive}")))
}

/// The calendar day `input` names. A full timestamp names the day in its own offset.
pub fn parse_day(input: &str, default_offset: FixedOffset) -> Result<NaiveDate> {
    let s = input.trim();
    match parse_date_only(s) {
        Some(date) => Ok(date),
        None => parse_loose(s, default_offset).map(|ts| ts.date_naive()),
    }
}

/// Inclusive bounds of `date` in `offset`: 00:00:00.000 through 23:59:59.999.
pub fn day_range(
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let start = localize(date.and_time(NaiveTime::MIN), offset)?;
    let end = start + TimeDelta::days(1) - TimeDelta::milliseconds(1);
    Ok((start, end))
}

/// Serde adapter: stored format out, loose parsing (UTC default) in.
pub mod serde_timestamp {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<FixedOffset>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_loose(&raw, super::utc()).map_err(serde::de::Error::custom)
    }
}
