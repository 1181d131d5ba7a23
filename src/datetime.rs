//! Date and time formatting helpers

use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt::Display;

/// Format used by [`datetimestr`] when none is given
pub const DEFAULT_DATETIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

const DURATION_UNITS: [(&str, i64); 5] = [
    ("W", 60 * 60 * 24 * 7),
    ("D", 60 * 60 * 24),
    ("H", 60 * 60),
    ("m", 60),
    ("s", 1),
];

/// Format a Unix timestamp in local time
///
/// `ts` may be seconds or, when its text is longer than 10 characters,
/// milliseconds. Fractional values are truncated. Anything that is not a
/// number yields an empty string.
///
/// ```
/// # use utilkit::datetime::datetimestr;
/// assert_eq!(datetimestr("not a number", None), "");
/// assert_eq!(datetimestr(0, Some("%Y")).len(), 4);
/// assert_eq!(datetimestr(1.5, Some("%s")), "1");
/// ```
pub fn datetimestr<T: Display>(ts: T, fmt: Option<&str>) -> String {
    let text = ts.to_string();
    let Some(mut seconds) = parse_timestamp(text.trim()) else {
        return String::new();
    };
    if text.len() > 10 {
        seconds /= 1000;
    }

    match Local.timestamp_opt(seconds, 0).single() {
        Some(dt) => dt.format(fmt.unwrap_or(DEFAULT_DATETIME_FORMAT)).to_string(),
        None => String::new(),
    }
}

fn parse_timestamp(text: &str) -> Option<i64> {
    if let Ok(seconds) = text.parse::<i64>() {
        return Some(seconds);
    }
    let seconds = text.parse::<f64>().ok()?.trunc();
    (seconds.is_finite() && seconds.abs() < i64::MAX as f64).then_some(seconds as i64)
}

/// Current local time as `YYYYmmddHHMMSS`
pub fn ymdhms() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Current Unix time in milliseconds
pub fn timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn utc_to_local(utc: DateTime<Utc>) -> DateTime<Local> {
    utc.with_timezone(&Local)
}

/// Human readable duration such as `1H,1m,30s`
///
/// Negative input is `unknown`; zero is `0s`.
pub fn pretty_duration(seconds: i64) -> String {
    if seconds < 0 {
        return "unknown".to_string();
    }
    if seconds == 0 {
        return "0s".to_string();
    }

    let mut remaining = seconds;
    let mut parts = Vec::new();
    for (unit, div) in DURATION_UNITS {
        let amount = remaining / div;
        remaining %= div;
        if amount > 0 {
            parts.push(format!("{}{}", amount, unit));
        }
    }
    parts.join(",")
}
