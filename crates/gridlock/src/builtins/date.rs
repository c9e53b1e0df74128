//! `Date`, in UTC.
//!
//! A date is its millisecond timestamp; NaN is an invalid date. There is no local time zone:
//! local getters report UTC and `getTimezoneOffset()` is always zero.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

use super::{DateFn, arg};
use crate::{
    exception::{RunError, RunResult},
    value::Value,
};

/// Largest representable time value, in milliseconds either side of the epoch.
const MAX_TIME: f64 = 8.64e15;

const MS_PER_DAY: f64 = 86_400_000.0;

pub(crate) fn to_iso_string(ms: f64) -> Option<String> {
    let dt = to_datetime(ms)?;
    Some(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

pub(crate) fn to_display_string(ms: f64) -> String {
    match to_datetime(ms) {
        Some(dt) => dt
            .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
            .to_string(),
        None => "Invalid Date".to_owned(),
    }
}

fn to_datetime(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(ms as i64)
}

fn now() -> f64 {
    Utc::now().timestamp_millis() as f64
}

fn time_clip(ms: f64) -> f64 {
    if !ms.is_finite() || ms.abs() > MAX_TIME {
        f64::NAN
    } else {
        ms.trunc() + 0.0
    }
}

/// Days since the epoch for a proleptic Gregorian date; `month` is 1-based.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// `Date.UTC`-style construction; out-of-range components carry into the next unit.
fn make_time(parts: &[f64]) -> f64 {
    if parts.iter().any(|p| !p.is_finite()) {
        return f64::NAN;
    }
    let component = |i: usize, default: f64| parts.get(i).map_or(default, |v| v.trunc());
    let mut year = component(0, f64::NAN);
    if (0.0..=99.0).contains(&year) {
        year += 1900.0;
    }
    let month = component(1, 0.0);
    let year = year + (month / 12.0).floor();
    let month = month.rem_euclid(12.0);
    if year.abs() > 400_000.0 {
        return f64::NAN;
    }
    let days = days_from_civil(year as i64, month as i64 + 1, 1) as f64 + component(2, 1.0) - 1.0;
    let time = component(3, 0.0) * 3_600_000.0 + component(4, 0.0) * 60_000.0 + component(5, 0.0) * 1000.0
        + component(6, 0.0);
    time_clip(days * MS_PER_DAY + time)
}

/// Parses ISO 8601 and a few common human formats. Strings without an offset are UTC.
fn parse(s: &str) -> f64 {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return dt.timestamp_millis() as f64;
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return dt.and_utc().timestamp_millis() as f64;
        }
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%b %d %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map_or(f64::NAN, |dt| dt.and_utc().timestamp_millis() as f64);
        }
    }
    if let Ok(year) = s.parse::<i32>()
        && let Some(date) = NaiveDate::from_ymd_opt(year, 1, 1)
        && let Some(dt) = date.and_hms_opt(0, 0, 0)
    {
        return dt.and_utc().timestamp_millis() as f64;
    }
    f64::NAN
}

/// `new Date(...)`, or `Date()` which returns the current time as a string.
pub(super) fn construct(args: &[Value], construct: bool) -> Value {
    if !construct {
        return Value::from(to_display_string(now()));
    }
    let ms = match args {
        [] => now(),
        [Value::Date(ms)] => *ms,
        [Value::String(s)] => parse(s),
        [single] => time_clip(single.to_number()),
        parts => make_time(&parts.iter().map(Value::to_number).collect::<Vec<_>>()),
    };
    Value::Date(ms)
}

pub(super) fn call_static(f: DateFn, args: &[Value]) -> Value {
    match f {
        DateFn::Now => Value::Number(now()),
        DateFn::Parse => Value::Number(parse(&arg(args, 0).to_js_string())),
    }
}

pub(super) fn call_method(ms: f64, name: &str, _args: &[Value]) -> RunResult<Value> {
    let Some(dt) = to_datetime(ms) else {
        return Ok(match name {
            "toISOString" => return Err(RunError::range_error("Invalid time value")),
            "toJSON" => Value::Null,
            "toString" | "toDateString" | "toLocaleDateString" => Value::from("Invalid Date"),
            _ => Value::Number(f64::NAN),
        });
    };
    let n = |v: u32| Value::Number(f64::from(v));
    Ok(match name {
        "getTime" | "valueOf" => Value::Number(ms),
        "getFullYear" | "getUTCFullYear" => Value::Number(f64::from(dt.year())),
        "getMonth" | "getUTCMonth" => n(dt.month0()),
        "getDate" | "getUTCDate" => n(dt.day()),
        "getDay" | "getUTCDay" => n(dt.weekday().num_days_from_sunday()),
        "getHours" | "getUTCHours" => n(dt.hour()),
        "getMinutes" | "getUTCMinutes" => n(dt.minute()),
        "getSeconds" | "getUTCSeconds" => n(dt.second()),
        "getMilliseconds" | "getUTCMilliseconds" => n(dt.timestamp_subsec_millis()),
        "getTimezoneOffset" => Value::Number(0.0),
        "toISOString" | "toJSON" => Value::from(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
        "toDateString" => Value::from(dt.format("%a %b %d %Y").to_string()),
        "toLocaleDateString" => Value::from(format!("{}/{}/{}", dt.month(), dt.day(), dt.year())),
        _ => Value::from(to_display_string(ms)),
    })
}
