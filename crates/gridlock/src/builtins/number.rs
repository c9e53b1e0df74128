use std::fmt::Write as _;

use super::{GlobalFn, NumberFn, arg, to_integer};
use crate::{
    exception::{RunError, RunResult},
    value::{Value, number_to_string},
};

pub(super) fn call_global(f: GlobalFn, args: &[Value]) -> RunResult<Value> {
    let n = match f {
        GlobalFn::ParseInt => parse_int(&arg(args, 0).to_js_string(), &arg(args, 1)),
        GlobalFn::ParseFloat => parse_float(&arg(args, 0).to_js_string()),
        GlobalFn::IsNaN => return Ok(Value::Bool(arg(args, 0).to_number().is_nan())),
        GlobalFn::IsFinite => return Ok(Value::Bool(arg(args, 0).to_number().is_finite())),
    };
    Ok(Value::Number(n))
}

/// `Number.isInteger` and friends do not coerce: non-numbers are always `false`.
pub(super) fn call_number_fn(f: NumberFn, args: &[Value]) -> Value {
    let Value::Number(n) = arg(args, 0) else {
        return Value::Bool(false);
    };
    Value::Bool(match f {
        NumberFn::IsInteger => n.is_finite() && n.trunc() == n,
        NumberFn::IsSafeInteger => n.is_finite() && n.trunc() == n && n.abs() <= 9_007_199_254_740_991.0,
        NumberFn::IsFinite => n.is_finite(),
        NumberFn::IsNaN => n.is_nan(),
    })
}

pub(super) fn call_method(n: f64, name: &str, args: &[Value]) -> RunResult<Value> {
    let out = match name {
        "toFixed" => {
            let digits = to_integer(&arg(args, 0));
            if !(0.0..=100.0).contains(&digits) {
                return Err(RunError::range_error("toFixed() digits argument must be between 0 and 100"));
            }
            to_fixed(n, digits as usize)
        }
        "toString" => match arg(args, 0) {
            Value::Undefined => number_to_string(n),
            radix => {
                let radix = to_integer(&radix);
                if !(2.0..=36.0).contains(&radix) {
                    return Err(RunError::range_error("toString() radix must be between 2 and 36"));
                }
                to_radix_string(n, radix as u32)
            }
        },
        "toPrecision" => match arg(args, 0) {
            Value::Undefined => number_to_string(n),
            precision => {
                let precision = to_integer(&precision);
                if !(1.0..=100.0).contains(&precision) {
                    return Err(RunError::range_error("toPrecision() argument must be between 1 and 100"));
                }
                to_precision(n, precision as usize)
            }
        },
        "toLocaleString" => to_locale_string(n),
        _ => return Ok(Value::Number(n)),
    };
    Ok(Value::from(out))
}

fn parse_int(s: &str, radix: &Value) -> f64 {
    let s = s.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut radix = to_integer(radix) as u32;
    let mut digits = s;
    if (radix == 0 || radix == 16) && (s.starts_with("0x") || s.starts_with("0X")) {
        digits = &s[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut value = 0.0;
    let mut any = false;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        value = value * f64::from(radix) + f64::from(d);
        any = true;
    }
    if !any {
        return f64::NAN;
    }
    if negative { -value } else { value }
}

/// Parses the longest numeric prefix, as `parseFloat` does.
fn parse_float(s: &str) -> f64 {
    let s = s.trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if s.starts_with(prefix) {
            return f64::INFINITY;
        }
    }
    if s.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return f64::NAN;
    }
    // optional exponent, only if followed by digits
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    s[..end].parse().unwrap_or(f64::NAN)
}

fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() || n.abs() >= 1e21 {
        return number_to_string(n);
    }
    let scale = 10f64.powi(digits as i32);
    let scaled = n.abs() * scale;
    // ties round away from zero
    if scaled < 9_007_199_254_740_992.0 && scaled.fract() == 0.5 {
        let rounded = (scaled.floor() + 1.0) / scale;
        return format!("{:.*}", digits, rounded.copysign(n));
    }
    let out = format!("{n:.digits$}");
    if out.starts_with('-') && out[1..].chars().all(|c| c == '0' || c == '.') {
        return out[1..].to_owned();
    }
    out
}

fn to_radix_string(n: f64, radix: u32) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    let abs = n.abs();
    let mut int = abs.trunc();
    let mut digits = Vec::new();
    loop {
        let d = (int % f64::from(radix)) as u32;
        digits.push(char::from_digit(d, radix).unwrap_or('0'));
        int = (int / f64::from(radix)).trunc();
        if int < 1.0 {
            break;
        }
    }
    out.extend(digits.iter().rev());
    let mut frac = abs.fract();
    if frac > 0.0 {
        out.push('.');
        for _ in 0..20 {
            frac *= f64::from(radix);
            let d = frac.trunc() as u32;
            out.push(char::from_digit(d, radix).unwrap_or('0'));
            frac = frac.fract();
            if frac == 0.0 {
                break;
            }
        }
    }
    out
}

fn to_precision(n: f64, precision: usize) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    if n == 0.0 {
        return if precision > 1 {
            format!("0.{}", "0".repeat(precision - 1))
        } else {
            "0".to_owned()
        };
    }
    let exponent = n.abs().log10().floor() as i32;
    if exponent < -6 || exponent >= precision as i32 {
        let formatted = format!("{:.*e}", precision - 1, n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if exp.starts_with('-') => format!("{mantissa}e{exp}"),
            Some((mantissa, exp)) => format!("{mantissa}e+{exp}"),
            None => formatted,
        };
    }
    let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
    format!("{n:.decimals$}")
}

/// en-US grouping with at most three fraction digits, e.g. `1,234.568`.
fn to_locale_string(n: f64) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    let fixed = to_fixed(n, 3);
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let mut out = String::from(sign);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    let frac = frac.trim_end_matches('0');
    if !frac.is_empty() {
        let _ = write!(out, ".{frac}");
    }
    out
}
