//! String methods. Indices count Unicode scalar values.

use std::rc::Rc;

use super::{StringFn, arg, relative_index, to_integer};
use crate::{
    exception::{RunError, RunResult},
    interp::Interpreter,
    value::Value,
};

pub(super) fn call_static(f: StringFn, args: &[Value]) -> RunResult<Value> {
    match f {
        StringFn::FromCharCode => Ok(Value::from(
            args.iter()
                .map(|v| char::from_u32(u32::from(v.to_number() as u16)).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect::<String>(),
        )),
    }
}

pub(super) fn call_method(interp: &mut Interpreter<'_>, s: &Rc<str>, name: &str, args: &[Value]) -> RunResult<Value> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let slice = |start: usize, end: usize| -> Value {
        if start >= end {
            Value::from("")
        } else {
            Value::from(chars[start..end].iter().collect::<String>())
        }
    };
    Ok(match name {
        "charAt" => {
            let i = to_integer(&arg(args, 0));
            if i < 0.0 || i >= len as f64 {
                Value::from("")
            } else {
                slice(i as usize, i as usize + 1)
            }
        }
        "charCodeAt" | "codePointAt" => {
            let i = to_integer(&arg(args, 0));
            if i < 0.0 || i >= len as f64 {
                if name == "codePointAt" {
                    Value::Undefined
                } else {
                    Value::Number(f64::NAN)
                }
            } else {
                Value::Number(f64::from(u32::from(chars[i as usize])))
            }
        }
        "at" => {
            let i = to_integer(&arg(args, 0));
            let i = if i < 0.0 { i + len as f64 } else { i };
            if i < 0.0 || i >= len as f64 {
                Value::Undefined
            } else {
                slice(i as usize, i as usize + 1)
            }
        }
        "indexOf" => {
            let needle = arg(args, 0).to_js_string();
            let from = clamp(to_integer(&arg(args, 1)), len);
            Value::Number(index_of(&chars, &needle, from).map_or(-1.0, |i| i as f64))
        }
        "lastIndexOf" => {
            let needle: Vec<char> = arg(args, 0).to_js_string().chars().collect();
            let from = match arg(args, 1) {
                Value::Undefined => len,
                v => {
                    let n = v.to_number();
                    if n.is_nan() { len } else { clamp(n.trunc(), len) }
                }
            };
            let last = (0..=from.min(len.saturating_sub(needle.len())))
                .rev()
                .find(|&i| i + needle.len() <= len && chars[i..i + needle.len()] == needle[..]);
            Value::Number(last.map_or(-1.0, |i| i as f64))
        }
        "includes" => {
            let needle = arg(args, 0).to_js_string();
            let from = clamp(to_integer(&arg(args, 1)), len);
            Value::Bool(index_of(&chars, &needle, from).is_some())
        }
        "startsWith" => {
            let needle: Vec<char> = arg(args, 0).to_js_string().chars().collect();
            let pos = clamp(to_integer(&arg(args, 1)), len);
            Value::Bool(chars[pos..].starts_with(&needle))
        }
        "endsWith" => {
            let needle: Vec<char> = arg(args, 0).to_js_string().chars().collect();
            let end = match arg(args, 1) {
                Value::Undefined => len,
                v => clamp(to_integer(&v), len),
            };
            Value::Bool(chars[..end].ends_with(&needle))
        }
        "slice" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let end = relative_index(&arg(args, 1), len, len);
            slice(start, end)
        }
        "substring" => {
            let start = clamp(to_integer(&arg(args, 0)), len);
            let end = match arg(args, 1) {
                Value::Undefined => len,
                v => clamp(to_integer(&v), len),
            };
            slice(start.min(end), start.max(end))
        }
        "substr" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let count = match arg(args, 1) {
                Value::Undefined => len,
                v => to_integer(&v).max(0.0) as usize,
            };
            slice(start, start.saturating_add(count).min(len))
        }
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "padStart" | "padEnd" => {
            let target = to_integer(&arg(args, 0)).max(0.0) as usize;
            let fill = match arg(args, 1) {
                Value::Undefined => " ".to_owned(),
                v => v.to_js_string(),
            };
            if target <= len || fill.is_empty() {
                Value::String(s.clone())
            } else {
                let widest = fill.chars().map(char::len_utf8).max().unwrap_or(1);
                interp.check_large_result((target - len).saturating_mul(widest).saturating_add(s.len()))?;
                let padding: String = fill.chars().cycle().take(target - len).collect();
                if name == "padStart" {
                    Value::from(padding + &**s)
                } else {
                    Value::from(format!("{s}{padding}"))
                }
            }
        }
        "repeat" => {
            let count = to_integer(&arg(args, 0));
            if count < 0.0 || count.is_infinite() {
                return Err(RunError::range_error(format!(
                    "Invalid count value: {}",
                    arg(args, 0).to_js_string()
                )));
            }
            if (count as usize).saturating_mul(s.len()) > 1 << 28 {
                return Err(RunError::range_error("Invalid string length"));
            }
            Value::from(s.repeat(count as usize))
        }
        "split" => {
            let limit = match arg(args, 1) {
                Value::Undefined => usize::MAX,
                v => v.to_number() as u32 as usize,
            };
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Undefined => vec![Value::String(s.clone())],
                sep => {
                    let sep = sep.to_js_string();
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::from(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
            };
            Value::array(parts.into_iter().take(limit).collect())
        }
        "replace" | "replaceAll" => {
            let pattern = arg(args, 0).to_js_string();
            let replacement = arg(args, 1);
            replace(interp, s, &pattern, &replacement, name == "replaceAll")?
        }
        "concat" => {
            let mut out = s.to_string();
            for a in args {
                out.push_str(&a.to_js_string());
            }
            Value::from(out)
        }
        "localeCompare" => {
            let other = arg(args, 0).to_js_string();
            Value::Number(match (**s).cmp(other.as_str()) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            })
        }
        _ => Value::String(s.clone()),
    })
}

fn clamp(n: f64, len: usize) -> usize {
    n.max(0.0).min(len as f64) as usize
}

fn index_of(chars: &[char], needle: &str, from: usize) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return Some(from.min(chars.len()));
    }
    (from..chars.len()).find(|&i| chars[i..].starts_with(&needle))
}

fn replace(
    interp: &mut Interpreter<'_>,
    s: &str,
    pattern: &str,
    replacement: &Value,
    all: bool,
) -> RunResult<Value> {
    let mut out = String::with_capacity(s.len());
    let mut rest_start = 0;
    let matches: Vec<usize> = if pattern.is_empty() {
        vec![0]
    } else if all {
        s.match_indices(pattern).map(|(i, _)| i).collect()
    } else {
        s.find(pattern).into_iter().collect()
    };
    for byte_index in matches {
        out.push_str(&s[rest_start..byte_index]);
        if replacement.is_callable() {
            let offset = s[..byte_index].chars().count() as f64;
            let args = [Value::from(pattern), Value::Number(offset), Value::from(s)];
            let value = interp.call_value(replacement, Value::Undefined, &args)?;
            out.push_str(&value.to_js_string());
        } else {
            expand_replacement(&mut out, &replacement.to_js_string(), pattern, s, byte_index);
        }
        rest_start = byte_index + pattern.len();
    }
    out.push_str(&s[rest_start..]);
    Ok(Value::from(out))
}

/// Expands `$$`, `$&`, `` $` `` and `$'` in a replacement string.
fn expand_replacement(out: &mut String, template: &str, matched: &str, subject: &str, at: usize) {
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => out.push('$'),
            Some('&') => out.push_str(matched),
            Some('`') => out.push_str(&subject[..at]),
            Some('\'') => out.push_str(&subject[at + matched.len()..]),
            _ => {
                out.push('$');
                continue;
            }
        }
        chars.next();
    }
}
