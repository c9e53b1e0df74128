//! Array methods.
//!
//! Callbacks may mutate the array they iterate, so no borrow of the items is held across a
//! callback; each step re-reads the current item.

use std::{cell::RefMut, cmp::Ordering};

use super::{ArrayFn, arg, callback, relative_index, to_integer};
use crate::{
    exception::{RunError, RunResult},
    interp::Interpreter,
    resource::MAX_DATA_RECURSION_DEPTH,
    value::{ArrayRef, JsArray, Value},
};

/// Largest array a snippet may build in one call.
pub(crate) const MAX_ARRAY_LENGTH: usize = 1 << 24;

pub(super) fn call_static(interp: &mut Interpreter<'_>, f: ArrayFn, args: &[Value]) -> RunResult<Value> {
    match f {
        ArrayFn::IsArray => Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_)))),
        ArrayFn::Of => Ok(Value::array(args.to_vec())),
        ArrayFn::From => {
            let source = arg(args, 0);
            let items = match &source {
                Value::Object(obj) => {
                    // array-like: `Array.from({ length: 3 }, (_, i) => i)`
                    let len = obj.borrow().props.get("length").map_or(0.0, Value::to_number);
                    let len = if len.is_finite() && len > 0.0 { len as usize } else { 0 };
                    if len > MAX_ARRAY_LENGTH {
                        return Err(RunError::range_error("Invalid array length"));
                    }
                    let obj = obj.borrow();
                    (0..len)
                        .map(|i| obj.props.get(i.to_string().as_str()).cloned().unwrap_or(Value::Undefined))
                        .collect()
                }
                Value::Undefined | Value::Null => {
                    return Err(RunError::type_error(format!(
                        "{} is not iterable",
                        source.to_js_string()
                    )));
                }
                Value::Array(_) | Value::String(_) => interp.iterate(&source)?,
                _ => Vec::new(),
            };
            match arg(args, 1) {
                Value::Undefined => Ok(Value::array(items)),
                map_fn => {
                    let map_fn = callback(&[map_fn], 0)?;
                    let mut mapped = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        mapped.push(interp.call_value(&map_fn, Value::Undefined, &[item, Value::Number(i as f64)])?);
                    }
                    Ok(Value::array(mapped))
                }
            }
        }
    }
}

/// `Array(n)` / `new Array(a, b)`.
pub(super) fn construct(args: &[Value]) -> RunResult<Value> {
    if let [Value::Number(n)] = args {
        if n.fract() != 0.0 || *n < 0.0 || *n as usize > MAX_ARRAY_LENGTH {
            return Err(RunError::range_error("Invalid array length"));
        }
        return Ok(Value::array(vec![Value::Undefined; *n as usize]));
    }
    Ok(Value::array(args.to_vec()))
}

fn writable(arr: &ArrayRef) -> RunResult<RefMut<'_, JsArray>> {
    let arr = arr.borrow_mut();
    if arr.frozen {
        return Err(RunError::type_error("Cannot modify a frozen array"));
    }
    Ok(arr)
}

fn len(arr: &ArrayRef) -> usize {
    arr.borrow().items.len()
}

fn item(arr: &ArrayRef, i: usize) -> Value {
    arr.borrow().items.get(i).cloned().unwrap_or(Value::Undefined)
}

/// Calls `f(item, index, array)` for one element.
fn visit(interp: &mut Interpreter<'_>, f: &Value, this: &Value, arr: &ArrayRef, i: usize) -> RunResult<Value> {
    let args = [item(arr, i), Value::Number(i as f64), Value::Array(arr.clone())];
    interp.call_value(f, this.clone(), &args)
}

pub(super) fn call_method(interp: &mut Interpreter<'_>, arr: &ArrayRef, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "push" => {
            let mut a = writable(arr)?;
            a.items.extend_from_slice(args);
            Ok(Value::Number(a.items.len() as f64))
        }
        "pop" => Ok(writable(arr)?.items.pop().unwrap_or(Value::Undefined)),
        "shift" => {
            let mut a = writable(arr)?;
            if a.items.is_empty() {
                Ok(Value::Undefined)
            } else {
                Ok(a.items.remove(0))
            }
        }
        "unshift" => {
            let mut a = writable(arr)?;
            a.items.splice(0..0, args.iter().cloned());
            Ok(Value::Number(a.items.len() as f64))
        }
        "splice" => {
            let mut a = writable(arr)?;
            let n = a.items.len();
            let start = relative_index(&arg(args, 0), n, 0);
            let delete = match args.len() {
                0 => 0,
                1 => n - start,
                _ => (to_integer(&args[1]).max(0.0) as usize).min(n - start),
            };
            let inserted = args.get(2..).unwrap_or_default().iter().cloned();
            let removed: Vec<Value> = a.items.splice(start..start + delete, inserted).collect();
            Ok(Value::array(removed))
        }
        "reverse" => {
            writable(arr)?.items.reverse();
            Ok(Value::Array(arr.clone()))
        }
        "sort" => {
            let comparator = arg(args, 0);
            if !comparator.is_nullish() && !comparator.is_callable() {
                return Err(RunError::type_error(
                    "The comparison function must be either a function or undefined",
                ));
            }
            writable(arr)?;
            let items = arr.borrow().items.clone();
            let sorted = merge_sort(interp, items, &comparator)?;
            writable(arr)?.items = sorted;
            Ok(Value::Array(arr.clone()))
        }
        "fill" => {
            let mut a = writable(arr)?;
            let n = a.items.len();
            let start = relative_index(&arg(args, 1), n, 0);
            let end = relative_index(&arg(args, 2), n, n);
            let value = arg(args, 0);
            for slot in a.items.iter_mut().take(end).skip(start) {
                *slot = value.clone();
            }
            drop(a);
            Ok(Value::Array(arr.clone()))
        }
        "concat" => {
            let mut items = arr.borrow().items.clone();
            for a in args {
                match a {
                    Value::Array(other) => items.extend(other.borrow().items.iter().cloned()),
                    other => items.push(other.clone()),
                }
            }
            Ok(Value::array(items))
        }
        "join" | "toString" => {
            let sep = match arg(args, 0) {
                Value::Undefined => ",".to_owned(),
                v if name == "join" => v.to_js_string(),
                _ => ",".to_owned(),
            };
            let a = arr.borrow();
            let parts: Vec<String> = a
                .items
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_js_string() })
                .collect();
            Ok(Value::from(parts.join(&sep)))
        }
        "slice" => {
            let a = arr.borrow();
            let n = a.items.len();
            let start = relative_index(&arg(args, 0), n, 0);
            let end = relative_index(&arg(args, 1), n, n);
            Ok(Value::array(if start < end { a.items[start..end].to_vec() } else { Vec::new() }))
        }
        "at" => {
            let n = len(arr) as f64;
            let i = to_integer(&arg(args, 0));
            let i = if i < 0.0 { i + n } else { i };
            Ok(if i < 0.0 || i >= n { Value::Undefined } else { item(arr, i as usize) })
        }
        "indexOf" => {
            let target = arg(args, 0);
            let a = arr.borrow();
            let start = relative_index(&arg(args, 1), a.items.len(), 0);
            let found = a.items.iter().skip(start).position(|v| v.strict_equals(&target));
            Ok(Value::Number(found.map_or(-1.0, |i| (i + start) as f64)))
        }
        "lastIndexOf" => {
            let target = arg(args, 0);
            let a = arr.borrow();
            let found = a.items.iter().rposition(|v| v.strict_equals(&target));
            Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
        }
        "includes" => {
            let target = arg(args, 0);
            let a = arr.borrow();
            let start = relative_index(&arg(args, 1), a.items.len(), 0);
            Ok(Value::Bool(a.items.iter().skip(start).any(|v| v.same_value_zero(&target))))
        }
        "find" | "findIndex" | "findLast" | "findLastIndex" => {
            let f = callback(args, 0)?;
            let this = arg(args, 1);
            let n = len(arr);
            let reverse = name.starts_with("findLast");
            for step in 0..n {
                let i = if reverse { n - 1 - step } else { step };
                if visit(interp, &f, &this, arr, i)?.truthy() {
                    return Ok(if name.ends_with("Index") {
                        Value::Number(i as f64)
                    } else {
                        item(arr, i)
                    });
                }
            }
            Ok(if name.ends_with("Index") { Value::Number(-1.0) } else { Value::Undefined })
        }
        "filter" => {
            let f = callback(args, 0)?;
            let this = arg(args, 1);
            let mut out = Vec::new();
            for i in 0..len(arr) {
                let value = item(arr, i);
                if visit(interp, &f, &this, arr, i)?.truthy() {
                    out.push(value);
                }
            }
            Ok(Value::array(out))
        }
        "map" => {
            let f = callback(args, 0)?;
            let this = arg(args, 1);
            let n = len(arr);
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                out.push(visit(interp, &f, &this, arr, i)?);
            }
            Ok(Value::array(out))
        }
        "forEach" => {
            let f = callback(args, 0)?;
            let this = arg(args, 1);
            for i in 0..len(arr) {
                visit(interp, &f, &this, arr, i)?;
            }
            Ok(Value::Undefined)
        }
        "some" => {
            let f = callback(args, 0)?;
            let this = arg(args, 1);
            for i in 0..len(arr) {
                if visit(interp, &f, &this, arr, i)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "every" => {
            let f = callback(args, 0)?;
            let this = arg(args, 1);
            for i in 0..len(arr) {
                if !visit(interp, &f, &this, arr, i)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "reduce" | "reduceRight" => {
            let f = callback(args, 0)?;
            let n = len(arr);
            let order: Box<dyn Iterator<Item = usize>> = if name == "reduce" {
                Box::new(0..n)
            } else {
                Box::new((0..n).rev())
            };
            let mut order = order.peekable();
            let mut acc = if args.len() >= 2 {
                args[1].clone()
            } else {
                match order.next() {
                    Some(i) => item(arr, i),
                    None => return Err(RunError::type_error("Reduce of empty array with no initial value")),
                }
            };
            for i in order {
                let call_args = [acc, item(arr, i), Value::Number(i as f64), Value::Array(arr.clone())];
                acc = interp.call_value(&f, Value::Undefined, &call_args)?;
            }
            Ok(acc)
        }
        "flat" => {
            let depth = match arg(args, 0) {
                Value::Undefined => 1,
                v => to_integer(&v).clamp(0.0, MAX_DATA_RECURSION_DEPTH as f64) as usize,
            };
            let mut out = Vec::new();
            flatten(&arr.borrow().items, depth, &mut out);
            Ok(Value::array(out))
        }
        "flatMap" => {
            let f = callback(args, 0)?;
            let this = arg(args, 1);
            let mut out = Vec::new();
            for i in 0..len(arr) {
                match visit(interp, &f, &this, arr, i)? {
                    Value::Array(inner) => out.extend(inner.borrow().items.iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::array(out))
        }
        "keys" => Ok(Value::array((0..len(arr)).map(|i| Value::Number(i as f64)).collect())),
        "values" => Ok(Value::array(arr.borrow().items.clone())),
        "entries" => Ok(Value::array(
            arr.borrow()
                .items
                .iter()
                .enumerate()
                .map(|(i, v)| Value::array(vec![Value::Number(i as f64), v.clone()]))
                .collect(),
        )),
        _ => Err(RunError::type_error(format!("array.{name} is not a function"))),
    }
}

fn flatten(items: &[Value], depth: usize, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => flatten(&inner.borrow().items, depth - 1, out),
            other => out.push(other.clone()),
        }
    }
}

/// Stable merge sort with a fallible comparator. Undefined sorts last.
fn merge_sort(interp: &mut Interpreter<'_>, items: Vec<Value>, comparator: &Value) -> RunResult<Vec<Value>> {
    let (mut defined, undefined): (Vec<Value>, Vec<Value>) =
        items.into_iter().partition(|v| !matches!(v, Value::Undefined));
    defined = sort_run(interp, defined, comparator)?;
    defined.extend(undefined);
    Ok(defined)
}

fn sort_run(interp: &mut Interpreter<'_>, mut items: Vec<Value>, comparator: &Value) -> RunResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = sort_run(interp, items, comparator)?;
    let right = sort_run(interp, right, comparator)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if compare(interp, a, b, comparator)? == Ordering::Greater {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

fn compare(interp: &mut Interpreter<'_>, a: &Value, b: &Value, comparator: &Value) -> RunResult<Ordering> {
    if comparator.is_nullish() {
        return Ok(a.to_js_string().cmp(&b.to_js_string()));
    }
    let result = interp.call_value(comparator, Value::Undefined, &[a.clone(), b.clone()])?;
    let n = result.to_number();
    Ok(if n > 0.0 {
        Ordering::Greater
    } else if n < 0.0 {
        Ordering::Less
    } else {
        Ordering::Equal
    })
}
