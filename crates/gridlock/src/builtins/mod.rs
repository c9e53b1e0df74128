//! Built-in functions, namespace members and receiver methods.
//!
//! Static functions (`Math.max`, `Object.keys`, `parseInt`) are `Builtin` values; the frozen
//! tables in `intrinsics` map names to them. Methods on values (`[].map`, `"".trim`) are not
//! values until read, and are dispatched here by receiver type and name.

pub(crate) mod array;
mod console;
pub(crate) mod date;
pub(crate) mod json;
mod math;
mod number;
mod object;
pub(crate) mod promise;
mod string;

use strum::IntoStaticStr;

use crate::{
    exception::{ExcType, RunError, RunResult},
    interp::Interpreter,
    intrinsics::{Intrinsic, ReceiverKind},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub(crate) enum GlobalFn {
    #[strum(serialize = "parseInt")]
    ParseInt,
    #[strum(serialize = "parseFloat")]
    ParseFloat,
    #[strum(serialize = "isNaN")]
    IsNaN,
    #[strum(serialize = "isFinite")]
    IsFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ConsoleFn {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum MathFn {
    Abs,
    Floor,
    Ceil,
    Round,
    Trunc,
    Sign,
    Sqrt,
    Cbrt,
    Pow,
    Exp,
    Log,
    Log2,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Min,
    Max,
    Hypot,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum ObjectFn {
    Keys,
    Values,
    Entries,
    Assign,
    Freeze,
    IsFrozen,
    FromEntries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum ArrayFn {
    IsArray,
    From,
    Of,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum JsonFn {
    Stringify,
    Parse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub(crate) enum NumberFn {
    #[strum(serialize = "isInteger")]
    IsInteger,
    #[strum(serialize = "isSafeInteger")]
    IsSafeInteger,
    #[strum(serialize = "isFinite")]
    IsFinite,
    #[strum(serialize = "isNaN")]
    IsNaN,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum StringFn {
    FromCharCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum PromiseFn {
    Resolve,
    Reject,
    All,
    AllSettled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum DateFn {
    Now,
    Parse,
}

/// Every static built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Builtin {
    Global(GlobalFn),
    Console(ConsoleFn),
    Math(MathFn),
    Object(ObjectFn),
    Array(ArrayFn),
    Json(JsonFn),
    Number(NumberFn),
    String(StringFn),
    Promise(PromiseFn),
    Date(DateFn),
}

impl Builtin {
    /// The function's `name`, as snippets see it.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Global(f) => f.into(),
            Self::Console(f) => f.into(),
            Self::Math(f) => f.into(),
            Self::Object(f) => f.into(),
            Self::Array(f) => f.into(),
            Self::Json(f) => f.into(),
            Self::Number(f) => f.into(),
            Self::String(f) => f.into(),
            Self::Promise(f) => f.into(),
            Self::Date(f) => f.into(),
        }
    }
}

/// Calls a static built-in function.
pub(crate) fn call_builtin(interp: &mut Interpreter<'_>, builtin: Builtin, args: &[Value]) -> RunResult<Value> {
    match builtin {
        Builtin::Global(f) => number::call_global(f, args),
        Builtin::Console(f) => console::call(interp, f, args),
        Builtin::Math(f) => math::call(f, args),
        Builtin::Object(f) => object::call(interp, f, args),
        Builtin::Array(f) => array::call_static(interp, f, args),
        Builtin::Json(f) => json::call(interp, f, args),
        Builtin::Number(f) => Ok(number::call_number_fn(f, args)),
        Builtin::String(f) => string::call_static(f, args),
        Builtin::Promise(f) => promise::call_static(interp, f, args),
        Builtin::Date(f) => Ok(date::call_static(f, args)),
    }
}

/// Calls a receiver method such as `[1, 2].map(f)` or `"abc".toUpperCase()`.
///
/// The caller has already checked that the method exists for the receiver kind.
pub(crate) fn call_method(interp: &mut Interpreter<'_>, receiver: &Value, name: &str, args: &[Value]) -> RunResult<Value> {
    match receiver {
        Value::Array(arr) => array::call_method(interp, arr, name, args),
        Value::String(s) => string::call_method(interp, s, name, args),
        Value::Number(n) => number::call_method(*n, name, args),
        Value::Bool(b) => Ok(match name {
            "toString" => Value::from(if *b { "true" } else { "false" }),
            _ => Value::Bool(*b),
        }),
        Value::Date(ms) => date::call_method(*ms, name, args),
        Value::Promise(p) => promise::call_method(interp, p, name, args),
        Value::Object(_) => object::call_method(receiver, name, args),
        Value::Function(_)
        | Value::Builtin(_)
        | Value::Method(_)
        | Value::HostMethod(..)
        | Value::Resolver { .. }
        | Value::Intrinsic(_) => call_function_method(interp, receiver, name, args),
        _ => Err(RunError::type_error(format!("{name} is not a function"))),
    }
}

/// `fn.call(thisArg, ...args)` and `fn.apply(thisArg, args)`.
fn call_function_method(interp: &mut Interpreter<'_>, function: &Value, name: &str, args: &[Value]) -> RunResult<Value> {
    let this = arg(args, 0);
    match name {
        "call" => interp.call_value(function, this, args.get(1..).unwrap_or_default()),
        "apply" => {
            let list = match arg(args, 1) {
                Value::Array(arr) => arr.borrow().items.clone(),
                Value::Undefined | Value::Null => Vec::new(),
                _ => return Err(RunError::type_error("CreateListFromArrayLike called on non-object")),
            };
            interp.call_value(function, this, &list)
        }
        "toString" => Ok(Value::from(function.to_js_string())),
        _ => Err(RunError::type_error(format!("{name} is not a function"))),
    }
}

/// Calls or constructs a callable intrinsic such as `Number("3")` or `new Date()`.
pub(crate) fn call_intrinsic(
    interp: &mut Interpreter<'_>,
    intrinsic: Intrinsic,
    args: &[Value],
    construct: bool,
) -> RunResult<Value> {
    match intrinsic {
        Intrinsic::Object => Ok(match arg(args, 0) {
            Value::Undefined | Value::Null => Value::object(indexmap::IndexMap::new()),
            other => other,
        }),
        Intrinsic::Array => array::construct(args),
        Intrinsic::Number => Ok(Value::Number(args.first().map_or(0.0, Value::to_number))),
        Intrinsic::String => Ok(Value::from(match args.first() {
            Some(v) => v.to_js_string(),
            None => String::new(),
        })),
        Intrinsic::Boolean => Ok(Value::Bool(arg(args, 0).truthy())),
        Intrinsic::Date => Ok(date::construct(args, construct)),
        Intrinsic::Promise => {
            if !construct {
                return Err(RunError::type_error("Promise constructor cannot be invoked without 'new'"));
            }
            promise::construct(interp, args)
        }
        Intrinsic::Error | Intrinsic::TypeError | Intrinsic::RangeError => {
            let exc_type = match intrinsic {
                Intrinsic::TypeError => ExcType::TypeError,
                Intrinsic::RangeError => ExcType::RangeError,
                _ => ExcType::Error,
            };
            let message = match arg(args, 0) {
                Value::Undefined => String::new(),
                other => other.to_js_string(),
            };
            Ok(Value::error(exc_type, message))
        }
        Intrinsic::Console | Intrinsic::Math | Intrinsic::Json => {
            Err(RunError::type_error(format!("{} is not a function", intrinsic.name())))
        }
    }
}

/// Classifies a value for receiver-method lookup.
pub(crate) fn receiver_kind(value: &Value) -> Option<ReceiverKind> {
    Some(match value {
        Value::Array(_) => ReceiverKind::Array,
        Value::String(_) => ReceiverKind::String,
        Value::Number(_) => ReceiverKind::Number,
        Value::Bool(_) => ReceiverKind::Boolean,
        Value::Object(_) => ReceiverKind::Object,
        Value::Date(_) => ReceiverKind::Date,
        Value::Promise(_) => ReceiverKind::Promise,
        Value::Function(_)
        | Value::Builtin(_)
        | Value::Method(_)
        | Value::HostMethod(..)
        | Value::Resolver { .. } => ReceiverKind::Function,
        Value::Intrinsic(i) if i.is_callable() => ReceiverKind::Function,
        _ => return None,
    })
}

/// Argument `i`, or `undefined` when absent.
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// ToIntegerOrInfinity.
pub(crate) fn to_integer(value: &Value) -> f64 {
    let n = value.to_number();
    if n.is_nan() { 0.0 } else { n.trunc() }
}

/// Resolves a possibly-negative relative index against `len`, clamped to `0..=len`.
pub(crate) fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = to_integer(value);
    let len_f = len as f64;
    if n < 0.0 {
        (len_f + n).max(0.0) as usize
    } else {
        n.min(len_f) as usize
    }
}

/// Requires argument `i` to be callable, as array callbacks do.
pub(crate) fn callback(args: &[Value], i: usize) -> RunResult<Value> {
    let f = arg(args, i);
    if f.is_callable() {
        Ok(f)
    } else {
        Err(RunError::type_error(format!("{} is not a function", f.inspect())))
    }
}
