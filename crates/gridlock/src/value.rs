//! Runtime values of the snippet language.
//!
//! `Value` is the evaluator-internal representation. It shares mutable arrays and objects through
//! `Rc<RefCell<..>>` and is therefore neither `Send` nor usable outside one evaluation; values
//! crossing the public boundary are converted to and from `Object`.

use std::{cell::RefCell, fmt, fmt::Write as _, rc::Rc};

use indexmap::IndexMap;

use crate::{
    builtins::Builtin,
    exception::ExcType,
    expressions::FunctionDef,
    host::ProxyId,
    interp::ScopeId,
    intrinsics::Intrinsic,
    resource::MAX_DATA_RECURSION_DEPTH,
};

pub(crate) type ArrayRef = Rc<RefCell<JsArray>>;
pub(crate) type ObjectRef = Rc<RefCell<JsObject>>;

#[derive(Debug, Default)]
pub(crate) struct JsArray {
    pub items: Vec<Value>,
    pub frozen: bool,
}

/// Distinguishes error objects from plain objects; there is no other object class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum ObjectClass {
    #[default]
    Plain,
    Error(ExcType),
}

#[derive(Debug, Default)]
pub(crate) struct JsObject {
    pub props: IndexMap<Rc<str>, Value>,
    pub frozen: bool,
    pub class: ObjectClass,
}

/// A user-defined function together with the scope it closes over.
#[derive(Debug)]
pub(crate) struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: ScopeId,
}

/// A built-in method read off a receiver without calling it, e.g. `const f = [1, 2].map`.
#[derive(Debug)]
pub(crate) struct BoundMethod {
    pub receiver: Value,
    pub name: Rc<str>,
}

/// A promise. Evaluation is synchronous, so promises are always already settled.
#[derive(Debug)]
pub(crate) enum Settled {
    Fulfilled(Value),
    Rejected(Value),
}

/// Settlement shared by the `resolve` and `reject` functions handed to a promise executor.
#[derive(Debug, Default)]
pub(crate) struct ResolveSlot(pub RefCell<Option<Settled>>);

#[derive(Clone)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Closure>),
    Builtin(Builtin),
    /// A frozen namespace or constructor such as `Math` or `Object`.
    Intrinsic(Intrinsic),
    Method(Rc<BoundMethod>),
    /// Milliseconds since the Unix epoch, NaN for an invalid date.
    Date(f64),
    Promise(Rc<Settled>),
    Proxy(ProxyId),
    /// A host method read as a value, e.g. `const sync = context.sync`.
    HostMethod(ProxyId, Rc<str>),
    Resolver { slot: Rc<ResolveSlot>, reject: bool },
}

impl fmt::Debug for Value {
    /// Shallow on purpose: arrays and objects may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&number_to_string(*n)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(a) => write!(f, "Array({})", a.borrow().items.len()),
            Self::Object(o) => write!(f, "Object({} props)", o.borrow().props.len()),
            Self::Function(c) => write!(f, "Function({})", c.def.name.as_deref().unwrap_or("anonymous")),
            Self::Builtin(b) => write!(f, "Builtin({b:?})"),
            Self::Intrinsic(i) => write!(f, "Intrinsic({i:?})"),
            Self::Method(m) => write!(f, "Method({})", m.name),
            Self::Date(ms) => write!(f, "Date({ms})"),
            Self::Promise(_) => f.write_str("Promise"),
            Self::Proxy(id) => write!(f, "Proxy({})", id.raw()),
            Self::HostMethod(id, name) => write!(f, "HostMethod({}, {name})", id.raw()),
            Self::Resolver { reject, .. } => f.write_str(if *reject { "reject" } else { "resolve" }),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl Value {
    pub(crate) fn array(items: Vec<Self>) -> Self {
        Self::Array(Rc::new(RefCell::new(JsArray { items, frozen: false })))
    }

    pub(crate) fn object(props: IndexMap<Rc<str>, Self>) -> Self {
        Self::Object(Rc::new(RefCell::new(JsObject {
            props,
            ..JsObject::default()
        })))
    }

    /// Builds an error object with `name` and `message` properties.
    pub(crate) fn error(exc_type: ExcType, message: String) -> Self {
        let mut props = IndexMap::new();
        let name: &'static str = exc_type.into();
        props.insert(Rc::from("name"), Self::from(name));
        props.insert(Rc::from("message"), Self::from(message));
        Self::Object(Rc::new(RefCell::new(JsObject {
            props,
            frozen: false,
            class: ObjectClass::Error(exc_type),
        })))
    }

    /// Exception type and message reported when this value escapes as a throw.
    ///
    /// Error objects report their `name` (when it is a known type) and `message`; any other
    /// thrown value is reported as a plain `Error` with its string form as the message.
    pub(crate) fn describe_thrown(&self) -> (ExcType, String) {
        if let Self::Object(obj) = self {
            let obj = obj.borrow();
            if let ObjectClass::Error(class) = obj.class {
                let exc_type = match obj.props.get("name") {
                    Some(Self::String(name)) => name.parse().unwrap_or(class),
                    _ => class,
                };
                let message = obj.props.get("message").map(Self::to_js_string).unwrap_or_default();
                return (exc_type, message);
            }
        }
        (ExcType::Error, self.to_js_string())
    }

    pub(crate) fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub(crate) fn is_callable(&self) -> bool {
        match self {
            Self::Function(_) | Self::Builtin(_) | Self::Method(_) | Self::HostMethod(..) | Self::Resolver { .. } => true,
            Self::Intrinsic(i) => i.is_callable(),
            _ => false,
        }
    }

    pub(crate) fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            _ if self.is_callable() => "function",
            _ => "object",
        }
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub(crate) fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => string_to_number(s),
            Self::Date(ms) => *ms,
            Self::Array(_) => string_to_number(&self.to_js_string()),
            _ => f64::NAN,
        }
    }

    /// ToInt32, used by bitwise operators.
    pub(crate) fn to_int32(&self) -> i32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        let wrapped = (n.trunc() % 4_294_967_296.0) as i64;
        wrapped as i32
    }

    /// String conversion as performed by `String(value)` and template literals.
    pub(crate) fn to_js_string(&self) -> String {
        let mut out = String::new();
        self.write_js_string(&mut out, 0);
        out
    }

    fn write_js_string(&self, out: &mut String, depth: usize) {
        match self {
            Self::Undefined => out.push_str("undefined"),
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Number(n) => out.push_str(&number_to_string(*n)),
            Self::String(s) => out.push_str(s),
            Self::Array(arr) => {
                if depth >= MAX_DATA_RECURSION_DEPTH {
                    return;
                }
                let arr = arr.borrow();
                for (i, item) in arr.items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    if !item.is_nullish() {
                        item.write_js_string(out, depth + 1);
                    }
                }
            }
            Self::Object(obj) => {
                let obj = obj.borrow();
                match obj.class {
                    ObjectClass::Error(class) => {
                        let name = match obj.props.get("name") {
                            Some(name) => name.to_js_string(),
                            None => class.to_string(),
                        };
                        let message = obj.props.get("message").map(Self::to_js_string).unwrap_or_default();
                        out.push_str(&name);
                        if !message.is_empty() {
                            out.push_str(": ");
                            out.push_str(&message);
                        }
                    }
                    ObjectClass::Plain => out.push_str("[object Object]"),
                }
            }
            Self::Function(closure) => {
                let _ = write!(out, "function {}() {{ [code] }}", closure.def.name.as_deref().unwrap_or(""));
            }
            Self::Builtin(b) => {
                let _ = write!(out, "function {}() {{ [native code] }}", b.name());
            }
            Self::Method(m) => {
                let _ = write!(out, "function {}() {{ [native code] }}", m.name);
            }
            Self::HostMethod(_, name) => {
                let _ = write!(out, "function {name}() {{ [host code] }}");
            }
            Self::Resolver { reject, .. } => {
                out.push_str(if *reject { "function reject() { [native code] }" } else { "function resolve() { [native code] }" });
            }
            Self::Intrinsic(i) if i.is_callable() => {
                let _ = write!(out, "function {}() {{ [native code] }}", i.name());
            }
            Self::Intrinsic(i) => {
                let _ = write!(out, "[object {}]", i.name());
            }
            Self::Date(ms) => out.push_str(&crate::builtins::date::to_display_string(*ms)),
            Self::Promise(_) => out.push_str("[object Promise]"),
            Self::Proxy(_) => out.push_str("[object Object]"),
        }
    }

    /// Property key form of a value: `obj[1]` and `obj["1"]` address the same property.
    pub(crate) fn to_property_key(&self) -> Rc<str> {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_js_string().into(),
        }
    }

    pub(crate) fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Method(a), Self::Method(b)) => Rc::ptr_eq(a, b),
            (Self::Promise(a), Self::Promise(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Intrinsic(a), Self::Intrinsic(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Proxy(a), Self::Proxy(b)) => a == b,
            (Self::HostMethod(a, m), Self::HostMethod(b, n)) => a == b && m == n,
            (Self::Resolver { slot: a, reject: x }, Self::Resolver { slot: b, reject: y }) => Rc::ptr_eq(a, b) && x == y,
            _ => false,
        }
    }

    /// `SameValueZero`: strict equality except that NaN equals NaN. Used by `includes`.
    pub(crate) fn same_value_zero(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_)
        )
    }

    /// Abstract equality (`==`).
    pub(crate) fn loose_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Self::Number(_), Self::String(_)) | (Self::String(_), Self::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Self::Bool(_), _) => Self::Number(self.to_number()).loose_equals(other),
            (_, Self::Bool(_)) => self.loose_equals(&Self::Number(other.to_number())),
            (a, b) if a.is_primitive() && !b.is_primitive() => a.loose_equals(&Self::from(b.to_js_string())),
            (a, b) if !a.is_primitive() && b.is_primitive() => Self::from(a.to_js_string()).loose_equals(b),
            _ => self.strict_equals(other),
        }
    }

    /// Formats a value the way `console.log` prints it.
    ///
    /// Top-level strings print raw; nested strings are quoted.
    pub(crate) fn inspect(&self) -> String {
        match self {
            Self::String(s) => s.to_string(),
            other => {
                let mut out = String::new();
                other.write_inspect(&mut out, 0);
                out
            }
        }
    }

    fn write_inspect(&self, out: &mut String, depth: usize) {
        match self {
            Self::String(s) => {
                let _ = write!(out, "'{}'", s.replace('\'', "\\'"));
            }
            Self::Array(arr) => {
                if depth >= 2 {
                    out.push_str("[Array]");
                    return;
                }
                let arr = arr.borrow();
                if arr.items.is_empty() {
                    out.push_str("[]");
                    return;
                }
                out.push_str("[ ");
                for (i, item) in arr.items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_inspect(out, depth + 1);
                }
                out.push_str(" ]");
            }
            Self::Object(obj) => {
                let obj = obj.borrow();
                if let ObjectClass::Error(_) = obj.class {
                    drop(obj);
                    out.push_str(&self.to_js_string());
                    return;
                }
                if depth >= 2 {
                    out.push_str("[Object]");
                    return;
                }
                if obj.props.is_empty() {
                    out.push_str("{}");
                    return;
                }
                out.push_str("{ ");
                for (i, (key, value)) in obj.props.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if is_identifier_name(key) {
                        out.push_str(key);
                    } else {
                        let _ = write!(out, "'{key}'");
                    }
                    out.push_str(": ");
                    value.write_inspect(out, depth + 1);
                }
                out.push_str(" }");
            }
            Self::Function(closure) => match &closure.def.name {
                Some(name) => {
                    let _ = write!(out, "[Function: {name}]");
                }
                None => out.push_str("[Function (anonymous)]"),
            },
            Self::Builtin(b) => {
                let _ = write!(out, "[Function: {}]", b.name());
            }
            Self::Method(m) => {
                let _ = write!(out, "[Function: {}]", m.name);
            }
            Self::HostMethod(_, name) => {
                let _ = write!(out, "[Function: {name}]");
            }
            Self::Date(ms) => out.push_str(&crate::builtins::date::to_iso_string(*ms).unwrap_or_else(|| "Invalid Date".to_owned())),
            Self::Promise(settled) => match &**settled {
                Settled::Fulfilled(v) => {
                    out.push_str("Promise { ");
                    v.write_inspect(out, depth + 1);
                    out.push_str(" }");
                }
                Settled::Rejected(v) => {
                    out.push_str("Promise { <rejected> ");
                    v.write_inspect(out, depth + 1);
                    out.push_str(" }");
                }
            },
            Self::Proxy(id) => {
                let _ = write!(out, "[HostObject #{}]", id.raw());
            }
            other => other.write_js_string(out, depth),
        }
    }
}

/// Canonical array index form of a property key, if it has one.
pub(crate) fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

pub(crate) fn is_identifier_name(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c == '$' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
}

/// Number to string conversion with the language's formatting rules.
///
/// Integers print without a fractional part, magnitudes of `1e21` and above or below `1e-6` use
/// exponent notation with an explicit sign, and `-0` prints as `0`.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if n == 0.0 {
        return "0".to_owned();
    }
    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{n:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    format!("{n}")
}

/// String to number conversion: surrounding whitespace ignored, empty string is zero, anything
/// that is not a complete numeric literal is NaN.
pub(crate) fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let lower = trimmed.to_ascii_lowercase();
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if let Some(digits) = lower.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix).map_or(f64::NAN, |v| v as f64);
        }
    }
    let valid = trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !valid {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}
