use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    host::ProxyId,
    resource::MAX_DATA_RECURSION_DEPTH,
    value::{Settled, Value},
};

/// A value passed into or returned out of a snippet, and exchanged with hosts.
///
/// Unlike the evaluator's internal values, `Object` owns all its data and can be freely
/// cloned, serialized and sent across threads.
///
/// # JSON Serialization
///
/// `to_json_value` produces natural JSON:
/// - `Undefined` and `Null` → `null`
/// - `Number` → JSON number (integral values without a fraction; NaN and infinities → `null`)
/// - `Array` / `Map` → JSON array / object
/// - `Proxy` → `{"$proxy": id}`
/// - `Repr` → `{"$repr": "..."}` (output-only: functions and other values with no data form)
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Object {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Self>),
    Map(IndexMap<String, Self>),
    /// Opaque host handle.
    Proxy(ProxyId),
    /// Printable form of a value that has no data representation.
    Repr(String),
}

impl Object {
    /// Builds a map from `(key, value)` pairs.
    pub fn map<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_proxy(&self) -> Option<ProxyId> {
        match self {
            Self::Proxy(id) => Some(*id),
            _ => None,
        }
    }

    /// Looks up a key of a `Map`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "object",
            Self::Proxy(_) => "proxy",
            Self::Repr(_) => "repr",
        }
    }

    /// Converts to natural JSON, see the type documentation.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::{Value as JV, json};
        match self {
            Self::Undefined | Self::Null => JV::Null,
            Self::Bool(b) => JV::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => JV::String(s.clone()),
            Self::Array(items) => JV::Array(items.iter().map(Self::to_json_value).collect()),
            Self::Map(map) => JV::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json_value())).collect()),
            Self::Proxy(id) => json!({"$proxy": id.raw()}),
            Self::Repr(s) => json!({"$repr": s}),
        }
    }

    /// Converts natural JSON into an `Object`. `{"$proxy": n}` round-trips to a handle.
    #[must_use]
    pub fn from_json_value(value: serde_json::Value) -> Self {
        use serde_json::Value as JV;
        match value {
            JV::Null => Self::Null,
            JV::Bool(b) => Self::Bool(b),
            JV::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            JV::String(s) => Self::String(s),
            JV::Array(items) => Self::Array(items.into_iter().map(Self::from_json_value).collect()),
            JV::Object(map) => {
                if map.len() == 1
                    && let Some(id) = map.get("$proxy").and_then(JV::as_u64)
                    && let Ok(raw) = u32::try_from(id)
                {
                    return Self::Proxy(ProxyId::new(raw));
                }
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from_json_value(v))).collect())
            }
        }
    }

    /// Snapshot of an evaluator value. Cycles and overly deep nesting become `Repr`.
    pub(crate) fn from_value(value: &Value) -> Self {
        Self::from_value_inner(value, 0)
    }

    fn from_value_inner(value: &Value, depth: usize) -> Self {
        if depth > MAX_DATA_RECURSION_DEPTH {
            return Self::Repr("[Circular]".to_owned());
        }
        match value {
            Value::Undefined => Self::Undefined,
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(*n),
            Value::String(s) => Self::String(s.to_string()),
            Value::Array(arr) => Self::Array(
                arr.borrow()
                    .items
                    .iter()
                    .map(|item| Self::from_value_inner(item, depth + 1))
                    .collect(),
            ),
            Value::Object(obj) => {
                let obj = obj.borrow();
                Self::Map(
                    obj.props
                        .iter()
                        .map(|(k, v)| (k.to_string(), Self::from_value_inner(v, depth + 1)))
                        .collect(),
                )
            }
            Value::Proxy(id) => Self::Proxy(*id),
            Value::Date(ms) => match crate::builtins::date::to_iso_string(*ms) {
                Some(iso) => Self::String(iso),
                None => Self::Null,
            },
            Value::Promise(settled) => match &**settled {
                Settled::Fulfilled(v) => Self::from_value_inner(v, depth + 1),
                Settled::Rejected(_) => Self::Repr(value.inspect()),
            },
            Value::Function(_)
            | Value::Builtin(_)
            | Value::Intrinsic(_)
            | Value::Method(_)
            | Value::HostMethod(..)
            | Value::Resolver { .. } => Self::Repr(value.inspect()),
        }
    }

    /// Converts into a fresh evaluator value. `Repr` becomes its string.
    pub(crate) fn into_value(self) -> Value {
        match self {
            Self::Undefined => Value::Undefined,
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Number(n) => Value::Number(n),
            Self::String(s) | Self::Repr(s) => Value::from(s),
            Self::Array(items) => Value::array(items.into_iter().map(Self::into_value).collect()),
            Self::Map(map) => Value::object(map.into_iter().map(|(k, v)| (Rc::from(k), v.into_value())).collect()),
            Self::Proxy(id) => Value::Proxy(id),
        }
    }
}

/// Integral values serialize as JSON integers so `1` does not print as `1.0`.
pub(crate) fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Repr(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json_value()),
        }
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Object {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Object {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Self>> for Object {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(items)
    }
}

impl From<ProxyId> for Object {
    fn from(id: ProxyId) -> Self {
        Self::Proxy(id)
    }
}
