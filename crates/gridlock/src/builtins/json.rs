//! `JSON.stringify` and `JSON.parse`, backed by `serde_json`.

use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, ser::PrettyFormatter};

use super::{JsonFn, arg, date::to_iso_string};
use crate::{
    exception::{ExcType, RunError, RunResult},
    interp::Interpreter,
    object::{Object, number_to_json},
    value::Value,
};

pub(super) fn call(interp: &mut Interpreter<'_>, f: JsonFn, args: &[Value]) -> RunResult<Value> {
    match f {
        JsonFn::Stringify => stringify(interp, &arg(args, 0), &arg(args, 1), &arg(args, 2)),
        JsonFn::Parse => {
            let text = arg(args, 0).to_js_string();
            let parsed: JsonValue = serde_json::from_str(&text)
                .map_err(|e| RunError::exc(ExcType::SyntaxError, format!("JSON.parse: {e}")))?;
            let value = from_json(parsed);
            let reviver = arg(args, 1);
            if reviver.is_callable() {
                let root = Value::object(IndexMap::from([(Rc::from(""), value)]));
                return revive(interp, &reviver, &root, Rc::from(""));
            }
            Ok(value)
        }
    }
}

fn from_json(value: JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => Value::from(s),
        JsonValue::Array(items) => Value::array(items.into_iter().map(from_json).collect()),
        JsonValue::Object(map) => Value::object(map.into_iter().map(|(k, v)| (Rc::from(k), from_json(v))).collect()),
    }
}

/// Post-order walk calling `reviver(key, value)`; `undefined` results delete the property.
fn revive(interp: &mut Interpreter<'_>, reviver: &Value, holder: &Value, key: Rc<str>) -> RunResult<Value> {
    let value = interp.get_member(holder, &key)?;
    match &value {
        Value::Array(arr) => {
            let len = arr.borrow().items.len();
            for i in 0..len {
                let revived = revive(interp, reviver, &value, Rc::from(i.to_string()))?;
                if let Some(slot) = arr.borrow_mut().items.get_mut(i) {
                    *slot = revived;
                }
            }
        }
        Value::Object(obj) => {
            let keys: Vec<Rc<str>> = obj.borrow().props.keys().cloned().collect();
            for k in keys {
                let revived = revive(interp, reviver, &value, k.clone())?;
                let mut obj = obj.borrow_mut();
                if matches!(revived, Value::Undefined) {
                    obj.props.shift_remove(&k);
                } else {
                    obj.props.insert(k, revived);
                }
            }
        }
        _ => {}
    }
    interp.call_value(reviver, holder.clone(), &[Value::String(key), value])
}

fn stringify(interp: &mut Interpreter<'_>, value: &Value, replacer: &Value, space: &Value) -> RunResult<Value> {
    let indent = match space {
        Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let allow = match replacer {
        Value::Array(arr) => Some(arr.borrow().items.iter().map(Value::to_property_key).collect()),
        _ => None,
    };
    let mut stringifier = Stringifier {
        interp,
        replacer: replacer.is_callable().then(|| replacer.clone()),
        allow,
        stack: Vec::new(),
    };
    let Some(json) = stringifier.serialize_value(&Value::Undefined, Rc::from(""), value.clone())? else {
        return Ok(Value::Undefined);
    };
    if indent.is_empty() {
        return Ok(Value::from(json.to_string()));
    }
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
    json.serialize(&mut serializer)
        .map_err(|e| RunError::type_error(format!("JSON.stringify: {e}")))?;
    Ok(Value::from(String::from_utf8_lossy(&out).into_owned()))
}

struct Stringifier<'i, 'a> {
    interp: &'i mut Interpreter<'a>,
    replacer: Option<Value>,
    allow: Option<Vec<Rc<str>>>,
    /// Containers currently being serialized, for cycle detection.
    stack: Vec<*const ()>,
}

impl Stringifier<'_, '_> {
    /// `None` means the value is omitted (`undefined`, functions).
    fn serialize_value(&mut self, holder: &Value, key: Rc<str>, value: Value) -> RunResult<Option<JsonValue>> {
        let value = match &self.replacer {
            Some(replacer) => {
                let replacer = replacer.clone();
                self.interp.call_value(&replacer, holder.clone(), &[Value::String(key), value])?
            }
            None => value,
        };
        Ok(Some(match &value {
            Value::Undefined => return Ok(None),
            _ if value.is_callable() => return Ok(None),
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => JsonValue::String(s.to_string()),
            Value::Date(ms) => to_iso_string(*ms).map_or(JsonValue::Null, JsonValue::String),
            Value::Array(arr) => {
                self.enter(Rc::as_ptr(arr).cast())?;
                let len = arr.borrow().items.len();
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    let item = arr.borrow().items.get(i).cloned().unwrap_or(Value::Undefined);
                    let json = self.serialize_value(&value, Rc::from(i.to_string()), item)?;
                    items.push(json.unwrap_or(JsonValue::Null));
                }
                self.stack.pop();
                JsonValue::Array(items)
            }
            Value::Object(obj) => {
                self.enter(Rc::as_ptr(obj).cast())?;
                let entries: Vec<(Rc<str>, Value)> = obj
                    .borrow()
                    .props
                    .iter()
                    .filter(|(k, _)| self.allow.as_ref().is_none_or(|allow| allow.contains(*k)))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let mut map = Map::new();
                for (k, v) in entries {
                    if let Some(json) = self.serialize_value(&value, k.clone(), v)? {
                        map.insert(k.to_string(), json);
                    }
                }
                self.stack.pop();
                JsonValue::Object(map)
            }
            Value::Proxy(_) => Object::from_value(&value).to_json_value(),
            _ => JsonValue::Object(Map::new()),
        }))
    }

    fn enter(&mut self, ptr: *const ()) -> RunResult<()> {
        if self.stack.contains(&ptr) {
            return Err(RunError::type_error("Converting circular structure to JSON"));
        }
        if self.stack.len() >= crate::resource::MAX_DATA_RECURSION_DEPTH {
            return Err(RunError::range_error("Maximum nesting depth exceeded in JSON.stringify"));
        }
        self.stack.push(ptr);
        Ok(())
    }
}
