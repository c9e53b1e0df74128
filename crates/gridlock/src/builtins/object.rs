use std::rc::Rc;

use indexmap::IndexMap;

use super::{ObjectFn, arg};
use crate::{
    exception::{RunError, RunResult},
    interp::Interpreter,
    value::{ObjectClass, Value},
};

pub(super) fn call(interp: &mut Interpreter<'_>, f: ObjectFn, args: &[Value]) -> RunResult<Value> {
    let target = arg(args, 0);
    match f {
        ObjectFn::Keys => Ok(Value::array(
            own_entries(&target)?.into_iter().map(|(k, _)| Value::String(k)).collect(),
        )),
        ObjectFn::Values => Ok(Value::array(own_entries(&target)?.into_iter().map(|(_, v)| v).collect())),
        ObjectFn::Entries => Ok(Value::array(
            own_entries(&target)?
                .into_iter()
                .map(|(k, v)| Value::array(vec![Value::String(k), v]))
                .collect(),
        )),
        ObjectFn::Assign => {
            if target.is_nullish() {
                return Err(RunError::type_error("Cannot convert undefined or null to object"));
            }
            for source in args.iter().skip(1) {
                if source.is_nullish() {
                    continue;
                }
                for (key, value) in own_entries(source)? {
                    interp.set_member(&target, &key, value)?;
                }
            }
            Ok(target)
        }
        ObjectFn::Freeze => {
            match &target {
                Value::Object(obj) => obj.borrow_mut().frozen = true,
                Value::Array(arr) => arr.borrow_mut().frozen = true,
                _ => {}
            }
            Ok(target)
        }
        ObjectFn::IsFrozen => Ok(Value::Bool(match &target {
            Value::Object(obj) => obj.borrow().frozen,
            Value::Array(arr) => arr.borrow().frozen,
            _ => true,
        })),
        ObjectFn::FromEntries => {
            let mut props = IndexMap::new();
            for entry in interp.iterate(&target)? {
                let Value::Array(pair) = &entry else {
                    return Err(RunError::type_error(format!(
                        "Iterator value {} is not an entry object",
                        entry.inspect()
                    )));
                };
                let pair = pair.borrow();
                let key = pair.items.first().map_or_else(|| Rc::from("undefined"), Value::to_property_key);
                let value = pair.items.get(1).cloned().unwrap_or(Value::Undefined);
                props.insert(key, value);
            }
            Ok(Value::object(props))
        }
    }
}

/// Own enumerable string-keyed entries, in insertion order.
fn own_entries(value: &Value) -> RunResult<Vec<(Rc<str>, Value)>> {
    Ok(match value {
        Value::Undefined | Value::Null => {
            return Err(RunError::type_error("Cannot convert undefined or null to object"));
        }
        Value::Object(obj) => obj.borrow().props.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(arr) => arr
            .borrow()
            .items
            .iter()
            .enumerate()
            .map(|(i, v)| (Rc::from(i.to_string()), v.clone()))
            .collect(),
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (Rc::from(i.to_string()), Value::from(c.to_string())))
            .collect(),
        _ => Vec::new(),
    })
}

pub(super) fn call_method(receiver: &Value, name: &str, args: &[Value]) -> RunResult<Value> {
    let Value::Object(obj) = receiver else {
        return Ok(Value::Undefined);
    };
    match name {
        "hasOwnProperty" => {
            let key = arg(args, 0).to_property_key();
            Ok(Value::Bool(obj.borrow().props.contains_key(&key)))
        }
        "toString" => {
            let is_error = matches!(obj.borrow().class, ObjectClass::Error(_));
            Ok(Value::from(if is_error {
                receiver.to_js_string()
            } else {
                "[object Object]".to_owned()
            }))
        }
        _ => Err(RunError::type_error(format!("object.{name} is not a function"))),
    }
}
