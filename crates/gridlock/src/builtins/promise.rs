//! Promises over the synchronous evaluation model.
//!
//! Host calls complete before returning, so every promise is settled at creation. `then`,
//! `catch` and `finally` run their handler immediately and return a new settled promise.

use std::rc::Rc;

use indexmap::IndexMap;

use super::{PromiseFn, arg, callback};
use crate::{
    exception::{RunError, RunResult},
    interp::Interpreter,
    value::{ResolveSlot, Settled, Value},
};

/// Settlement for resolving with `value`: promises are adopted, anything else fulfills.
pub(crate) fn adopt(value: Value) -> Settled {
    match value {
        Value::Promise(settled) => match &*settled {
            Settled::Fulfilled(v) => Settled::Fulfilled(v.clone()),
            Settled::Rejected(v) => Settled::Rejected(v.clone()),
        },
        other => Settled::Fulfilled(other),
    }
}

/// Wraps the outcome of an async body or a reaction handler into a promise.
///
/// Catchable throws become rejections; uncatchable errors keep unwinding.
pub(crate) fn settle(result: RunResult<Value>) -> RunResult<Value> {
    match result {
        Ok(promise @ Value::Promise(_)) => Ok(promise),
        Ok(value) => Ok(fulfilled(value)),
        Err(RunError::Throw { value, .. }) => Ok(rejected(value)),
        Err(err @ RunError::Uncatchable(_)) => Err(err),
    }
}

pub(crate) fn fulfilled(value: Value) -> Value {
    Value::Promise(Rc::new(Settled::Fulfilled(value)))
}

pub(crate) fn rejected(reason: Value) -> Value {
    Value::Promise(Rc::new(Settled::Rejected(reason)))
}

/// `new Promise(executor)`. The executor must settle before it returns.
pub(crate) fn construct(interp: &mut Interpreter<'_>, args: &[Value]) -> RunResult<Value> {
    let executor = callback(args, 0)?;
    let slot = Rc::new(ResolveSlot::default());
    let resolve = Value::Resolver {
        slot: slot.clone(),
        reject: false,
    };
    let reject = Value::Resolver {
        slot: slot.clone(),
        reject: true,
    };
    match interp.call_value(&executor, Value::Undefined, &[resolve, reject]) {
        Ok(_) => {}
        Err(RunError::Throw { value, .. }) => {
            let mut state = slot.0.borrow_mut();
            if state.is_none() {
                *state = Some(Settled::Rejected(value));
            }
        }
        Err(err) => return Err(err),
    }
    let settled = slot.0.borrow_mut().take();
    match settled {
        Some(settled) => Ok(Value::Promise(Rc::new(settled))),
        None => Err(RunError::type_error(
            "Promise executor did not settle synchronously; host operations complete before returning",
        )),
    }
}

pub(crate) fn call_static(interp: &mut Interpreter<'_>, f: PromiseFn, args: &[Value]) -> RunResult<Value> {
    match f {
        PromiseFn::Resolve => Ok(match arg(args, 0) {
            promise @ Value::Promise(_) => promise,
            other => fulfilled(other),
        }),
        PromiseFn::Reject => Ok(rejected(arg(args, 0))),
        PromiseFn::All => {
            let items = interp.iterate(&arg(args, 0))?;
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match adopt(item) {
                    Settled::Fulfilled(v) => values.push(v),
                    Settled::Rejected(reason) => return Ok(rejected(reason)),
                }
            }
            Ok(fulfilled(Value::array(values)))
        }
        PromiseFn::AllSettled => {
            let items = interp.iterate(&arg(args, 0))?;
            let outcomes = items
                .into_iter()
                .map(|item| {
                    let mut props = IndexMap::new();
                    match adopt(item) {
                        Settled::Fulfilled(v) => {
                            props.insert(Rc::from("status"), Value::from("fulfilled"));
                            props.insert(Rc::from("value"), v);
                        }
                        Settled::Rejected(reason) => {
                            props.insert(Rc::from("status"), Value::from("rejected"));
                            props.insert(Rc::from("reason"), reason);
                        }
                    }
                    Value::object(props)
                })
                .collect();
            Ok(fulfilled(Value::array(outcomes)))
        }
    }
}

pub(crate) fn call_method(
    interp: &mut Interpreter<'_>,
    promise: &Rc<Settled>,
    name: &str,
    args: &[Value],
) -> RunResult<Value> {
    match name {
        "then" => react(interp, promise, &arg(args, 0), &arg(args, 1)),
        "catch" => react(interp, promise, &Value::Undefined, &arg(args, 0)),
        "finally" => {
            let handler = arg(args, 0);
            if handler.is_callable() {
                match interp.call_value(&handler, Value::Undefined, &[]) {
                    Ok(_) => {}
                    Err(RunError::Throw { value, .. }) => return Ok(rejected(value)),
                    Err(err) => return Err(err),
                }
            }
            Ok(Value::Promise(promise.clone()))
        }
        _ => Err(RunError::type_error(format!("promise.{name} is not a function"))),
    }
}

fn react(
    interp: &mut Interpreter<'_>,
    promise: &Rc<Settled>,
    on_fulfilled: &Value,
    on_rejected: &Value,
) -> RunResult<Value> {
    let (handler, value) = match &**promise {
        Settled::Fulfilled(v) => (on_fulfilled, v.clone()),
        Settled::Rejected(v) => (on_rejected, v.clone()),
    };
    if handler.is_callable() {
        settle(interp.call_value(handler, Value::Undefined, &[value]))
    } else {
        Ok(Value::Promise(promise.clone()))
    }
}
