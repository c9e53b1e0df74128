use std::borrow::Cow;

use super::ConsoleFn;
use crate::{
    exception::{RunError, RunResult},
    interp::Interpreter,
    io::ConsoleLevel,
    value::Value,
};

/// `console.log(...)` and friends: arguments formatted with `inspect` and joined by spaces.
pub(super) fn call(interp: &mut Interpreter<'_>, f: ConsoleFn, args: &[Value]) -> RunResult<Value> {
    let level = match f {
        ConsoleFn::Log => ConsoleLevel::Log,
        ConsoleFn::Info => ConsoleLevel::Info,
        ConsoleFn::Warn => ConsoleLevel::Warn,
        ConsoleFn::Error => ConsoleLevel::Error,
        ConsoleFn::Debug => ConsoleLevel::Debug,
    };
    let line = args.iter().map(Value::inspect).collect::<Vec<_>>().join(" ");
    interp
        .console
        .write_line(level, Cow::Owned(line))
        .map_err(RunError::Uncatchable)?;
    Ok(Value::Undefined)
}
