//! Public interface for running snippets.

use std::rc::Rc;

use crate::{
    exception::Exception,
    expressions::FunctionDef,
    host::{HostBridge, NoHost},
    interp::Interpreter,
    intrinsics::lockdown,
    io::{ConsoleWriter, StdConsole},
    object::Object,
    parse::parse,
    resource::{NoLimitTracker, ResourceTracker},
    value::{Settled, Value},
};

/// Primary interface for running snippet code.
///
/// The code is parsed once in `new()`; each `run()` evaluates it from scratch with fresh
/// bindings, so no state persists between runs.
///
/// # Example
/// ```
/// use gridlock::{Object, Runner};
///
/// let runner = Runner::new("return x + 1;".to_owned(), vec!["x".to_owned()]).unwrap();
/// let result = runner.run_no_limits(vec![Object::Number(41.0)]).unwrap();
/// assert_eq!(result, Object::Number(42.0));
/// ```
#[derive(Debug, Clone)]
pub struct Runner {
    code: String,
    input_names: Vec<String>,
    main: Rc<FunctionDef>,
}

impl Runner {
    /// Parses `code` as the body of an async function.
    ///
    /// # Arguments
    /// * `code` - The snippet source
    /// * `input_names` - Names bound to the values passed to `run`, in order
    ///
    /// # Errors
    /// Returns a `SyntaxError` exception if the code cannot be parsed.
    pub fn new(code: String, input_names: Vec<String>) -> Result<Self, Exception> {
        let main = parse(&code)?;
        Ok(Self {
            code,
            input_names,
            main,
        })
    }

    /// Returns the code that was parsed to create this runner.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Evaluates the snippet against a host.
    ///
    /// Calls [`lockdown`] first. A returned promise is unwrapped: a fulfilled promise yields its
    /// value, a rejected one its reason as an exception.
    ///
    /// # Arguments
    /// * `inputs` - Values for `input_names`, in order; missing inputs are `undefined`
    /// * `host` - Bridge serving property access and calls on host handles
    /// * `tracker` - Resource limits for this run
    /// * `console` - Destination of `console.*` output
    pub fn run(
        &self,
        inputs: Vec<Object>,
        host: &mut dyn HostBridge,
        tracker: &mut dyn ResourceTracker,
        console: &mut dyn ConsoleWriter,
    ) -> Result<Object, Exception> {
        let intrinsics = lockdown();
        let mut inputs = inputs.into_iter();
        let bindings = self
            .input_names
            .iter()
            .map(|name| {
                let value = inputs.next().unwrap_or(Object::Undefined);
                (Rc::from(name.as_str()), value.into_value())
            })
            .collect();
        let mut interp = Interpreter::new(intrinsics, host, tracker, console);
        let value = interp.run_main(&self.main, bindings).map_err(|e| e.into_exception())?;
        match value {
            Value::Promise(settled) => match &*settled {
                Settled::Fulfilled(value) => Ok(Object::from_value(value)),
                Settled::Rejected(reason) => {
                    let (exc_type, message) = reason.describe_thrown();
                    Err(Exception::new(exc_type, message))
                }
            },
            other => Ok(Object::from_value(&other)),
        }
    }

    /// Evaluates without a host, without operation limits, printing to stdout/stderr.
    pub fn run_no_limits(&self, inputs: Vec<Object>) -> Result<Object, Exception> {
        self.run(inputs, &mut NoHost, &mut NoLimitTracker, &mut StdConsole)
    }
}

/// Evaluates `code` with `bindings` in scope and no host.
///
/// `code` is the body of an implicit async function: `return v` produces `v`, and a body without
/// a `return` produces `Object::Undefined`.
///
/// # Errors
/// Returns the exception that escaped the snippet, or a `SyntaxError` if it does not parse.
pub fn evaluate(code: &str, bindings: Vec<(String, Object)>) -> Result<Object, Exception> {
    let (names, values): (Vec<String>, Vec<Object>) = bindings.into_iter().unzip();
    let runner = Runner::new(code.to_owned(), names)?;
    runner.run(values, &mut NoHost, &mut NoLimitTracker, &mut StdConsole)
}

