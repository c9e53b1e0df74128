use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// Exception types a snippet can raise or observe.
///
/// Uses strum derives for `Display`, `FromStr` and `Into<&'static str>`; the string form is the
/// variant name, which is also the `name` property of the matching error object inside a snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Generic error, also used for thrown values that are not error objects.
    Error,
    /// The snippet could not be parsed. Raised before any host interaction.
    SyntaxError,
    TypeError,
    /// Read of an identifier that is not bound in any enclosing scope.
    ReferenceError,
    /// Numeric argument out of range, or the call stack limit was exceeded.
    RangeError,
    /// The host document rejected an operation.
    HostError,
    /// Operation budget or wall-clock budget exhausted. Not catchable by the snippet.
    TimeoutError,
}

/// Source position of an exception, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// An exception that escaped a snippet, or a compile failure.
///
/// This is the public, owned error form: it holds no interpreter values and can be cloned,
/// serialized and sent across threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    exc_type: ExcType,
    message: String,
    loc: Option<CodeLoc>,
}

impl Exception {
    #[must_use]
    pub fn new(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self {
            exc_type,
            message: message.into(),
            loc: None,
        }
    }

    #[must_use]
    pub fn with_loc(mut self, loc: CodeLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    /// The original message, without the type prefix or location.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn into_message(self) -> String {
        self.message
    }

    #[must_use]
    pub fn loc(&self) -> Option<CodeLoc> {
        self.loc
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exc_type, self.message)?;
        if let Some(loc) = self.loc {
            write!(f, " ({loc})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

/// Result type alias for evaluator operations that can raise.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// Internal error flowing through the evaluator.
///
/// `Throw` carries the thrown snippet value so `catch` clauses observe exactly what was thrown.
/// `Uncatchable` bypasses `catch` and `finally` handlers entirely; it is used for resource
/// exhaustion so a snippet cannot swallow its own timeout.
#[derive(Debug, Clone)]
pub(crate) enum RunError {
    Throw { value: Value, loc: Option<CodeLoc> },
    Uncatchable(Exception),
}

impl RunError {
    /// Builds a catchable error object of the given type.
    pub(crate) fn exc(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self::Throw {
            value: Value::error(exc_type, message.into()),
            loc: None,
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::exc(ExcType::TypeError, message)
    }

    pub(crate) fn range_error(message: impl Into<String>) -> Self {
        Self::exc(ExcType::RangeError, message)
    }

    pub(crate) fn reference_error(name: &str) -> Self {
        Self::exc(ExcType::ReferenceError, format!("{name} is not defined"))
    }

    pub(crate) fn throw(value: Value) -> Self {
        Self::Throw { value, loc: None }
    }

    /// Attaches a location if none has been recorded yet.
    ///
    /// The innermost statement wins, so the first call along the unwind path sets it.
    pub(crate) fn at(mut self, here: CodeLoc) -> Self {
        match &mut self {
            Self::Throw { loc, .. } if loc.is_none() => *loc = Some(here),
            Self::Uncatchable(exc) if exc.loc.is_none() => exc.loc = Some(here),
            _ => {}
        }
        self
    }

    /// Converts to the public exception form once the error escapes the snippet.
    pub(crate) fn into_exception(self) -> Exception {
        match self {
            Self::Throw { value, loc } => {
                let (exc_type, message) = value.describe_thrown();
                let exc = Exception::new(exc_type, message);
                match loc {
                    Some(loc) => exc.with_loc(loc),
                    None => exc,
                }
            }
            Self::Uncatchable(exc) => exc,
        }
    }
}
