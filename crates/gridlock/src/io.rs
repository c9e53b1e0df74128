use std::{
    borrow::Cow,
    io::{self, Write as _},
};

use strum::{Display, IntoStaticStr};

use crate::exception::Exception;

/// Severity of a `console.*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ConsoleLevel {
    Debug,
    Log,
    Info,
    Warn,
    Error,
}

/// Trait for handling output from the `console` intrinsic.
///
/// Implement this trait to capture or redirect console output from sandboxed snippets.
/// Each call receives one fully formatted line (arguments joined by single spaces, no trailing
/// newline).
pub trait ConsoleWriter {
    fn write_line(&mut self, level: ConsoleLevel, line: Cow<'_, str>) -> Result<(), Exception>;
}

/// Writes `log`/`info`/`debug` lines to stdout and `warn`/`error` lines to stderr.
#[derive(Debug, Default)]
pub struct StdConsole;

impl ConsoleWriter for StdConsole {
    fn write_line(&mut self, level: ConsoleLevel, line: Cow<'_, str>) -> Result<(), Exception> {
        // a closed pipe must not turn into a snippet failure
        let _ = match level {
            ConsoleLevel::Warn | ConsoleLevel::Error => writeln!(io::stderr(), "{line}"),
            ConsoleLevel::Debug | ConsoleLevel::Log | ConsoleLevel::Info => writeln!(io::stdout(), "{line}"),
        };
        Ok(())
    }
}

/// A `ConsoleWriter` that collects every line with its level.
///
/// Useful for testing or capturing console output programmatically.
#[derive(Debug, Default)]
pub struct CollectConsole {
    lines: Vec<(ConsoleLevel, String)>,
}

impl CollectConsole {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> &[(ConsoleLevel, String)] {
        &self.lines
    }

    /// Returns all collected lines joined with newlines, ignoring levels.
    #[must_use]
    pub fn output(&self) -> String {
        let mut out = String::new();
        for (_, line) in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

impl ConsoleWriter for CollectConsole {
    fn write_line(&mut self, level: ConsoleLevel, line: Cow<'_, str>) -> Result<(), Exception> {
        self.lines.push((level, line.into_owned()));
        Ok(())
    }
}

/// `ConsoleWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoConsole;

impl ConsoleWriter for NoConsole {
    fn write_line(&mut self, _level: ConsoleLevel, _line: Cow<'_, str>) -> Result<(), Exception> {
        Ok(())
    }
}

/// Forwards console lines to `tracing` under the `gridlock::console` target.
///
/// This is what the tool entry point uses: stdout belongs to the host protocol, so snippet
/// output goes to the structured log instead.
#[derive(Debug, Default)]
pub struct TracingConsole;

impl ConsoleWriter for TracingConsole {
    fn write_line(&mut self, level: ConsoleLevel, line: Cow<'_, str>) -> Result<(), Exception> {
        match level {
            ConsoleLevel::Debug => tracing::debug!(target: "gridlock::console", "{line}"),
            ConsoleLevel::Log | ConsoleLevel::Info => tracing::info!(target: "gridlock::console", "{line}"),
            ConsoleLevel::Warn => tracing::warn!(target: "gridlock::console", "{line}"),
            ConsoleLevel::Error => tracing::error!(target: "gridlock::console", "{line}"),
        }
        Ok(())
    }
}
