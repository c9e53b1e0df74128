//! The tool entry point: run one snippet against a document and report what it touched.

use std::{sync::LazyLock, time::Duration};

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    document::excel_constants,
    exception::{ExcType, Exception},
    host::{HostDocument, HostError},
    io::TracingConsole,
    ledger::{self, DirtyRange, UNRESOLVED_SCOPE},
    object::Object,
    resource::{LimitedTracker, ResourceLimits},
    run::Runner,
    sheet_ids::{SettingsStore, StableIdMapper},
    tracker::TrackedContext,
};

/// Names bound inside the snippet, in injection order.
const BINDINGS: [&str; 2] = ["context", "Excel"];

/// Source patterns that suggest a snippet mutates the document.
static MUTATION_PATTERNS: LazyLock<Option<RegexSet>> = LazyLock::new(|| {
    RegexSet::new([
        r"\.(values|formulas|numberFormat)\s*=([^=]|$)",
        r"\.clear\s*\(",
        r"\.delete\s*\(",
        r"\.insert\s*\(",
        r"\.copyFrom\s*\(",
        r"\.add\s*\(",
    ])
    .map_err(|err| tracing::error!(%err, "mutation patterns failed to compile; heuristic disabled"))
    .ok()
});

/// Settings for `execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub limits: ResourceLimits,
    /// Report a wildcard mutation when the source looks mutating but nothing was recorded.
    pub heuristic: bool,
}

impl Default for ToolConfig {
    /// Default recursion limit, a 30 second wall-clock budget, heuristic on.
    fn default() -> Self {
        Self {
            limits: ResourceLimits::new().max_duration(Duration::from_secs(30)),
            heuristic: true,
        }
    }
}

impl ToolConfig {
    #[must_use]
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn heuristic(mut self, enabled: bool) -> Self {
        self.heuristic = enabled;
        self
    }
}

/// Why a tool call failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    /// The snippet does not parse. Raised before the document is touched.
    #[error("{}", .0.message())]
    Compile(Exception),
    /// The snippet raised, or exhausted its resource budget.
    #[error("{}", .0.message())]
    Runtime(Exception),
    /// The document refused to open a request context.
    #[error("could not open a request context: {0}")]
    Host(#[from] HostError),
}

impl ToolError {
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        match self {
            Self::Compile(exc) | Self::Runtime(exc) => exc.exc_type(),
            Self::Host(_) => ExcType::HostError,
        }
    }
}

/// Result of one tool call, serialized as
/// `{"success": true, "result": ..., "dirtyRanges": [...]}` or
/// `{"success": false, "error": "...", "errorType": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dirty_ranges: Vec<DirtyRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ExcType>,
}

impl ToolOutcome {
    #[must_use]
    pub fn success(result: JsonValue, dirty_ranges: Vec<DirtyRange>) -> Self {
        Self {
            success: true,
            result: Some(result),
            dirty_ranges,
            error: None,
            error_type: None,
        }
    }

    #[must_use]
    pub fn failure(err: &ToolError) -> Self {
        Self {
            success: false,
            result: None,
            dirty_ranges: Vec::new(),
            error: Some(err.to_string()),
            error_type: Some(err.exc_type()),
        }
    }

    /// Human-readable list of the dirty ranges, e.g. `Sales!A1, Sheet 2 (all)`.
    pub fn summary(&self, scope_name: impl Fn(i64) -> Option<String>) -> String {
        ledger::format(&self.dirty_ranges, scope_name)
    }
}

/// Runs `code` against `document` and reports the result with the ranges it mutated.
///
/// The snippet sees `context` (the tracked request context) and `Excel` (enumeration
/// constants). Failures of any kind come back as an unsuccessful outcome; this never panics on
/// snippet input.
pub fn execute<D: HostDocument, S: SettingsStore>(
    document: &mut D,
    mapper: &mut StableIdMapper<S>,
    code: &str,
    config: &ToolConfig,
) -> ToolOutcome {
    match run_tracked(document, mapper, code, config) {
        Ok((result, mut dirty_ranges)) => {
            if dirty_ranges.is_empty() && config.heuristic && looks_like_mutation(code) {
                tracing::debug!("no mutation recorded but the source looks mutating; reporting a wildcard");
                dirty_ranges.push(DirtyRange::wildcard(UNRESOLVED_SCOPE));
            }
            tracing::info!(dirty = dirty_ranges.len(), "snippet succeeded");
            ToolOutcome::success(result.to_json_value(), dirty_ranges)
        }
        Err(err) => {
            tracing::info!(%err, exc_type = %err.exc_type(), "snippet failed");
            ToolOutcome::failure(&err)
        }
    }
}

fn run_tracked<D: HostDocument, S: SettingsStore>(
    document: &mut D,
    mapper: &mut StableIdMapper<S>,
    code: &str,
    config: &ToolConfig,
) -> Result<(Object, Vec<DirtyRange>), ToolError> {
    let runner = Runner::new(code.to_owned(), BINDINGS.map(str::to_owned).to_vec()).map_err(ToolError::Compile)?;
    let root = document.open_context()?;
    let mut tracked = TrackedContext::new(document, mapper, root);
    let inputs = vec![Object::Proxy(tracked.root()), excel_constants()];
    let mut limits = LimitedTracker::new(config.limits.clone());
    let result = runner.run(inputs, &mut tracked, &mut limits, &mut TracingConsole);
    let dirty_ranges = ledger::merge(&tracked.dirty_ranges());
    drop(tracked);
    document.close_context(root);
    tracing::debug!(elapsed_ms = limits.elapsed().as_millis(), "request context closed");
    Ok((result.map_err(ToolError::Runtime)?, dirty_ranges))
}

/// Whether `code` contains syntax that usually mutates the document.
#[must_use]
pub fn looks_like_mutation(code: &str) -> bool {
    MUTATION_PATTERNS.as_ref().is_some_and(|patterns| patterns.is_match(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_patterns_compile() {
        assert!(MUTATION_PATTERNS.is_some());
        assert_eq!(MUTATION_PATTERNS.as_ref().map(RegexSet::len), Some(6));
    }
}
