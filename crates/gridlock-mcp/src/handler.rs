use std::path::{Path, PathBuf};

use gridlock::{MemorySettings, MemoryWorkbook, SettingsStore, StableIdMapper, StoreError, ToolConfig, ToolOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// Public types
// =============================================================================

/// Static MCP tool metadata exposed by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name used by `tools/call`.
    pub name: String,
    /// Human-readable description for clients.
    pub description: String,
}

// =============================================================================
// McpHandler
// =============================================================================

/// Thin MCP adapter around [`gridlock::execute`].
///
/// Owns the workbook snippets run against and the mapper that gives its sheets stable ids, so
/// ids stay the same across calls. When a workbook path is set the workbook is written back
/// after every `execute` call.
pub struct McpHandler {
    workbook: MemoryWorkbook,
    workbook_path: Option<PathBuf>,
    mapper: StableIdMapper<Box<dyn SettingsStore>>,
    config: ToolConfig,
}

// =============================================================================
// Constructor and public API
// =============================================================================

impl McpHandler {
    /// Creates a handler over `workbook`, persisting sheet ids to `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds a corrupt id map.
    pub fn new(workbook: MemoryWorkbook, store: Box<dyn SettingsStore>) -> Result<Self, StoreError> {
        Ok(Self {
            workbook,
            workbook_path: None,
            mapper: StableIdMapper::open(store)?,
            config: ToolConfig::default(),
        })
    }

    /// Creates a handler over a fresh one-sheet workbook with in-memory id storage.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::new(MemoryWorkbook::new(), Box::new(MemorySettings::new()))
    }

    /// Writes the workbook back to `path` after each `execute` call.
    pub fn set_workbook_path(&mut self, path: PathBuf) {
        self.workbook_path = Some(path);
    }

    #[must_use]
    pub fn workbook_path(&self) -> Option<&Path> {
        self.workbook_path.as_deref()
    }

    pub fn set_config(&mut self, config: ToolConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn workbook(&self) -> &MemoryWorkbook {
        &self.workbook
    }

    /// Returns the tools supported by this handler.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            tool(
                "execute",
                "Run a JavaScript snippet against the workbook. `context` and `Excel` are in scope; \
                 the body runs as an async function, so use `await context.sync()` and `return` a value. \
                 Reports the ranges the snippet modified.",
            ),
            tool("sheet_ids", "List the stable numeric id assigned to each sheet."),
            tool("clear_sheet_ids", "Forget all stable sheet ids. Ids are reassigned from 1."),
            tool("snapshot", "Dump the workbook as a JSON fixture."),
        ]
    }

    /// Dispatches one tool call by name.
    ///
    /// A snippet that fails is a successful tool call whose payload has `"success": false`;
    /// `Err` is reserved for bad arguments and storage failures.
    pub fn call_tool(&mut self, tool_name: &str, arguments: Value) -> Result<Value, String> {
        match tool_name {
            "execute" => self.execute_tool(arguments),
            "sheet_ids" => Ok(self.sheet_ids_tool()),
            "clear_sheet_ids" => self.clear_sheet_ids_tool(),
            "snapshot" => self.snapshot_tool(),
            other => Err(format!("unknown tool '{other}'")),
        }
    }
}

// =============================================================================
// Tools
// =============================================================================

impl McpHandler {
    /// Runs a snippet.
    ///
    /// Accepts `{"code": "...", "heuristic": bool}` where `heuristic` is optional and defaults
    /// to the handler's config.
    fn execute_tool(&mut self, arguments: Value) -> Result<Value, String> {
        #[derive(Deserialize)]
        struct Args {
            code: String,
            heuristic: Option<bool>,
        }

        let args: Args = serde_json::from_value(arguments).map_err(|err| format!("invalid execute args: {err}"))?;
        let mut config = self.config.clone();
        if let Some(heuristic) = args.heuristic {
            config = config.heuristic(heuristic);
        }

        let outcome = gridlock::execute(&mut self.workbook, &mut self.mapper, &args.code, &config);
        if let Some(path) = &self.workbook_path {
            self.workbook
                .save(path)
                .map_err(|err| format!("failed to save workbook to {}: {err}", path.display()))?;
            tracing::debug!(path = %path.display(), "workbook saved");
        }
        Ok(self.serialize_outcome(&outcome))
    }

    fn sheet_ids_tool(&self) -> Value {
        let sheets: Vec<Value> = self
            .mapper
            .all()
            .into_iter()
            .map(|(guid, id)| {
                json!({
                    "id": id,
                    "guid": guid,
                    "name": self.workbook.sheet_name(&guid),
                })
            })
            .collect();
        json!({ "sheets": sheets })
    }

    fn clear_sheet_ids_tool(&mut self) -> Result<Value, String> {
        let cleared = self.mapper.all().len();
        self.mapper
            .clear()
            .map_err(|err| format!("failed to clear sheet ids: {err}"))?;
        tracing::info!(cleared, "sheet id map cleared");
        Ok(json!({ "cleared": cleared }))
    }

    fn snapshot_tool(&self) -> Result<Value, String> {
        serde_json::to_value(self.workbook.snapshot()).map_err(|err| format!("failed to serialize workbook: {err}"))
    }

    /// Outcome JSON plus a `summary` line naming the dirty ranges by sheet.
    fn serialize_outcome(&self, outcome: &ToolOutcome) -> Value {
        let mut value = serde_json::to_value(outcome).unwrap_or_else(|err| {
            json!({ "success": false, "error": format!("failed to serialize outcome: {err}") })
        });
        if !outcome.dirty_ranges.is_empty()
            && let Some(object) = value.as_object_mut()
        {
            let summary = outcome.summary(|scope_id| self.scope_name(scope_id));
            object.insert("summary".to_owned(), Value::String(summary));
        }
        value
    }

    fn scope_name(&self, scope_id: i64) -> Option<String> {
        let guid = self
            .mapper
            .all()
            .into_iter()
            .find_map(|(guid, id)| (i64::from(id) == scope_id).then_some(guid))?;
        self.workbook.sheet_name(&guid).map(str::to_owned)
    }
}

fn tool(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_owned(),
        description: description.to_owned(),
    }
}

