//! JSON form of a workbook, used to load and snapshot `MemoryWorkbook`.
//!
//! ```json
//! {
//!   "sheets": [
//!     {
//!       "name": "Sales",
//!       "cells": { "A1": "Region", "B1": 42, "C1": { "formula": "=B1*2", "numberFormat": "0.00" } },
//!       "notes": { "A1": "check totals" }
//!     }
//!   ],
//!   "activeSheet": "Sales"
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookFixture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub sheets: Vec<SheetFixture>,
    /// Name of the active sheet; defaults to the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_sheet: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetFixture {
    /// Volatile host id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    /// Cells keyed by A1 address.
    #[serde(default)]
    pub cells: IndexMap<String, CellFixture>,
    /// Note text keyed by A1 address.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub notes: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub comments: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<AttachmentFixture>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pivot_tables: Vec<AttachmentFixture>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<AttachmentFixture>,
}

/// A cell: either a bare value or a full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellFixture {
    Full(CellRecord),
    Value(JsonValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CellRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
    /// Format properties keyed by path, e.g. `font.bold`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub style: IndexMap<String, JsonValue>,
}

/// A chart, table or pivot table: a name plus free-form properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentFixture {
    pub name: String,
    #[serde(flatten)]
    pub props: IndexMap<String, JsonValue>,
}
